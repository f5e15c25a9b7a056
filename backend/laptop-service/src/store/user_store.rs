use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use grpc_jwt_propagation::Role;

use crate::error::{LaptopError, Result};
use crate::security::{hash_password, verify_password};

/// A login identity. The password is only ever held as an Argon2id hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

impl User {
    pub fn new(username: impl Into<String>, password: &str, role: Role) -> Result<Self> {
        Ok(Self {
            username: username.into(),
            password_hash: hash_password(password)?,
            role,
        })
    }

    /// `Err` only when the stored hash itself is unusable
    pub fn is_correct_password(&self, password: &str) -> Result<bool> {
        verify_password(password, &self.password_hash)
    }
}

/// Users keyed by username
#[derive(Debug, Default)]
pub struct UserStore {
    users: DashMap<String, User>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, user: &User) -> Result<()> {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(LaptopError::UsernameAlreadyExists(user.username.clone())),
            Entry::Vacant(entry) => {
                entry.insert(user.clone());
                Ok(())
            }
        }
    }

    pub fn find(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|user| user.clone())
    }
}
