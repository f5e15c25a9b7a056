//! Request Extension Trait for JWT Claims Access
//!
//! Gives handlers read access to the claims stored by the server-side layer.
//! Handlers never need this to be protected; authorization already happened.

use crate::{JwtClaims, Role};
use tonic::{Request, Status};

/// Extension trait for accessing JWT claims from gRPC requests
pub trait JwtClaimsExt {
    /// Claims of the authenticated caller, if the method required a credential
    fn caller(&self) -> Option<&JwtClaims>;

    /// Claims of the authenticated caller
    ///
    /// ## Errors
    ///
    /// Returns `Status::unauthenticated` if the call carried no verified claims
    /// (unlisted method, or the server layer was not attached)
    fn jwt_claims(&self) -> Result<&JwtClaims, Status> {
        self.caller()
            .ok_or_else(|| Status::unauthenticated("No verified credential on this call"))
    }

    /// Require the caller to hold `role`
    fn require_role(&self, role: Role) -> Result<&JwtClaims, Status> {
        let claims = self.jwt_claims()?;
        if claims.role == role {
            Ok(claims)
        } else {
            Err(Status::permission_denied(format!(
                "Role {} required",
                role
            )))
        }
    }
}

impl<T> JwtClaimsExt for Request<T> {
    fn caller(&self) -> Option<&JwtClaims> {
        self.extensions().get::<JwtClaims>()
    }
}
