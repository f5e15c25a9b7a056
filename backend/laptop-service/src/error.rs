use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, LaptopError>;

#[derive(Debug, Error)]
pub enum LaptopError {
    #[error("laptop ID is not a valid UUID: {0}")]
    InvalidLaptopId(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("record already exists")]
    AlreadyExists,

    #[error("laptop {0} doesn't exist")]
    UnknownLaptop(String),

    #[error("laptop not found with ID: {0}")]
    LaptopNotFound(String),

    #[error("image is too large: {size} > {max}")]
    ImageTooLarge { size: usize, max: usize },

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("cannot receive stream request: {0}")]
    Receive(String),

    #[error("cannot send stream response")]
    Send,

    #[error("request is canceled")]
    Canceled,

    #[error("deadline is exceeded")]
    DeadlineExceeded,

    #[error("incorrect username or password")]
    InvalidCredentials,

    #[error("Username already exists: {0}")]
    UsernameAlreadyExists(String),

    #[error("Image storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Token error: {0}")]
    Token(#[from] crypto_core::TokenError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl LaptopError {
    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        match self {
            LaptopError::InvalidLaptopId(_)
            | LaptopError::MissingField(_)
            | LaptopError::UnknownLaptop(_)
            | LaptopError::ImageTooLarge { .. } => Status::new(Code::InvalidArgument, self.to_string()),
            LaptopError::AlreadyExists => {
                Status::new(Code::AlreadyExists, "cannot save laptop to the store: record already exists")
            }
            LaptopError::UsernameAlreadyExists(_) => Status::new(Code::AlreadyExists, self.to_string()),
            LaptopError::LaptopNotFound(_) => Status::new(Code::NotFound, self.to_string()),
            LaptopError::MalformedStream(_) | LaptopError::Receive(_) | LaptopError::Send => {
                Status::new(Code::Unknown, self.to_string())
            }
            LaptopError::Canceled => Status::new(Code::Cancelled, self.to_string()),
            LaptopError::DeadlineExceeded => Status::new(Code::DeadlineExceeded, self.to_string()),
            LaptopError::InvalidCredentials => Status::new(Code::Unauthenticated, self.to_string()),
            LaptopError::Storage(_) | LaptopError::Token(_) | LaptopError::Internal(_) => {
                // Don't leak internal details
                tracing::error!(error = %self, "Internal error");
                Status::new(Code::Internal, "Internal server error")
            }
        }
    }
}

impl From<LaptopError> for Status {
    fn from(err: LaptopError) -> Self {
        err.to_status()
    }
}
