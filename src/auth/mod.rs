pub mod identity;
pub mod jwt;
pub mod login;
pub mod password;

pub use identity::{bearer_token, Identity, IdentityResolver, StaticResolver};
pub use jwt::{Claims, JwtResolver};
pub use login::{authenticate, LoginResult};

use thiserror::Error;

use crate::database::StorageError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Entity '{0}' is not registered")]
    MissingEntity(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
