pub use in_memory_identity_provider::{InMemoryIdentityProvider, SeedAccount};
pub use remote_identity_provider::RemoteIdentityProvider;

use crate::api::{AuthResponse, Credentials, Registration, UserProfile};

mod in_memory_identity_provider;
mod remote_identity_provider;

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authorization token is missing")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Field {0} is required")]
    MissingField(&'static str),

    #[error("Identity provider failure {0}")]
    ProviderFailure(String),
}

/// Issues and validates bearer tokens. The service never looks inside a token,
/// it only hands it back to the provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn login(&self, credentials: Credentials) -> Result<AuthResponse, IdentityError>;

    async fn register(&self, registration: Registration) -> Result<AuthResponse, IdentityError>;

    /// Resolves the user a token was issued for
    async fn identify(&self, token: &str) -> Result<UserProfile, IdentityError>;
}
