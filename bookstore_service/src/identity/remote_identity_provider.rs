use anyhow::Context;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::de::DeserializeOwned;

use crate::api::{AuthResponse, Credentials, ProfileResponse, Registration, UserProfile};
use crate::identity::{IdentityError, IdentityProvider};

/// Forwards login, registration and token checks to an external identity service
pub struct RemoteIdentityProvider {
    url: String,
    client: ClientWithMiddleware,
}

impl RemoteIdentityProvider {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn provider_failure(err: impl std::fmt::Display) -> IdentityError {
    IdentityError::ProviderFailure(err.to_string())
}

async fn parse_success<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, IdentityError> {
    if response.status().is_success() {
        response.json().await.map_err(provider_failure)
    } else {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        Err(provider_failure(format!("{} {}", status, error)))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn login(&self, credentials: Credentials) -> Result<AuthResponse, IdentityError> {
        let response = self
            .client
            .post(format!("{}/login", self.url))
            .json(&credentials)
            .send()
            .await
            .map_err(provider_failure)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(IdentityError::InvalidCredentials);
        }
        parse_success(response).await
    }

    async fn register(&self, registration: Registration) -> Result<AuthResponse, IdentityError> {
        let response = self
            .client
            .post(format!("{}/register", self.url))
            .json(&registration)
            .send()
            .await
            .map_err(provider_failure)?;

        if response.status() == StatusCode::CONFLICT {
            return Err(IdentityError::AlreadyRegistered(
                registration.username().to_string(),
            ));
        }
        parse_success(response).await
    }

    async fn identify(&self, token: &str) -> Result<UserProfile, IdentityError> {
        let response = self
            .client
            .get(format!("{}/profile", self.url))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(provider_failure)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(IdentityError::InvalidToken);
        }
        parse_success::<ProfileResponse>(response)
            .await
            .map(|profile| profile.user)
    }
}
