use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest};
use paperclip::actix::Apiv2Security;
use serde::Deserialize;

use crate::api::{Role, UserProfile};
use crate::error::ServiceError;
use crate::identity::{IdentityError, IdentityProvider};

/// Bearer token sent by the caller, if any
#[derive(Debug, Clone, Default, PartialEq, Eq, Apiv2Security)]
#[openapi(
    apiKey,
    in = "header",
    name = "Authorization",
    description = "Use format 'Bearer TOKEN'"
)]
pub struct BearerToken(Option<String>);

impl BearerToken {
    pub fn new(token: &str) -> Self {
        Self(Some(token.to_string()))
    }

    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }

    fn from_header(value: &str) -> Self {
        let token = value
            .trim()
            .split_once(' ')
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        Self(token)
    }
}

impl FromRequest for BearerToken {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(BearerToken::from_header)
            .unwrap_or_default();
        ready(Ok(token))
    }
}

/// Who may create, update and delete items
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemWritePolicy {
    #[default]
    Open,
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub item_writes: ItemWritePolicy,
}

/// Resolves the caller, failing when no token was sent
pub async fn authenticate(
    identity: &dyn IdentityProvider,
    token: &BearerToken,
) -> Result<UserProfile, IdentityError> {
    let token = token.token().ok_or(IdentityError::MissingToken)?;
    identity.identify(token).await
}

pub fn require_admin(user: &UserProfile) -> Result<(), ServiceError> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Admin access required".to_string()))
    }
}

pub async fn authorize_item_write(
    policy: &AccessPolicy,
    identity: &dyn IdentityProvider,
    token: &BearerToken,
) -> Result<(), ServiceError> {
    match policy.item_writes {
        ItemWritePolicy::Open => Ok(()),
        ItemWritePolicy::Authenticated => {
            authenticate(identity, token).await?;
            Ok(())
        }
        ItemWritePolicy::Admin => require_admin(&authenticate(identity, token).await?),
    }
}
