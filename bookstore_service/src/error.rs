use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::api::{ErrorBody, InvalidItem, InvalidSale};
use crate::identity::IdentityError;
use crate::repository::RepositoryError;

/// Failure of a request, rendered as `{"error": "<message>"}`
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    InvalidItem(#[from] InvalidItem),

    #[error(transparent)]
    InvalidSale(#[from] InvalidSale),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Repository(err) => match err {
                RepositoryError::ItemNotFound(_)
                | RepositoryError::SaleNotFound(_)
                | RepositoryError::NotificationNotFound(_) => StatusCode::NOT_FOUND,
                RepositoryError::ItemAlreadyExists(_)
                | RepositoryError::InsufficientStock { .. } => StatusCode::CONFLICT,
                RepositoryError::DatabaseFailure(_)
                | RepositoryError::SqliteFailure(_)
                | RepositoryError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServiceError::Identity(err) => match err {
                IdentityError::InvalidCredentials
                | IdentityError::MissingToken
                | IdentityError::InvalidToken => StatusCode::UNAUTHORIZED,
                IdentityError::AlreadyRegistered(_) => StatusCode::CONFLICT,
                IdentityError::MissingField(_) => StatusCode::BAD_REQUEST,
                IdentityError::ProviderFailure(_) => StatusCode::BAD_GATEWAY,
            },
            ServiceError::InvalidItem(_)
            | ServiceError::InvalidSale(_)
            | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed {}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "Request rejected {}", self);
        }
        // store internals stay in the log
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorBody { error })
    }
}

#[cfg(test)]
mod error_tests {
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;

    use crate::api::{ErrorBody, InvalidSale};
    use crate::identity::IdentityError;
    use crate::repository::RepositoryError;

    use super::ServiceError;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                ServiceError::from(RepositoryError::ItemNotFound("1".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                RepositoryError::NotificationNotFound(7).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                RepositoryError::ItemAlreadyExists("1".to_string()).into(),
                StatusCode::CONFLICT,
            ),
            (
                RepositoryError::InsufficientStock {
                    isbn: "1".to_string(),
                    available: 1,
                    requested: 2,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                RepositoryError::Other("disk".to_string()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (IdentityError::MissingToken.into(), StatusCode::UNAUTHORIZED),
            (
                IdentityError::ProviderFailure("down".to_string()).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (InvalidSale::NoItems.into(), StatusCode::BAD_REQUEST),
            (
                ServiceError::BadRequest("Invalid path".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Forbidden("no".to_string()),
                StatusCode::FORBIDDEN,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{}", error);
        }
    }

    #[actix_web::test]
    async fn test_error_envelope() {
        let response = ServiceError::from(RepositoryError::ItemNotFound(
            "9780743273565".to_string(),
        ))
        .error_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body()).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "Item 9780743273565 not found");

        let internal = ServiceError::from(RepositoryError::Other("secret path".to_string()))
            .error_response();
        let body = to_bytes(internal.into_body()).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "Internal server error");
    }
}
