use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{Credentials, ProfileResponse, Registration};
use crate::auth::{authenticate, BearerToken};
use crate::error::ServiceError;
use crate::identity::IdentityProvider;

#[api_v2_operation]
pub async fn login(
    identity: Data<Arc<dyn IdentityProvider>>,
    credentials: web::Json<Credentials>,
) -> Result<HttpResponse, Error> {
    let session = identity
        .login(credentials.into_inner())
        .await
        .map_err(ServiceError::from)?;
    tracing::info!("User {} logged in", session.user.id);
    Ok(HttpResponse::Ok().json(session))
}

#[api_v2_operation]
pub async fn register(
    identity: Data<Arc<dyn IdentityProvider>>,
    registration: web::Json<Registration>,
) -> Result<HttpResponse, Error> {
    let session = identity
        .register(registration.into_inner())
        .await
        .map_err(ServiceError::from)?;
    tracing::info!("Registered user {}", session.user.id);
    Ok(HttpResponse::Created().json(session))
}

#[api_v2_operation]
pub async fn profile(
    identity: Data<Arc<dyn IdentityProvider>>,
    token: BearerToken,
) -> Result<HttpResponse, Error> {
    let user = authenticate(identity.get_ref().as_ref(), &token)
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(ProfileResponse { user }))
}

#[cfg(test)]
mod accounts_handler_tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::json;

    use crate::api::{AuthResponse, ErrorBody, ProfileResponse, Role};
    use crate::auth::AccessPolicy;
    use crate::handlers::test_support::{init_test_app, TestState};

    #[actix_web::test]
    async fn test_register_login_and_profile() {
        let state = TestState::new(AccessPolicy::default());
        let app = init_test_app!(state);

        let request = test::TestRequest::post()
            .uri("/api/register")
            .set_json(json!({"email": "reader@bookstore.com", "password": "secret"}))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let registered: AuthResponse = test::read_body_json(response).await;
        assert_eq!(registered.user.username, "reader@bookstore.com");
        assert_eq!(registered.user.role, Role::User);

        let request = test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({"email": "reader@bookstore.com", "password": "secret"}))
            .to_request();
        let logged_in: AuthResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(logged_in.user, registered.user);

        let request = test::TestRequest::get()
            .uri("/api/profile")
            .insert_header(("Authorization", format!("Bearer {}", logged_in.token)))
            .to_request();
        let profile: ProfileResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(profile.user, registered.user);
    }

    #[actix_web::test]
    async fn test_rejected_logins_and_tokens() {
        let state = TestState::new(AccessPolicy::default());
        let app = init_test_app!(state);

        let request = test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({"username": "admin", "password": "wrong"}))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = test::read_body_json(response).await;
        assert_eq!(body.error, "Invalid credentials");

        let request = test::TestRequest::get().uri("/api/profile").to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let request = test::TestRequest::get()
            .uri("/api/profile")
            .insert_header(("Authorization", "Bearer forged"))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn test_duplicate_registration_is_a_conflict() {
        let state = TestState::new(AccessPolicy::default());
        let app = init_test_app!(state);

        let request = test::TestRequest::post()
            .uri("/api/register")
            .set_json(json!({"username": "admin", "email": "new@bookstore.com", "password": "pw"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::CONFLICT
        );

        let request = test::TestRequest::post()
            .uri("/api/register")
            .set_json(json!({"email": "new@bookstore.com", "password": ""}))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::BAD_REQUEST
        );
    }
}
