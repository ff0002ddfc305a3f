use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{NotificationId, NotificationQuery, NotificationsList};
use crate::auth::{authenticate, require_admin, BearerToken};
use crate::error::ServiceError;
use crate::identity::IdentityProvider;
use crate::repository::NotificationsRepository;

/// Stock alerts, newest first. Admin only.
#[api_v2_operation]
pub async fn list_notifications(
    notifications_repository: Data<Arc<dyn NotificationsRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    token: BearerToken,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, Error> {
    let user = authenticate(identity.get_ref().as_ref(), &token)
        .await
        .map_err(ServiceError::from)?;
    require_admin(&user)?;

    let notifications = notifications_repository
        .list_notifications(&query.into_inner())
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(NotificationsList {
        count: notifications.len(),
        notifications,
    }))
}

#[api_v2_operation]
pub async fn acknowledge_notification(
    notifications_repository: Data<Arc<dyn NotificationsRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    token: BearerToken,
    notification_id: web::Path<NotificationId>,
) -> Result<HttpResponse, Error> {
    let user = authenticate(identity.get_ref().as_ref(), &token)
        .await
        .map_err(ServiceError::from)?;
    require_admin(&user)?;

    let notification = notifications_repository
        .acknowledge_notification(notification_id.into_inner())
        .await
        .map_err(ServiceError::from)?;
    tracing::info!(
        "Notification {} acknowledged by {}",
        notification.id,
        user.username
    );
    Ok(HttpResponse::Ok().json(notification))
}
