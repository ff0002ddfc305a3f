use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{Isbn, Item, ItemDetails, OkResponse};
use crate::auth::{authorize_item_write, AccessPolicy, BearerToken};
use crate::error::ServiceError;
use crate::identity::IdentityProvider;
use crate::repository::ItemsRepository;

#[api_v2_operation]
pub async fn list_items(
    items_repository: Data<Arc<dyn ItemsRepository>>,
) -> Result<HttpResponse, Error> {
    let items = items_repository
        .list_items()
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(items))
}

#[api_v2_operation]
pub async fn add_item(
    items_repository: Data<Arc<dyn ItemsRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    policy: Data<AccessPolicy>,
    token: BearerToken,
    item: web::Json<Item>,
) -> Result<HttpResponse, Error> {
    authorize_item_write(&policy, identity.get_ref().as_ref(), &token).await?;
    let item = item.into_inner();
    item.validate().map_err(ServiceError::from)?;

    let isbn = item.isbn.clone();
    items_repository
        .add_item(item)
        .await
        .map_err(ServiceError::from)?;
    tracing::info!("Added item {}", isbn);
    Ok(HttpResponse::Ok().json(OkResponse::default()))
}

#[api_v2_operation]
pub async fn get_item(
    items_repository: Data<Arc<dyn ItemsRepository>>,
    isbn: web::Path<Isbn>,
) -> Result<HttpResponse, Error> {
    let item = items_repository
        .get_item(&isbn)
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(item))
}

#[api_v2_operation]
pub async fn update_item(
    items_repository: Data<Arc<dyn ItemsRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    policy: Data<AccessPolicy>,
    token: BearerToken,
    isbn: web::Path<Isbn>,
    details: web::Json<ItemDetails>,
) -> Result<HttpResponse, Error> {
    authorize_item_write(&policy, identity.get_ref().as_ref(), &token).await?;
    let details = details.into_inner();
    details.validate().map_err(ServiceError::from)?;

    items_repository
        .update_item(&isbn, details)
        .await
        .map_err(ServiceError::from)?;
    tracing::info!("Updated item {}", isbn);
    Ok(HttpResponse::Ok().json(OkResponse::default()))
}

#[api_v2_operation]
pub async fn delete_item(
    items_repository: Data<Arc<dyn ItemsRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    policy: Data<AccessPolicy>,
    token: BearerToken,
    isbn: web::Path<Isbn>,
) -> Result<HttpResponse, Error> {
    authorize_item_write(&policy, identity.get_ref().as_ref(), &token).await?;
    items_repository
        .delete_item(&isbn)
        .await
        .map_err(ServiceError::from)?;
    tracing::info!("Deleted item {}", isbn);
    Ok(HttpResponse::Ok().json(OkResponse::default()))
}
