use std::sync::Arc;

use actix_web::http::header::LOCATION;
use actix_web::web::Data;
use actix_web::{Error, HttpRequest, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{NewSale, Role, SaleId, SalesCount, SalesList};
use crate::auth::{authenticate, require_admin, BearerToken};
use crate::error::ServiceError;
use crate::identity::{IdentityError, IdentityProvider};
use crate::repository::SalesRepository;

const RECENT_SALES_LIMIT: usize = 5;

/// Records a sale, for the token owner when a valid token is sent and as a guest otherwise
#[api_v2_operation]
pub async fn create_sale(
    req: HttpRequest,
    sales_repository: Data<Arc<dyn SalesRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    token: BearerToken,
    sale: web::Json<NewSale>,
) -> Result<HttpResponse, Error> {
    let sale = sale.into_inner();
    sale.validate().map_err(ServiceError::from)?;

    let user_id = match authenticate(identity.get_ref().as_ref(), &token).await {
        Ok(user) => Some(user.id),
        Err(IdentityError::MissingToken) => None,
        Err(IdentityError::InvalidToken) => {
            tracing::warn!("Sale with an invalid token recorded as a guest sale");
            None
        }
        Err(err) => return Err(ServiceError::from(err).into()),
    };

    let recorded = sales_repository
        .record_sale(user_id, sale)
        .await
        .map_err(ServiceError::from)?;
    tracing::info!(
        "Recorded sale {} with total {}",
        recorded.id,
        recorded.total_amount
    );

    Ok(HttpResponse::Created()
        .append_header((
            LOCATION,
            format!("{}/{}", req.path().trim_end_matches('/'), recorded.id),
        ))
        .json(recorded))
}

#[api_v2_operation]
pub async fn get_all_sales(
    sales_repository: Data<Arc<dyn SalesRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    token: BearerToken,
) -> Result<HttpResponse, Error> {
    let user = authenticate(identity.get_ref().as_ref(), &token)
        .await
        .map_err(ServiceError::from)?;
    require_admin(&user)?;

    let sales = sales_repository
        .list_sales()
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(SalesList {
        count: sales.len(),
        sales,
    }))
}

#[api_v2_operation]
pub async fn get_user_sales(
    sales_repository: Data<Arc<dyn SalesRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    token: BearerToken,
) -> Result<HttpResponse, Error> {
    let user = authenticate(identity.get_ref().as_ref(), &token)
        .await
        .map_err(ServiceError::from)?;

    let sales = sales_repository
        .list_sales_for_user(user.id)
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(SalesList {
        count: sales.len(),
        sales,
    }))
}

#[api_v2_operation]
pub async fn get_sales_count(
    sales_repository: Data<Arc<dyn SalesRepository>>,
) -> Result<HttpResponse, Error> {
    let total_count = sales_repository
        .count_sales()
        .await
        .map_err(ServiceError::from)?;
    let recent_sales = sales_repository
        .recent_sales(RECENT_SALES_LIMIT)
        .await
        .map_err(ServiceError::from)?;
    Ok(HttpResponse::Ok().json(SalesCount {
        total_count,
        recent_sales,
    }))
}

/// Visible to the buyer and to admins
#[api_v2_operation]
pub async fn get_sale(
    sales_repository: Data<Arc<dyn SalesRepository>>,
    identity: Data<Arc<dyn IdentityProvider>>,
    token: BearerToken,
    sale_id: web::Path<SaleId>,
) -> Result<HttpResponse, Error> {
    let user = authenticate(identity.get_ref().as_ref(), &token)
        .await
        .map_err(ServiceError::from)?;

    let sale = sales_repository
        .get_sale(sale_id.into_inner())
        .await
        .map_err(ServiceError::from)?;
    if user.role != Role::Admin && sale.user_id != Some(user.id) {
        return Err(ServiceError::Forbidden("Access denied".to_string()).into());
    }
    Ok(HttpResponse::Ok().json(sale))
}
