use actix_web::{Error, HttpResponse};
use paperclip::actix::api_v2_operation;

use crate::api::OkResponse;

pub use accounts::{login, profile, register};
pub use items::{add_item, delete_item, get_item, list_items, update_item};
pub use notifications::{acknowledge_notification, list_notifications};
pub use sales::{create_sale, get_all_sales, get_sale, get_sales_count, get_user_sales};

mod accounts;
mod items;
mod notifications;
mod sales;

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(OkResponse::default()))
}
