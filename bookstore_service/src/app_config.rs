use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::HttpRequest;
use paperclip::actix::web;

use crate::error::ServiceError;
use crate::handlers;

/// Items are also served under `/books`
const ITEM_COLLECTIONS: [&str; 2] = ["/items", "/books"];

pub fn config_app(base_path: &str) -> impl FnOnce(&mut web::ServiceConfig) {
    let base_path = base_path.trim_end_matches('/').to_string();
    move |cfg| {
        let scope = ITEM_COLLECTIONS.into_iter().fold(
            web::scope(&base_path)
                .service(web::resource("/health").route(web::get().to(handlers::health))),
            |scope, collection| {
                scope
                    .service(
                        web::resource(collection)
                            .route(web::get().to(handlers::list_items))
                            .route(web::post().to(handlers::add_item)),
                    )
                    .service(
                        web::resource(&format!("{}/{{isbn}}", collection))
                            .route(web::get().to(handlers::get_item))
                            .route(web::put().to(handlers::update_item))
                            .route(web::delete().to(handlers::delete_item)),
                    )
            },
        );

        cfg.service(
            scope
                .service(web::resource("/login").route(web::post().to(handlers::login)))
                .service(web::resource("/register").route(web::post().to(handlers::register)))
                .service(web::resource("/profile").route(web::get().to(handlers::profile)))
                .service(
                    web::resource("/sales")
                        .route(web::get().to(handlers::get_all_sales))
                        .route(web::post().to(handlers::create_sale)),
                )
                // fixed paths before the id pattern
                .service(
                    web::resource("/sales/user").route(web::get().to(handlers::get_user_sales)),
                )
                .service(
                    web::resource("/sales/count").route(web::get().to(handlers::get_sales_count)),
                )
                .service(
                    web::resource("/sales/{sale_id}").route(web::get().to(handlers::get_sale)),
                )
                .service(
                    web::resource("/notifications")
                        .route(web::get().to(handlers::list_notifications)),
                )
                .service(
                    web::resource("/notifications/{notification_id}/ack")
                        .route(web::post().to(handlers::acknowledge_notification)),
                ),
        );
    }
}

/// Malformed JSON bodies get the same `{"error": ...}` envelope as every other failure
pub fn json_config() -> actix_web::web::JsonConfig {
    actix_web::web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        ServiceError::BadRequest(format!("Invalid JSON body: {}", err)).into()
    })
}

/// Path segments that do not parse, like a non-numeric sale id
pub fn path_config() -> actix_web::web::PathConfig {
    actix_web::web::PathConfig::default().error_handler(|err: PathError, _req: &HttpRequest| {
        ServiceError::BadRequest(format!("Invalid path: {}", err)).into()
    })
}

pub fn query_config() -> actix_web::web::QueryConfig {
    actix_web::web::QueryConfig::default().error_handler(
        |err: QueryPayloadError, _req: &HttpRequest| {
            ServiceError::BadRequest(format!("Invalid query: {}", err)).into()
        },
    )
}
