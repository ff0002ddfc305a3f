//! Tests against a running bookstore service.
//!
//! The service is expected at `BOOKSTORE_URL` (default `http://127.0.0.1:3000/api`)
//! with an admin account seeded from `BOOKSTORE_ADMIN_LOGIN` / `BOOKSTORE_ADMIN_PASSWORD`
//! (default `admin@bookstore.com` / `admin123`).

#[cfg(all(test, any(feature = "system_tests", feature = "load_tests")))]
use bookstore_service::client::BookstoreClient;



#[cfg(all(test, any(feature = "system_tests", feature = "load_tests")))]
fn service_url() -> String {
    std::env::var("BOOKSTORE_URL").unwrap_or("http://127.0.0.1:3000/api".to_string())
}

#[cfg(all(test, any(feature = "system_tests", feature = "load_tests")))]
async fn admin_client() -> BookstoreClient {
    let client =
        BookstoreClient::with_in_memory_token(&service_url()).expect("Failed to create client");
    let login =
        std::env::var("BOOKSTORE_ADMIN_LOGIN").unwrap_or("admin@bookstore.com".to_string());
    let password = std::env::var("BOOKSTORE_ADMIN_PASSWORD").unwrap_or("admin123".to_string());
    client
        .login(&login, &password)
        .await
        .expect("Failed to login as admin");
    client
}

#[cfg(all(test, any(feature = "system_tests", feature = "load_tests")))]
fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}
