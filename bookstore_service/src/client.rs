use std::sync::Arc;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::{
    AuthResponse, Item, ItemDetails, NewSale, Notification, NotificationId, NotificationQuery,
    NotificationsList, OkResponse, ProfileResponse, Sale, SalesCount, SalesList,
};

pub use login::{LoginSession, LoginShape};
pub use token_store::{FileTokenStore, InMemoryTokenStore, TokenStore, TOKEN_KEY};

mod login;
mod token_store;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Non-2xx answer, with the response text or the reason phrase when the body was empty
    #[error("API {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request failed {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("Failed to read response {0}")]
    Body(#[from] reqwest::Error),

    #[error("Failed to decode JSON {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid header value {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid url {0}")]
    InvalidUrl(String),

    #[error("Response has no JSON body")]
    MissingBody,

    #[error("Login response carries no token")]
    MissingToken,

    #[error("Token store failure {0}")]
    TokenStore(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Encoded as JSON with `Content-Type: application/json`
    Json(Value),
    /// Sent as is, e.g. an already encoded form, with the caller's headers untouched
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn json<T: Serialize>(method: Method, body: &T) -> Result<Self, ClientError> {
        Ok(Self {
            method,
            body: RequestBody::Json(serde_json::to_value(body)?),
            ..Default::default()
        })
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// Client of the bookstore API. Every call carries the stored bearer token, if any.
pub struct BookstoreClient {
    base_url: String,
    client: ClientWithMiddleware,
    token_store: Arc<dyn TokenStore>,
}

impl BookstoreClient {
    /// `base_url` includes the API prefix, e.g. `http://localhost:3000/api`
    pub fn new(base_url: &str, token_store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            base_url: base_url.to_string(),
            client,
            token_store,
        })
    }

    pub fn with_in_memory_token(base_url: &str) -> anyhow::Result<Self> {
        Self::new(base_url, Arc::new(InMemoryTokenStore::default()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: &str) {
        self.base_url = base_url.to_string();
    }

    pub fn token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.token_store.token()?)
    }

    pub fn set_token(&self, token: &str) -> Result<(), ClientError> {
        Ok(self.token_store.store_token(token)?)
    }

    pub fn clear_token(&self) -> Result<(), ClientError> {
        Ok(self.token_store.clear_token()?)
    }

    /// Sends a request to `base_url + path`.
    /// Returns the parsed body for JSON responses and `None` for any other content type.
    pub async fn api(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Option<Value>, ClientError> {
        let RequestOptions {
            method,
            mut headers,
            body,
        } = options;

        if let Some(token) = self.token()? {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        let body = match body {
            RequestBody::Empty => None,
            RequestBody::Json(value) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Some(serde_json::to_vec(&value)?)
            }
            RequestBody::Binary(bytes) => Some(bytes),
        };

        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                text
            };
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|content_type| content_type.contains("application/json"))
            .unwrap_or_default();
        if !is_json {
            return Ok(None);
        }

        let content = response.bytes().await?;
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&content)?))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ClientError> {
        let value = self.api(path, options).await?.ok_or(ClientError::MissingBody)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Calls POST /login and keeps the returned token for the following calls.
    /// A response without a token fails and leaves the stored token as it was.
    pub async fn login(&self, login: &str, password: &str) -> Result<LoginSession, ClientError> {
        let raw = self
            .api(
                "/login",
                RequestOptions::json(
                    Method::POST,
                    &json!({"email": login, "password": password}),
                )?,
            )
            .await?
            .unwrap_or(Value::Null);

        let session = LoginSession::from_response(raw).ok_or(ClientError::MissingToken)?;
        self.set_token(&session.token)?;
        Ok(session)
    }

    /// Calls POST /register
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        self.call(
            "/register",
            RequestOptions::json(
                Method::POST,
                &json!({"email": email, "password": password}),
            )?,
        )
        .await
    }

    /// Calls GET /profile
    pub async fn profile(&self) -> Result<ProfileResponse, ClientError> {
        self.call("/profile", RequestOptions::default()).await
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.clear_token()
    }

    /// Calls GET /books
    pub async fn get_books(&self) -> Result<Vec<Item>, ClientError> {
        self.call("/books", RequestOptions::default()).await
    }

    /// Calls GET /books/{isbn}
    pub async fn get_book(&self, isbn: &str) -> Result<Item, ClientError> {
        self.call(&book_path(isbn)?, RequestOptions::default())
            .await
    }

    /// Calls POST /books
    pub async fn add_book(&self, item: &Item) -> Result<OkResponse, ClientError> {
        self.call("/books", RequestOptions::json(Method::POST, item)?)
            .await
    }

    /// Calls PUT /books/{isbn}
    pub async fn edit_book(
        &self,
        isbn: &str,
        details: &ItemDetails,
    ) -> Result<OkResponse, ClientError> {
        self.call(&book_path(isbn)?, RequestOptions::json(Method::PUT, details)?)
            .await
    }

    /// Calls DELETE /books/{isbn}
    pub async fn del_book(&self, isbn: &str) -> Result<OkResponse, ClientError> {
        self.call(&book_path(isbn)?, RequestOptions::new(Method::DELETE))
            .await
    }

    /// Calls POST /sales
    pub async fn create_sale(&self, sale: &NewSale) -> Result<Sale, ClientError> {
        self.call("/sales", RequestOptions::json(Method::POST, sale)?)
            .await
    }

    /// Calls GET /sales, admin only
    pub async fn get_all_sales(&self) -> Result<SalesList, ClientError> {
        self.call("/sales", RequestOptions::default()).await
    }

    /// Calls GET /sales/user
    pub async fn get_user_sales(&self) -> Result<SalesList, ClientError> {
        self.call("/sales/user", RequestOptions::default()).await
    }

    /// Calls GET /sales/count
    pub async fn get_sales_count(&self) -> Result<SalesCount, ClientError> {
        self.call("/sales/count", RequestOptions::default()).await
    }

    /// Calls GET /notifications, admin only
    pub async fn get_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<NotificationsList, ClientError> {
        self.call(&notifications_path(query), RequestOptions::default())
            .await
    }

    /// Calls POST /notifications/{id}/ack, admin only
    pub async fn ack_notification(&self, id: NotificationId) -> Result<Notification, ClientError> {
        self.call(
            &format!("/notifications/{}/ack", id),
            RequestOptions::new(Method::POST),
        )
        .await
    }
}

fn notifications_path(query: &NotificationQuery) -> String {
    let mut filters = vec![];
    if query.unseen {
        filters.push("unseen=true".to_string());
    }
    if let Some(kind) = query.kind {
        filters.push(format!("type={}", kind.as_str()));
    }
    if filters.is_empty() {
        "/notifications".to_string()
    } else {
        format!("/notifications?{}", filters.join("&"))
    }
}

const BOOKS_URL: &str = "http://localhost/books";

/// `/books/{isbn}` with the isbn percent-encoded as a single path segment
fn book_path(isbn: &str) -> Result<String, ClientError> {
    let mut url =
        Url::parse(BOOKS_URL).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl(BOOKS_URL.to_string()))?
        .push(isbn);
    Ok(url.path().to_string())
}
