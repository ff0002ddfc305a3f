use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type Isbn = String;
pub type UserId = i32;
pub type SaleId = i32;
pub type NotificationId = i32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Stock record of a single title, keyed by its ISBN
pub struct Item {
    pub isbn: Isbn,
    pub name: String,
    pub author: String,
    /// Number of copies in stock
    pub qty: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Replacement for every mutable field of an item. The ISBN always comes from the path.
pub struct ItemDetails {
    pub name: String,
    pub author: String,
    pub qty: i64,
    pub price: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvalidItem {
    #[error("isbn must not be empty")]
    EmptyIsbn,

    #[error("qty must not be negative, got {0}")]
    NegativeQty(i64),

    #[error("price must be a non-negative number, got {0}")]
    InvalidPrice(f64),
}

impl Item {
    pub fn from_details(isbn: Isbn, details: ItemDetails) -> Self {
        Self {
            isbn,
            name: details.name,
            author: details.author,
            qty: details.qty,
            price: details.price,
        }
    }

    pub fn details(&self) -> ItemDetails {
        ItemDetails {
            name: self.name.clone(),
            author: self.author.clone(),
            qty: self.qty,
            price: self.price,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidItem> {
        if self.isbn.trim().is_empty() {
            return Err(InvalidItem::EmptyIsbn);
        }
        validate_stock(self.qty, self.price)
    }
}

impl ItemDetails {
    pub fn validate(&self) -> Result<(), InvalidItem> {
        validate_stock(self.qty, self.price)
    }
}

fn validate_stock(qty: i64, price: f64) -> Result<(), InvalidItem> {
    if qty < 0 {
        return Err(InvalidItem::NegativeQty(qty));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(InvalidItem::InvalidPrice(price));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OkResponse {
    pub ok: bool,
}

impl Default for OkResponse {
    fn default() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Body of every failed request
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Login request. Either username or email identifies the account.
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

impl Credentials {
    pub fn new(login: &str, password: &str) -> Self {
        Self {
            username: Some(login.to_string()),
            email: None,
            password: password.to_string(),
        }
    }

    /// Username when given, email otherwise
    pub fn login_name(&self) -> Option<&str> {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.email.as_deref().filter(|email| !email.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct Registration {
    /// Defaults to the email when missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn username(&self) -> &str {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Returned by login and registration
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileResponse {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
pub struct SaleLineRequest {
    pub isbn: Isbn,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Sale request, the buyer is taken from the bearer token when one is sent
pub struct NewSale {
    pub items: Vec<SaleLineRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidSale {
    #[error("Items are required and must be a non-empty list")]
    NoItems,

    #[error("Quantity of {isbn} must be positive, got {quantity}")]
    InvalidQuantity { isbn: Isbn, quantity: i64 },
}

impl NewSale {
    pub fn validate(&self) -> Result<(), InvalidSale> {
        if self.items.is_empty() {
            return Err(InvalidSale::NoItems);
        }
        match self.items.iter().find(|line| line.quantity <= 0) {
            Some(line) => Err(InvalidSale::InvalidQuantity {
                isbn: line.isbn.clone(),
                quantity: line.quantity,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleLine {
    pub isbn: Isbn,
    pub quantity: i64,
    /// Item price when the sale was recorded
    pub price_at_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: SaleId,
    pub user_id: Option<UserId>,
    pub customer_email: Option<String>,
    pub total_amount: f64,
    /// Unix timestamp in seconds
    pub sold_at: i64,
    pub items: Vec<SaleLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesList {
    pub sales: Vec<Sale>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesCount {
    pub total_count: u64,
    pub recent_sales: Vec<Sale>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// A sale left fewer than five copies of a title
    LowStock,
    /// A sale took the last copy of a title
    OutOfStock,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LowStock => "LOW_STOCK",
            NotificationKind::OutOfStock => "OUT_OF_STOCK",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "LOW_STOCK" => Some(NotificationKind::LowStock),
            "OUT_OF_STOCK" => Some(NotificationKind::OutOfStock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Stock alert raised by a sale, waiting for an admin to acknowledge it
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub isbn: Option<Isbn>,
    pub sale_id: Option<SaleId>,
    /// Unix timestamp in seconds
    pub created_at: i64,
    pub seen_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Apiv2Schema)]
/// Filters of the notification listing
pub struct NotificationQuery {
    /// Only notifications nobody acknowledged yet
    #[serde(default)]
    pub unseen: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationKind>,
}

impl NotificationQuery {
    pub fn matches(&self, notification: &Notification) -> bool {
        (!self.unseen || notification.seen_at.is_none())
            && self.kind.map_or(true, |kind| kind == notification.kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationsList {
    pub notifications: Vec<Notification>,
    pub count: usize,
}

#[cfg(test)]
mod api_tests {
    use super::*;

    fn item() -> Item {
        Item {
            isbn: "9780743273565".to_string(),
            name: "The Great Gatsby".to_string(),
            author: "F. Scott Fitzgerald".to_string(),
            qty: 50,
            price: 12.99,
        }
    }

    #[test]
    fn test_item_validation() {
        assert_eq!(item().validate(), Ok(()));

        let blank_isbn = Item {
            isbn: "  ".to_string(),
            ..item()
        };
        assert_eq!(blank_isbn.validate(), Err(InvalidItem::EmptyIsbn));

        let negative_qty = Item { qty: -1, ..item() };
        assert_eq!(negative_qty.validate(), Err(InvalidItem::NegativeQty(-1)));

        let negative_price = Item {
            price: -0.5,
            ..item()
        };
        assert!(matches!(
            negative_price.validate(),
            Err(InvalidItem::InvalidPrice(..))
        ));

        let nan_price = ItemDetails {
            price: f64::NAN,
            ..item().details()
        };
        assert!(matches!(
            nan_price.validate(),
            Err(InvalidItem::InvalidPrice(..))
        ));
    }

    #[test]
    fn test_login_name_prefers_username() {
        let both = Credentials {
            username: Some("admin".to_string()),
            email: Some("admin@bookstore.com".to_string()),
            password: "x".to_string(),
        };
        assert_eq!(both.login_name(), Some("admin"));

        let email_only = Credentials {
            username: Some(" ".to_string()),
            email: Some("admin@bookstore.com".to_string()),
            password: "x".to_string(),
        };
        assert_eq!(email_only.login_name(), Some("admin@bookstore.com"));

        let neither = Credentials {
            username: None,
            email: None,
            password: "x".to_string(),
        };
        assert_eq!(neither.login_name(), None);
    }

    #[test]
    fn test_registration_username_defaults_to_email() {
        let registration: Registration =
            serde_json::from_str(r#"{"email":"reader@bookstore.com","password":"pw"}"#)
                .expect("Failed to parse registration");
        assert_eq!(registration.username(), "reader@bookstore.com");
    }

    #[test]
    fn test_sale_validation() {
        let empty = NewSale {
            items: vec![],
            customer_email: None,
        };
        assert_eq!(empty.validate(), Err(InvalidSale::NoItems));

        let zero_quantity = NewSale {
            items: vec![SaleLineRequest {
                isbn: "1".to_string(),
                quantity: 0,
            }],
            customer_email: None,
        };
        assert_eq!(
            zero_quantity.validate(),
            Err(InvalidSale::InvalidQuantity {
                isbn: "1".to_string(),
                quantity: 0
            })
        );
    }

    #[test]
    fn test_notification_wire_format() {
        let notification = Notification {
            id: 1,
            kind: NotificationKind::OutOfStock,
            message: "'Gatsby' is now out of stock".to_string(),
            isbn: Some("9780743273565".to_string()),
            sale_id: Some(3),
            created_at: 100,
            seen_at: None,
        };
        let value = serde_json::to_value(&notification).expect("Failed to serialize");
        assert_eq!(value["type"], "OUT_OF_STOCK");
        assert_eq!(
            NotificationKind::from_code(NotificationKind::LowStock.as_str()),
            Some(NotificationKind::LowStock)
        );

        let unseen_low: NotificationQuery =
            serde_json::from_str(r#"{"unseen":true,"type":"LOW_STOCK"}"#)
                .expect("Failed to parse query");
        assert!(!unseen_low.matches(&notification));
        assert!(NotificationQuery::default().matches(&notification));

        let seen = Notification {
            seen_at: Some(200),
            ..notification
        };
        let unseen_only = NotificationQuery {
            unseen: true,
            kind: None,
        };
        assert!(!unseen_only.matches(&seen));
    }

    #[test]
    fn test_item_update_ignores_isbn_in_body() {
        let details: ItemDetails = serde_json::from_str(
            r#"{"isbn":"other","name":"n","author":"a","qty":1,"price":2.5}"#,
        )
        .expect("Failed to parse details");
        let item = Item::from_details("9780061120084".to_string(), details);
        assert_eq!(item.isbn, "9780061120084");
    }
}
