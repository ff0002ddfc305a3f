pub use in_memory_repository::InMemoryRepository;
pub use postgres_repository::{PostgresRepository, PostgresRepositoryConfig};
pub use sqlite_repository::SqliteRepository;

use std::collections::BTreeMap;

use crate::api::{
    Isbn, Item, ItemDetails, NewSale, Notification, NotificationId, NotificationKind,
    NotificationQuery, Sale, SaleId, SaleLine, SaleLineRequest, UserId,
};

mod in_memory_repository;
mod postgres_repository;
mod sqlite_repository;

#[cfg(test)]
mod repository_test_suite;

/// A sale leaving fewer copies than this raises a low stock notification
pub const LOW_STOCK_THRESHOLD: i64 = 5;
/// Most notifications returned by one listing
pub const NOTIFICATIONS_LIMIT: usize = 200;

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("Item {0} not found")]
    ItemNotFound(Isbn),

    #[error("Item {0} already exists")]
    ItemAlreadyExists(Isbn),

    #[error("Sale {0} not found")]
    SaleNotFound(SaleId),

    #[error("Notification {0} not found")]
    NotificationNotFound(NotificationId),

    #[error("Not enough stock for {isbn}. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        isbn: Isbn,
        available: i64,
        requested: i64,
    },

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Sqlite failure {0}")]
    SqliteFailure(#[from] rusqlite::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait ItemsRepository: Send + Sync {
    /// Adds item to repository, fails if an item with the same isbn already exists
    async fn add_item(&self, item: Item) -> Result<(), RepositoryError>;
    /// Replaces every mutable field of the item, fails if the isbn is unknown
    async fn update_item(&self, isbn: &str, details: ItemDetails) -> Result<(), RepositoryError>;
    /// Removes the item, fails if the isbn is unknown
    async fn delete_item(&self, isbn: &str) -> Result<(), RepositoryError>;
    async fn get_item(&self, isbn: &str) -> Result<Item, RepositoryError>;
    /// Lists all items ordered by isbn
    async fn list_items(&self) -> Result<Vec<Item>, RepositoryError>;
}

#[async_trait::async_trait]
pub trait SalesRepository: Send + Sync {
    /// Stores the sale, takes the sold copies out of stock and records the stock
    /// notifications it raises. Either all of it is applied or none of it is.
    async fn record_sale(
        &self,
        user_id: Option<UserId>,
        sale: NewSale,
    ) -> Result<Sale, RepositoryError>;

    async fn get_sale(&self, sale_id: SaleId) -> Result<Sale, RepositoryError>;

    /// All sales, newest first
    async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError>;

    /// Sales of a single user, newest first
    async fn list_sales_for_user(&self, user_id: UserId) -> Result<Vec<Sale>, RepositoryError>;

    /// Up to `limit` newest sales
    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>, RepositoryError>;

    async fn count_sales(&self) -> Result<u64, RepositoryError>;
}

#[async_trait::async_trait]
pub trait NotificationsRepository: Send + Sync {
    /// Newest first, at most NOTIFICATIONS_LIMIT of them
    async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<Notification>, RepositoryError>;

    /// Marks the notification as seen. Acknowledging twice keeps the first time.
    async fn acknowledge_notification(
        &self,
        id: NotificationId,
    ) -> Result<Notification, RepositoryError>;
}

/// Copies of one title taken by a pending sale
pub(crate) struct TitleDemand {
    pub name: String,
    pub available: i64,
    pub requested: i64,
}

impl TitleDemand {
    pub fn remaining(&self) -> i64 {
        self.available - self.requested
    }

    pub fn shortage(&self, isbn: &str) -> RepositoryError {
        RepositoryError::InsufficientStock {
            isbn: isbn.to_string(),
            available: self.available,
            requested: self.requested,
        }
    }
}

/// Notification a sale raises, before the store gives it an id
pub(crate) struct StockAlert {
    pub kind: NotificationKind,
    pub message: String,
    pub isbn: Isbn,
}

/// Sale checked line by line against stock before anything is written
#[derive(Default)]
pub(crate) struct PendingSale {
    titles: BTreeMap<Isbn, TitleDemand>,
    lines: Vec<SaleLine>,
    total_amount: f64,
}

impl PendingSale {
    /// Adds a line priced at the current item price. Repeated titles add up, and a
    /// total above the available copies fails.
    pub fn add_line(
        &mut self,
        line: &SaleLineRequest,
        name: &str,
        available: i64,
        price: f64,
    ) -> Result<(), RepositoryError> {
        let title = self
            .titles
            .entry(line.isbn.clone())
            .or_insert_with(|| TitleDemand {
                name: name.to_string(),
                available,
                requested: 0,
            });
        match title.requested.checked_add(line.quantity) {
            Some(requested) if requested <= title.available => title.requested = requested,
            requested => {
                return Err(RepositoryError::InsufficientStock {
                    isbn: line.isbn.clone(),
                    available: title.available,
                    requested: requested.unwrap_or(i64::MAX),
                })
            }
        }

        self.total_amount += price * line.quantity as f64;
        self.lines.push(SaleLine {
            isbn: line.isbn.clone(),
            quantity: line.quantity,
            price_at_time: price,
        });
        Ok(())
    }

    /// Titles in isbn order
    pub fn titles(&self) -> impl Iterator<Item = (&Isbn, &TitleDemand)> {
        self.titles.iter()
    }

    pub fn total_amount(&self) -> f64 {
        self.total_amount
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    /// Alerts for titles the sale leaves short, in isbn order
    pub fn stock_alerts(&self) -> Vec<StockAlert> {
        let mut alerts = vec![];
        for (isbn, title) in self.titles() {
            let remaining = title.remaining();
            if remaining < LOW_STOCK_THRESHOLD {
                alerts.push(StockAlert {
                    kind: NotificationKind::LowStock,
                    message: format!("Low stock for '{}' (stock={}).", title.name, remaining),
                    isbn: isbn.clone(),
                });
            }
            if remaining == 0 {
                alerts.push(StockAlert {
                    kind: NotificationKind::OutOfStock,
                    message: format!("'{}' is now out of stock.", title.name),
                    isbn: isbn.clone(),
                });
            }
        }
        alerts
    }

    pub fn into_sale(
        self,
        id: SaleId,
        user_id: Option<UserId>,
        customer_email: Option<String>,
        sold_at: i64,
    ) -> Sale {
        Sale {
            id,
            user_id,
            customer_email,
            total_amount: self.total_amount,
            sold_at,
            items: self.lines,
        }
    }
}

fn now_unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
