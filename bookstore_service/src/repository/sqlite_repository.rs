use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, ToSql, Transaction};

use crate::api::{
    Item, ItemDetails, NewSale, Notification, NotificationId, NotificationKind,
    NotificationQuery, Sale, SaleId, SaleLine, UserId,
};
use crate::repository::{
    now_unix_seconds, ItemsRepository, NotificationsRepository, PendingSale, RepositoryError,
    SalesRepository, NOTIFICATIONS_LIMIT,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS items (
        isbn            TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        author          TEXT NOT NULL,
        qty             INTEGER NOT NULL,
        price           REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sales (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id         INTEGER,
        customer_email  TEXT,
        total_amount    REAL NOT NULL,
        sold_at         INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sale_items (
        sale_id         INTEGER NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
        position        INTEGER NOT NULL,
        isbn            TEXT NOT NULL,
        quantity        INTEGER NOT NULL,
        price_at_time   REAL NOT NULL,
        PRIMARY KEY (sale_id, position)
    );
    CREATE TABLE IF NOT EXISTS notifications (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        kind            TEXT NOT NULL,
        message         TEXT NOT NULL,
        isbn            TEXT,
        sale_id         INTEGER REFERENCES sales(id) ON DELETE SET NULL,
        created_at      INTEGER NOT NULL,
        seen_at         INTEGER
    );
";

const SALE_COLUMNS: &str = "id, user_id, customer_email, total_amount, sold_at";
const NOTIFICATION_COLUMNS: &str = "id, kind, message, isbn, sale_id, created_at, seen_at";

/// Store kept in a single local SQLite file
pub struct SqliteRepository {
    connection: Arc<parking_lot::Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn init(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening sqlite store at {}", path.display());
        let connection = Connection::open(path)
            .with_context(|| format!("Failed to open sqlite store {}", path.display()))?;
        Self::with_connection(connection)
    }

    /// Store that lives only as long as the process
    pub fn init_in_memory() -> anyhow::Result<Self> {
        let connection =
            Connection::open_in_memory().context("Failed to open in-memory sqlite store")?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> anyhow::Result<Self> {
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        connection
            .execute_batch(SCHEMA)
            .context("Failed to setup tables")?;
        Ok(Self {
            connection: Arc::new(parking_lot::Mutex::new(connection)),
        })
    }

    /// Runs a blocking sqlite operation on the blocking thread pool
    async fn run<T, F>(&self, operation: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = connection.lock();
            operation(&mut connection)
        })
        .await
        .map_err(|err| RepositoryError::Other(format!("Sqlite task failed: {}", err)))?
    }
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    Ok(Item {
        isbn: row.get(0)?,
        name: row.get(1)?,
        author: row.get(2)?,
        qty: row.get(3)?,
        price: row.get(4)?,
    })
}

fn sale_from_row(row: &Row) -> rusqlite::Result<Sale> {
    Ok(Sale {
        id: row.get(0)?,
        user_id: row.get(1)?,
        customer_email: row.get(2)?,
        total_amount: row.get(3)?,
        sold_at: row.get(4)?,
        items: vec![],
    })
}

/// Loads sales matching the query and fills in their lines
fn load_sales(
    connection: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Sale>, RepositoryError> {
    let mut stmt = connection.prepare(sql)?;
    let mut sales = stmt
        .query_map(params, sale_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lines_stmt = connection.prepare(
        "SELECT isbn, quantity, price_at_time FROM sale_items WHERE sale_id = ?1 ORDER BY position",
    )?;
    for sale in sales.iter_mut() {
        let sale_id = sale.id;
        sale.items = lines_stmt
            .query_map(params![sale_id], |row| {
                Ok(SaleLine {
                    isbn: row.get(0)?,
                    quantity: row.get(1)?,
                    price_at_time: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }
    Ok(sales)
}

fn record_sale_in_transaction(
    tx: &Transaction,
    user_id: Option<UserId>,
    sale: NewSale,
) -> Result<Sale, RepositoryError> {
    let mut pending = PendingSale::default();
    for line in &sale.items {
        let (name, available, price): (String, i64, f64) = tx
            .query_row(
                "SELECT name, qty, price FROM items WHERE isbn = ?1",
                params![line.isbn],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| RepositoryError::ItemNotFound(line.isbn.clone()))?;
        pending.add_line(line, &name, available, price)?;
    }

    for (isbn, title) in pending.titles() {
        let updated = tx.execute(
            "UPDATE items SET qty = qty - ?1 WHERE isbn = ?2 AND qty >= ?1",
            params![title.requested, isbn],
        )?;
        if updated != 1 {
            return Err(title.shortage(isbn));
        }
    }

    let sold_at = now_unix_seconds();
    tx.execute(
        "INSERT INTO sales (user_id, customer_email, total_amount, sold_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, sale.customer_email, pending.total_amount(), sold_at],
    )?;
    let id = SaleId::try_from(tx.last_insert_rowid())
        .map_err(|_| RepositoryError::Other("Sale id out of range".to_string()))?;

    for (position, line) in pending.lines().iter().enumerate() {
        tx.execute(
            "INSERT INTO sale_items (sale_id, position, isbn, quantity, price_at_time) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, position as i64, line.isbn, line.quantity, line.price_at_time],
        )?;
    }

    for alert in pending.stock_alerts() {
        tx.execute(
            "INSERT INTO notifications (kind, message, isbn, sale_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![alert.kind, alert.message, alert.isbn, id, sold_at],
        )?;
    }

    Ok(pending.into_sale(id, user_id, sale.customer_email, sold_at))
}

impl ToSql for NotificationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NotificationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_str()?;
        NotificationKind::from_code(code).ok_or_else(|| {
            FromSqlError::Other(format!("Unknown notification type {}", code).into())
        })
    }
}

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        kind: row.get(1)?,
        message: row.get(2)?,
        isbn: row.get(3)?,
        sale_id: row.get(4)?,
        created_at: row.get(5)?,
        seen_at: row.get(6)?,
    })
}

#[async_trait::async_trait]
impl ItemsRepository for SqliteRepository {
    async fn add_item(&self, item: Item) -> Result<(), RepositoryError> {
        self.run(move |connection| {
            let result = connection.execute(
                "INSERT INTO items (isbn, name, author, qty, price) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![item.isbn, item.name, item.author, item.qty, item.price],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(RepositoryError::ItemAlreadyExists(item.isbn))
                }
                Err(other_err) => Err(other_err.into()),
            }
        })
        .await
    }

    async fn update_item(&self, isbn: &str, details: ItemDetails) -> Result<(), RepositoryError> {
        let isbn = isbn.to_string();
        self.run(move |connection| {
            let updated = connection.execute(
                "UPDATE items SET name = ?1, author = ?2, qty = ?3, price = ?4 WHERE isbn = ?5",
                params![details.name, details.author, details.qty, details.price, isbn],
            )?;
            if updated == 0 {
                Err(RepositoryError::ItemNotFound(isbn))
            } else {
                Ok(())
            }
        })
        .await
    }

    async fn delete_item(&self, isbn: &str) -> Result<(), RepositoryError> {
        let isbn = isbn.to_string();
        self.run(move |connection| {
            let deleted = connection.execute("DELETE FROM items WHERE isbn = ?1", params![isbn])?;
            if deleted == 0 {
                Err(RepositoryError::ItemNotFound(isbn))
            } else {
                Ok(())
            }
        })
        .await
    }

    async fn get_item(&self, isbn: &str) -> Result<Item, RepositoryError> {
        let isbn = isbn.to_string();
        self.run(move |connection| {
            connection
                .query_row(
                    "SELECT isbn, name, author, qty, price FROM items WHERE isbn = ?1",
                    params![isbn],
                    item_from_row,
                )
                .optional()?
                .ok_or_else(|| RepositoryError::ItemNotFound(isbn.clone()))
        })
        .await
    }

    async fn list_items(&self) -> Result<Vec<Item>, RepositoryError> {
        self.run(|connection| {
            let mut stmt = connection
                .prepare("SELECT isbn, name, author, qty, price FROM items ORDER BY isbn")?;
            let items = stmt
                .query_map([], item_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }
}

#[async_trait::async_trait]
impl SalesRepository for SqliteRepository {
    async fn record_sale(
        &self,
        user_id: Option<UserId>,
        sale: NewSale,
    ) -> Result<Sale, RepositoryError> {
        self.run(move |connection| {
            let tx = connection.transaction()?;
            // dropping the transaction without commit rolls it back
            let recorded = record_sale_in_transaction(&tx, user_id, sale)?;
            tx.commit()?;
            Ok(recorded)
        })
        .await
    }

    async fn get_sale(&self, sale_id: SaleId) -> Result<Sale, RepositoryError> {
        self.run(move |connection| {
            load_sales(
                connection,
                &format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS),
                params![sale_id],
            )?
            .pop()
            .ok_or(RepositoryError::SaleNotFound(sale_id))
        })
        .await
    }

    async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        self.run(|connection| {
            load_sales(
                connection,
                &format!(
                    "SELECT {} FROM sales ORDER BY sold_at DESC, id DESC",
                    SALE_COLUMNS
                ),
                [],
            )
        })
        .await
    }

    async fn list_sales_for_user(&self, user_id: UserId) -> Result<Vec<Sale>, RepositoryError> {
        self.run(move |connection| {
            load_sales(
                connection,
                &format!(
                    "SELECT {} FROM sales WHERE user_id = ?1 ORDER BY sold_at DESC, id DESC",
                    SALE_COLUMNS
                ),
                params![user_id],
            )
        })
        .await
    }

    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>, RepositoryError> {
        self.run(move |connection| {
            load_sales(
                connection,
                &format!(
                    "SELECT {} FROM sales ORDER BY sold_at DESC, id DESC LIMIT ?1",
                    SALE_COLUMNS
                ),
                params![limit as i64],
            )
        })
        .await
    }

    async fn count_sales(&self) -> Result<u64, RepositoryError> {
        self.run(|connection| {
            let count: i64 = connection.query_row("SELECT COUNT(*) FROM sales", [], |row| {
                row.get(0)
            })?;
            Ok(count as u64)
        })
        .await
    }
}

#[async_trait::async_trait]
impl NotificationsRepository for SqliteRepository {
    async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let query = query.clone();
        self.run(move |connection| {
            let mut stmt = connection.prepare(&format!(
                "SELECT {} FROM notifications
                WHERE (?1 = 0 OR seen_at IS NULL) AND (?2 IS NULL OR kind = ?2)
                ORDER BY created_at DESC, id DESC LIMIT ?3",
                NOTIFICATION_COLUMNS
            ))?;
            let notifications = stmt
                .query_map(
                    params![query.unseen, query.kind, NOTIFICATIONS_LIMIT as i64],
                    notification_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notifications)
        })
        .await
    }

    async fn acknowledge_notification(
        &self,
        id: NotificationId,
    ) -> Result<Notification, RepositoryError> {
        self.run(move |connection| {
            let updated = connection.execute(
                "UPDATE notifications SET seen_at = COALESCE(seen_at, ?1) WHERE id = ?2",
                params![now_unix_seconds(), id],
            )?;
            if updated == 0 {
                return Err(RepositoryError::NotificationNotFound(id));
            }
            Ok(connection.query_row(
                &format!(
                    "SELECT {} FROM notifications WHERE id = ?1",
                    NOTIFICATION_COLUMNS
                ),
                params![id],
                notification_from_row,
            )?)
        })
        .await
    }
}
