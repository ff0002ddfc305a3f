use anyhow::Context;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, GenericClient, NoTls, Row};

use crate::api::{
    Item, ItemDetails, NewSale, Notification, NotificationId, NotificationKind,
    NotificationQuery, Sale, SaleId, SaleLine, UserId,
};
use crate::repository::{
    now_unix_seconds, ItemsRepository, NotificationsRepository, PendingSale, RepositoryError,
    SalesRepository, NOTIFICATIONS_LIMIT,
};

const SALE_COLUMNS: &str = "id, user_id, customer_email, total_amount, sold_at";
const NOTIFICATION_COLUMNS: &str = "id, kind, message, isbn, sale_id, created_at, seen_at";

pub struct PostgresRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresRepository {
    // sale recording needs exclusive access to open a transaction
    client: tokio::sync::Mutex<Client>,
}

impl PostgresRepository {
    pub async fn init(config: PostgresRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!(
            "Postgres connection_str: postgresql://{}:***@{}",
            config.username,
            config.hostname
        );
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS items (
            isbn            TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            author          TEXT NOT NULL,
            qty             BIGINT NOT NULL,
            price           DOUBLE PRECISION NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup items table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS sales (
            id              SERIAL PRIMARY KEY,
            user_id         INTEGER,
            customer_email  TEXT,
            total_amount    DOUBLE PRECISION NOT NULL,
            sold_at         BIGINT NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup sales table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS sale_items (
            sale_id         INTEGER NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
            position        INTEGER NOT NULL,
            isbn            TEXT NOT NULL,
            quantity        BIGINT NOT NULL,
            price_at_time   DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (sale_id, position)
            )
        ",
            )
            .await
            .context("Failed to setup sale_items table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS notifications (
            id              SERIAL PRIMARY KEY,
            kind            TEXT NOT NULL,
            message         TEXT NOT NULL,
            isbn            TEXT,
            sale_id         INTEGER REFERENCES sales(id) ON DELETE SET NULL,
            created_at      BIGINT NOT NULL,
            seen_at         BIGINT
            )
        ",
            )
            .await
            .context("Failed to setup notifications table")?;

        Ok(Self {
            client: tokio::sync::Mutex::new(client),
        })
    }
}

fn item_from_row(row: &Row) -> Result<Item, RepositoryError> {
    Ok(Item {
        isbn: row.try_get(0)?,
        name: row.try_get(1)?,
        author: row.try_get(2)?,
        qty: row.try_get(3)?,
        price: row.try_get(4)?,
    })
}

fn notification_from_row(row: &Row) -> Result<Notification, RepositoryError> {
    let kind: String = row.try_get(1)?;
    Ok(Notification {
        id: row.try_get(0)?,
        kind: NotificationKind::from_code(&kind)
            .ok_or_else(|| RepositoryError::Other(format!("Unknown notification type {}", kind)))?,
        message: row.try_get(2)?,
        isbn: row.try_get(3)?,
        sale_id: row.try_get(4)?,
        created_at: row.try_get(5)?,
        seen_at: row.try_get(6)?,
    })
}

async fn load_sales<C: GenericClient>(
    client: &C,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<Sale>, RepositoryError> {
    let rows = client.query(sql, params).await?;
    let mut sales = rows
        .iter()
        .map(|row| {
            Ok(Sale {
                id: row.try_get(0)?,
                user_id: row.try_get(1)?,
                customer_email: row.try_get(2)?,
                total_amount: row.try_get(3)?,
                sold_at: row.try_get(4)?,
                items: vec![],
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

    let lines_stmt = client
        .prepare(
            "SELECT isbn, quantity, price_at_time FROM sale_items WHERE sale_id = $1 ORDER BY position",
        )
        .await?;
    for sale in sales.iter_mut() {
        let rows = client.query(&lines_stmt, &[&sale.id]).await?;
        sale.items = rows
            .iter()
            .map(|row| {
                Ok(SaleLine {
                    isbn: row.try_get(0)?,
                    quantity: row.try_get(1)?,
                    price_at_time: row.try_get(2)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
    }
    Ok(sales)
}

#[async_trait::async_trait]
impl ItemsRepository for PostgresRepository {
    async fn add_item(&self, item: Item) -> Result<(), RepositoryError> {
        let client = self.client.lock().await;
        let result = client
            .execute(
                "INSERT INTO items (isbn, name, author, qty, price) VALUES ($1, $2, $3, $4, $5)",
                &[&item.isbn, &item.name, &item.author, &item.qty, &item.price],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(RepositoryError::ItemAlreadyExists(item.isbn))
            }
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn update_item(&self, isbn: &str, details: ItemDetails) -> Result<(), RepositoryError> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE items SET name = $1, author = $2, qty = $3, price = $4 WHERE isbn = $5",
                &[
                    &details.name,
                    &details.author,
                    &details.qty,
                    &details.price,
                    &isbn,
                ],
            )
            .await?;
        if updated == 0 {
            Err(RepositoryError::ItemNotFound(isbn.to_string()))
        } else {
            Ok(())
        }
    }

    async fn delete_item(&self, isbn: &str) -> Result<(), RepositoryError> {
        let client = self.client.lock().await;
        let deleted = client
            .execute("DELETE FROM items WHERE isbn = $1", &[&isbn])
            .await?;
        if deleted == 0 {
            Err(RepositoryError::ItemNotFound(isbn.to_string()))
        } else {
            Ok(())
        }
    }

    async fn get_item(&self, isbn: &str) -> Result<Item, RepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT isbn, name, author, qty, price FROM items WHERE isbn = $1",
                &[&isbn],
            )
            .await?
            .ok_or_else(|| RepositoryError::ItemNotFound(isbn.to_string()))?;
        item_from_row(&row)
    }

    async fn list_items(&self) -> Result<Vec<Item>, RepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT isbn, name, author, qty, price FROM items ORDER BY isbn",
                &[],
            )
            .await?;
        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait::async_trait]
impl SalesRepository for PostgresRepository {
    async fn record_sale(
        &self,
        user_id: Option<UserId>,
        sale: NewSale,
    ) -> Result<Sale, RepositoryError> {
        let mut client = self.client.lock().await;
        // dropped without commit on every early return, which rolls it back
        let tx = client.transaction().await?;

        let mut pending = PendingSale::default();
        for line in &sale.items {
            let row = tx
                .query_opt(
                    "SELECT name, qty, price FROM items WHERE isbn = $1 FOR UPDATE",
                    &[&line.isbn],
                )
                .await?
                .ok_or_else(|| RepositoryError::ItemNotFound(line.isbn.clone()))?;
            let name: String = row.try_get(0)?;
            let available: i64 = row.try_get(1)?;
            let price: f64 = row.try_get(2)?;
            pending.add_line(line, &name, available, price)?;
        }

        for (isbn, title) in pending.titles() {
            let updated = tx
                .execute(
                    "UPDATE items SET qty = qty - $1 WHERE isbn = $2 AND qty >= $1",
                    &[&title.requested, isbn],
                )
                .await?;
            if updated != 1 {
                return Err(title.shortage(isbn));
            }
        }

        let sold_at = now_unix_seconds();
        let row = tx
            .query_one(
                "INSERT INTO sales (user_id, customer_email, total_amount, sold_at) VALUES ($1, $2, $3, $4) RETURNING id",
                &[&user_id, &sale.customer_email, &pending.total_amount(), &sold_at],
            )
            .await?;
        let id: SaleId = row.try_get(0)?;

        for (position, line) in pending.lines().iter().enumerate() {
            tx.execute(
                "INSERT INTO sale_items (sale_id, position, isbn, quantity, price_at_time) VALUES ($1, $2, $3, $4, $5)",
                &[
                    &id,
                    &(position as i32),
                    &line.isbn,
                    &line.quantity,
                    &line.price_at_time,
                ],
            )
            .await?;
        }

        for alert in pending.stock_alerts() {
            tx.execute(
                "INSERT INTO notifications (kind, message, isbn, sale_id, created_at) VALUES ($1, $2, $3, $4, $5)",
                &[
                    &alert.kind.as_str(),
                    &alert.message,
                    &alert.isbn,
                    &id,
                    &sold_at,
                ],
            )
            .await?;
        }

        tx.commit().await?;

        Ok(pending.into_sale(id, user_id, sale.customer_email, sold_at))
    }

    async fn get_sale(&self, sale_id: SaleId) -> Result<Sale, RepositoryError> {
        let client = self.client.lock().await;
        load_sales(
            &*client,
            &format!("SELECT {} FROM sales WHERE id = $1", SALE_COLUMNS),
            &[&sale_id],
        )
        .await?
        .pop()
        .ok_or(RepositoryError::SaleNotFound(sale_id))
    }

    async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        let client = self.client.lock().await;
        load_sales(
            &*client,
            &format!(
                "SELECT {} FROM sales ORDER BY sold_at DESC, id DESC",
                SALE_COLUMNS
            ),
            &[],
        )
        .await
    }

    async fn list_sales_for_user(&self, user_id: UserId) -> Result<Vec<Sale>, RepositoryError> {
        let client = self.client.lock().await;
        load_sales(
            &*client,
            &format!(
                "SELECT {} FROM sales WHERE user_id = $1 ORDER BY sold_at DESC, id DESC",
                SALE_COLUMNS
            ),
            &[&user_id],
        )
        .await
    }

    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>, RepositoryError> {
        let client = self.client.lock().await;
        load_sales(
            &*client,
            &format!(
                "SELECT {} FROM sales ORDER BY sold_at DESC, id DESC LIMIT $1",
                SALE_COLUMNS
            ),
            &[&(limit as i64)],
        )
        .await
    }

    async fn count_sales(&self) -> Result<u64, RepositoryError> {
        let client = self.client.lock().await;
        let row = client.query_one("SELECT COUNT(*) FROM sales", &[]).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count as u64)
    }
}

#[async_trait::async_trait]
impl NotificationsRepository for PostgresRepository {
    async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let client = self.client.lock().await;
        let kind = query.kind.map(|kind| kind.as_str());
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM notifications
                    WHERE ($1 = FALSE OR seen_at IS NULL) AND ($2::TEXT IS NULL OR kind = $2)
                    ORDER BY created_at DESC, id DESC LIMIT $3",
                    NOTIFICATION_COLUMNS
                ),
                &[&query.unseen, &kind, &(NOTIFICATIONS_LIMIT as i64)],
            )
            .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn acknowledge_notification(
        &self,
        id: NotificationId,
    ) -> Result<Notification, RepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE notifications SET seen_at = COALESCE(seen_at, $1) WHERE id = $2 RETURNING {}",
                    NOTIFICATION_COLUMNS
                ),
                &[&now_unix_seconds(), &id],
            )
            .await?
            .ok_or(RepositoryError::NotificationNotFound(id))?;
        notification_from_row(&row)
    }
}
