use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::api::{
    Isbn, Item, ItemDetails, NewSale, Notification, NotificationId, NotificationQuery, Sale,
    SaleId, UserId,
};
use crate::repository::{
    now_unix_seconds, ItemsRepository, NotificationsRepository, PendingSale, RepositoryError,
    SalesRepository, NOTIFICATIONS_LIMIT,
};

pub struct InMemoryRepository {
    items: parking_lot::RwLock<BTreeMap<Isbn, Item>>,
    sales: parking_lot::RwLock<Vec<Sale>>,
    notifications: parking_lot::RwLock<Vec<Notification>>,
    sale_sequence_generator: AtomicI32,
    notification_sequence_generator: AtomicI32,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self {
            items: Default::default(),
            sales: Default::default(),
            notifications: Default::default(),
            sale_sequence_generator: Default::default(),
            notification_sequence_generator: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl ItemsRepository for InMemoryRepository {
    async fn add_item(&self, item: Item) -> Result<(), RepositoryError> {
        match self.items.write().entry(item.isbn.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::ItemAlreadyExists(item.isbn)),
            Entry::Vacant(entry) => {
                entry.insert(item);
                Ok(())
            }
        }
    }

    async fn update_item(&self, isbn: &str, details: ItemDetails) -> Result<(), RepositoryError> {
        let mut locked_items = self.items.write();
        match locked_items.get_mut(isbn) {
            Some(item) => {
                *item = Item::from_details(item.isbn.clone(), details);
                Ok(())
            }
            None => Err(RepositoryError::ItemNotFound(isbn.to_string())),
        }
    }

    async fn delete_item(&self, isbn: &str) -> Result<(), RepositoryError> {
        self.items
            .write()
            .remove(isbn)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::ItemNotFound(isbn.to_string()))
    }

    async fn get_item(&self, isbn: &str) -> Result<Item, RepositoryError> {
        self.items
            .read()
            .get(isbn)
            .cloned()
            .ok_or_else(|| RepositoryError::ItemNotFound(isbn.to_string()))
    }

    async fn list_items(&self) -> Result<Vec<Item>, RepositoryError> {
        Ok(self.items.read().values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl SalesRepository for InMemoryRepository {
    async fn record_sale(
        &self,
        user_id: Option<UserId>,
        sale: NewSale,
    ) -> Result<Sale, RepositoryError> {
        let NewSale {
            items: requested_lines,
            customer_email,
        } = sale;
        let mut locked_items = self.items.write();

        // Check the whole sale before touching any stock
        let mut pending = PendingSale::default();
        for line in &requested_lines {
            let item = locked_items
                .get(&line.isbn)
                .ok_or_else(|| RepositoryError::ItemNotFound(line.isbn.clone()))?;
            pending.add_line(line, &item.name, item.qty, item.price)?;
        }

        for (isbn, title) in pending.titles() {
            if let Some(item) = locked_items.get_mut(isbn) {
                item.qty = title.remaining();
            }
        }

        let id = self.sale_sequence_generator.fetch_add(1, Ordering::Relaxed) + 1;
        let sold_at = now_unix_seconds();
        let alerts = pending.stock_alerts();
        let recorded = pending.into_sale(id, user_id, customer_email, sold_at);

        let mut notifications = self.notifications.write();
        for alert in alerts {
            notifications.push(Notification {
                id: self
                    .notification_sequence_generator
                    .fetch_add(1, Ordering::Relaxed)
                    + 1,
                kind: alert.kind,
                message: alert.message,
                isbn: Some(alert.isbn),
                sale_id: Some(id),
                created_at: sold_at,
                seen_at: None,
            });
        }
        self.sales.write().push(recorded.clone());
        Ok(recorded)
    }

    async fn get_sale(&self, sale_id: SaleId) -> Result<Sale, RepositoryError> {
        self.sales
            .read()
            .iter()
            .find(|sale| sale.id == sale_id)
            .cloned()
            .ok_or(RepositoryError::SaleNotFound(sale_id))
    }

    async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        Ok(self.sales.read().iter().rev().cloned().collect())
    }

    async fn list_sales_for_user(&self, user_id: UserId) -> Result<Vec<Sale>, RepositoryError> {
        Ok(self
            .sales
            .read()
            .iter()
            .rev()
            .filter(|sale| sale.user_id == Some(user_id))
            .cloned()
            .collect())
    }

    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>, RepositoryError> {
        Ok(self.sales.read().iter().rev().take(limit).cloned().collect())
    }

    async fn count_sales(&self) -> Result<u64, RepositoryError> {
        Ok(self.sales.read().len() as u64)
    }
}

#[async_trait::async_trait]
impl NotificationsRepository for InMemoryRepository {
    async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<Notification>, RepositoryError> {
        Ok(self
            .notifications
            .read()
            .iter()
            .rev()
            .filter(|notification| query.matches(notification))
            .take(NOTIFICATIONS_LIMIT)
            .cloned()
            .collect())
    }

    async fn acknowledge_notification(
        &self,
        id: NotificationId,
    ) -> Result<Notification, RepositoryError> {
        let mut notifications = self.notifications.write();
        let notification = notifications
            .iter_mut()
            .find(|notification| notification.id == id)
            .ok_or(RepositoryError::NotificationNotFound(id))?;
        if notification.seen_at.is_none() {
            notification.seen_at = Some(now_unix_seconds());
        }
        Ok(notification.clone())
    }
}
