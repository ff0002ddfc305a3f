//! Behaviour shared by every repository backend. Each backend runs these
//! scenarios against a fresh, empty store.

use crate::api::{
    Item, ItemDetails, NewSale, NotificationKind, NotificationQuery, SaleLine, SaleLineRequest,
};
use crate::repository::{
    ItemsRepository, NotificationsRepository, RepositoryError, SalesRepository,
};

pub fn gatsby() -> Item {
    Item {
        isbn: "9780743273565".to_string(),
        name: "The Great Gatsby".to_string(),
        author: "F. Scott Fitzgerald".to_string(),
        qty: 50,
        price: 12.99,
    }
}

pub fn mockingbird() -> Item {
    Item {
        isbn: "9780061120084".to_string(),
        name: "To Kill a Mockingbird".to_string(),
        author: "Harper Lee".to_string(),
        qty: 3,
        price: 14.5,
    }
}

fn sale_of(lines: &[(&str, i64)]) -> NewSale {
    NewSale {
        items: lines
            .iter()
            .map(|(isbn, quantity)| SaleLineRequest {
                isbn: isbn.to_string(),
                quantity: *quantity,
            })
            .collect(),
        customer_email: None,
    }
}

pub async fn add_items_and_list_them<R: ItemsRepository>(repo: &R) {
    let list = repo.list_items().await.expect("Failed to list items");
    assert_eq!(list, vec![]);

    repo.add_item(gatsby()).await.expect("Failed to add item");

    let list = repo.list_items().await.expect("Failed to list items");
    assert_eq!(list, vec![gatsby()]);

    repo.add_item(mockingbird())
        .await
        .expect("Failed to add item");

    // ordered by isbn
    let list = repo.list_items().await.expect("Failed to list items");
    assert_eq!(list, vec![mockingbird(), gatsby()]);

    let item = repo
        .get_item(&gatsby().isbn)
        .await
        .expect("Failed to get item");
    assert_eq!(item, gatsby());

    let not_found = repo.get_item("0000000000").await;
    assert!(matches!(not_found, Err(RepositoryError::ItemNotFound(..))));
}

pub async fn duplicate_isbn_is_rejected<R: ItemsRepository>(repo: &R) {
    repo.add_item(gatsby()).await.expect("Failed to add item");

    let duplicate = Item {
        name: "Another title".to_string(),
        qty: 1,
        ..gatsby()
    };
    let result = repo.add_item(duplicate).await;
    assert!(matches!(
        result,
        Err(RepositoryError::ItemAlreadyExists(isbn)) if isbn == gatsby().isbn
    ));

    let list = repo.list_items().await.expect("Failed to list items");
    assert_eq!(list, vec![gatsby()]);
}

pub async fn update_item_replaces_all_fields<R: ItemsRepository>(repo: &R) {
    let missing = repo
        .update_item("0000000000", gatsby().details())
        .await;
    assert!(matches!(missing, Err(RepositoryError::ItemNotFound(..))));

    repo.add_item(gatsby()).await.expect("Failed to add item");

    let new_details = ItemDetails {
        name: "Gatsby (annotated)".to_string(),
        author: "Fitzgerald".to_string(),
        qty: 7,
        price: 20.25,
    };
    repo.update_item(&gatsby().isbn, new_details.clone())
        .await
        .expect("Failed to update item");

    let item = repo
        .get_item(&gatsby().isbn)
        .await
        .expect("Failed to get item");
    assert_eq!(item, Item::from_details(gatsby().isbn, new_details));
}

pub async fn delete_item<R: ItemsRepository>(repo: &R) {
    repo.add_item(gatsby()).await.expect("Failed to add item");
    repo.add_item(mockingbird())
        .await
        .expect("Failed to add item");

    repo.delete_item(&gatsby().isbn)
        .await
        .expect("Failed to delete item");

    let list = repo.list_items().await.expect("Failed to list items");
    assert_eq!(list, vec![mockingbird()]);

    let deleted_again = repo.delete_item(&gatsby().isbn).await;
    assert!(matches!(
        deleted_again,
        Err(RepositoryError::ItemNotFound(..))
    ));
}

pub async fn record_sale_and_list_it<R: ItemsRepository + SalesRepository>(repo: &R) {
    repo.add_item(gatsby()).await.expect("Failed to add item");
    repo.add_item(mockingbird())
        .await
        .expect("Failed to add item");

    let sale = repo
        .record_sale(
            Some(2),
            NewSale {
                customer_email: Some("reader@bookstore.com".to_string()),
                ..sale_of(&[(&gatsby().isbn, 2), (&mockingbird().isbn, 1)])
            },
        )
        .await
        .expect("Failed to record sale");

    assert_eq!(sale.user_id, Some(2));
    assert_eq!(sale.customer_email.as_deref(), Some("reader@bookstore.com"));
    assert_eq!(
        sale.items,
        vec![
            SaleLine {
                isbn: gatsby().isbn,
                quantity: 2,
                price_at_time: 12.99,
            },
            SaleLine {
                isbn: mockingbird().isbn,
                quantity: 1,
                price_at_time: 14.5,
            },
        ]
    );
    assert!((sale.total_amount - (2.0 * 12.99 + 14.5)).abs() < 1e-9);

    let gatsby_after = repo.get_item(&gatsby().isbn).await.unwrap();
    assert_eq!(gatsby_after.qty, 48);
    let mockingbird_after = repo.get_item(&mockingbird().isbn).await.unwrap();
    assert_eq!(mockingbird_after.qty, 2);

    assert_eq!(repo.get_sale(sale.id).await.unwrap(), sale);
    assert_eq!(repo.list_sales().await.unwrap(), vec![sale.clone()]);
    assert_eq!(repo.list_sales_for_user(2).await.unwrap(), vec![sale.clone()]);
    assert_eq!(repo.list_sales_for_user(3).await.unwrap(), vec![]);
    assert_eq!(repo.count_sales().await.unwrap(), 1);

    let missing = repo.get_sale(sale.id + 100).await;
    assert!(matches!(missing, Err(RepositoryError::SaleNotFound(..))));
}

pub async fn insufficient_stock_leaves_store_untouched<R: ItemsRepository + SalesRepository>(
    repo: &R,
) {
    repo.add_item(gatsby()).await.expect("Failed to add item");
    repo.add_item(mockingbird())
        .await
        .expect("Failed to add item");

    // 2 + 2 copies of a title with only 3 in stock
    let result = repo
        .record_sale(
            None,
            sale_of(&[
                (&gatsby().isbn, 1),
                (&mockingbird().isbn, 2),
                (&mockingbird().isbn, 2),
            ]),
        )
        .await;
    assert!(matches!(
        result,
        Err(RepositoryError::InsufficientStock {
            available: 3,
            requested: 4,
            ..
        })
    ));

    let unknown = repo
        .record_sale(None, sale_of(&[(&gatsby().isbn, 1), ("0000000000", 1)]))
        .await;
    assert!(matches!(unknown, Err(RepositoryError::ItemNotFound(..))));

    assert_eq!(repo.get_item(&gatsby().isbn).await.unwrap(), gatsby());
    assert_eq!(
        repo.get_item(&mockingbird().isbn).await.unwrap(),
        mockingbird()
    );
    assert_eq!(repo.count_sales().await.unwrap(), 0);
}

pub async fn sales_are_listed_newest_first<R: ItemsRepository + SalesRepository>(repo: &R) {
    repo.add_item(gatsby()).await.expect("Failed to add item");

    let mut recorded = vec![];
    for user_id in [Some(1), None, Some(1), Some(2), None, Some(1)] {
        let sale = repo
            .record_sale(user_id, sale_of(&[(&gatsby().isbn, 1)]))
            .await
            .expect("Failed to record sale");
        recorded.push(sale);
    }
    recorded.reverse();

    assert_eq!(repo.list_sales().await.unwrap(), recorded);
    assert_eq!(repo.count_sales().await.unwrap(), 6);
    assert_eq!(repo.recent_sales(5).await.unwrap(), recorded[..5].to_vec());

    let first_user_sales: Vec<_> = recorded
        .iter()
        .filter(|sale| sale.user_id == Some(1))
        .cloned()
        .collect();
    assert_eq!(repo.list_sales_for_user(1).await.unwrap(), first_user_sales);

    assert_eq!(repo.get_item(&gatsby().isbn).await.unwrap().qty, 44);
}

pub async fn oversized_sale_is_rejected<R: ItemsRepository + SalesRepository>(repo: &R) {
    let warehouse = Item {
        isbn: "9780451524935".to_string(),
        name: "1984".to_string(),
        author: "George Orwell".to_string(),
        qty: i64::MAX,
        price: 9.99,
    };
    repo.add_item(warehouse.clone())
        .await
        .expect("Failed to add item");
    repo.add_item(gatsby()).await.expect("Failed to add item");

    // the two lines add up past i64::MAX
    let result = repo
        .record_sale(None, sale_of(&[(&warehouse.isbn, 1), (&warehouse.isbn, i64::MAX)]))
        .await;
    assert!(matches!(
        result,
        Err(RepositoryError::InsufficientStock {
            available: i64::MAX,
            requested: i64::MAX,
            ..
        })
    ));

    let result = repo
        .record_sale(None, sale_of(&[(&gatsby().isbn, i64::MAX)]))
        .await;
    assert!(matches!(
        result,
        Err(RepositoryError::InsufficientStock { available: 50, .. })
    ));

    assert_eq!(repo.get_item(&warehouse.isbn).await.unwrap(), warehouse);
    assert_eq!(repo.get_item(&gatsby().isbn).await.unwrap(), gatsby());
    assert_eq!(repo.count_sales().await.unwrap(), 0);
}

pub async fn sales_raise_stock_notifications<
    R: ItemsRepository + SalesRepository + NotificationsRepository,
>(
    repo: &R,
) {
    repo.add_item(gatsby()).await.expect("Failed to add item");
    repo.add_item(mockingbird())
        .await
        .expect("Failed to add item");

    let first = repo
        .record_sale(None, sale_of(&[(&mockingbird().isbn, 1)]))
        .await
        .expect("Failed to record sale");
    let last_copies = repo
        .record_sale(
            Some(1),
            sale_of(&[(&gatsby().isbn, 1), (&mockingbird().isbn, 2)]),
        )
        .await
        .expect("Failed to record sale");

    // a rejected sale raises nothing
    let rejected = repo
        .record_sale(None, sale_of(&[(&mockingbird().isbn, 1)]))
        .await;
    assert!(matches!(
        rejected,
        Err(RepositoryError::InsufficientStock { .. })
    ));

    let notifications = repo
        .list_notifications(&NotificationQuery::default())
        .await
        .expect("Failed to list notifications");
    let summary: Vec<_> = notifications
        .iter()
        .map(|notification| {
            (
                notification.kind,
                notification.isbn.clone(),
                notification.sale_id,
                notification.seen_at,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (
                NotificationKind::OutOfStock,
                Some(mockingbird().isbn),
                Some(last_copies.id),
                None
            ),
            (
                NotificationKind::LowStock,
                Some(mockingbird().isbn),
                Some(last_copies.id),
                None
            ),
            (
                NotificationKind::LowStock,
                Some(mockingbird().isbn),
                Some(first.id),
                None
            ),
        ]
    );
    assert_eq!(
        notifications[2].message,
        "Low stock for 'To Kill a Mockingbird' (stock=2)."
    );
    assert_eq!(
        notifications[0].message,
        "'To Kill a Mockingbird' is now out of stock."
    );
    assert_eq!(repo.get_item(&mockingbird().isbn).await.unwrap().qty, 0);
}

pub async fn notifications_are_filtered_and_acknowledged<
    R: ItemsRepository + SalesRepository + NotificationsRepository,
>(
    repo: &R,
) {
    repo.add_item(mockingbird())
        .await
        .expect("Failed to add item");
    for quantity in [1, 2] {
        repo.record_sale(None, sale_of(&[(&mockingbird().isbn, quantity)]))
            .await
            .expect("Failed to record sale");
    }

    let out_of_stock = repo
        .list_notifications(&NotificationQuery {
            unseen: false,
            kind: Some(NotificationKind::OutOfStock),
        })
        .await
        .expect("Failed to list notifications");
    assert_eq!(out_of_stock.len(), 1);

    let all = repo
        .list_notifications(&NotificationQuery::default())
        .await
        .expect("Failed to list notifications");
    assert_eq!(all.len(), 3);
    let oldest = all[2].clone();
    assert_eq!(oldest.kind, NotificationKind::LowStock);

    let acknowledged = repo
        .acknowledge_notification(oldest.id)
        .await
        .expect("Failed to acknowledge notification");
    let seen_at = acknowledged.seen_at.expect("Acknowledged without seen_at");
    assert_eq!(acknowledged.id, oldest.id);

    let again = repo
        .acknowledge_notification(oldest.id)
        .await
        .expect("Failed to acknowledge notification");
    assert_eq!(again.seen_at, Some(seen_at));

    let unseen = repo
        .list_notifications(&NotificationQuery {
            unseen: true,
            kind: None,
        })
        .await
        .expect("Failed to list notifications");
    assert_eq!(unseen, all[..2].to_vec());

    let unseen_low_stock = repo
        .list_notifications(&NotificationQuery {
            unseen: true,
            kind: Some(NotificationKind::LowStock),
        })
        .await
        .expect("Failed to list notifications");
    assert_eq!(unseen_low_stock, vec![all[1].clone()]);

    let missing = repo.acknowledge_notification(oldest.id + 100).await;
    assert!(matches!(
        missing,
        Err(RepositoryError::NotificationNotFound(..))
    ));
}
