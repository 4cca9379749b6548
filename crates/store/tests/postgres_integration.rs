//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency; each test
//! truncates the tables it touches, so they are serialized.
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta, Utc};
use common::{CredentialId, CustomerId, PhoneNumber, ProductId, StaffId, VehicleId};
use domain::{
    ConfirmationPhase, ConfirmationRecord, Credential, CredentialPurpose, EvidencePhase,
    EvidencePhoto, Order, OrderItem, OrderNumber, OrderStatus, ReturnReport, ReturnedLine,
    VerificationCode,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CredentialStore, EvidenceStore, InventoryLedger, InventoryLine, OrderStore,
    PostgresSupplyStore, StockDemand, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for the schema
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_supply_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresSupplyStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE evidence_photos, confirmation_records, inventory_lines, credentials, orders",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresSupplyStore::new(pool)
}

fn phone() -> PhoneNumber {
    PhoneNumber::parse("966551234567").unwrap()
}

fn make_order(number: &str) -> Order {
    Order::create(
        OrderNumber::new(number),
        CustomerId::new(),
        "Rooftop reception",
        NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
        phone(),
        vec![
            OrderItem::new("CHAIR-GOLD", "Gold banquet chair", 40),
            OrderItem::new("TABLE-ROUND", "Round table", 5),
        ],
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn test_insert_and_get_order_roundtrip() {
    let store = get_test_store().await;
    let order = make_order("SO-PG-0001");
    store.insert_order(&order).await.unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, order.id);
    assert_eq!(loaded.order_number, order.order_number);
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(loaded.items, order.items);
    assert_eq!(loaded.supervisor_phone, order.supervisor_phone);
    assert!(loaded.timestamps.approved_at.is_none());

    let by_number = store
        .get_order_by_number(&OrderNumber::new("SO-PG-0001"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_number.id, order.id);
}

#[tokio::test]
#[serial]
async fn test_duplicate_order_number_rejected() {
    let store = get_test_store().await;
    store.insert_order(&make_order("SO-PG-0002")).await.unwrap();

    let result = store.insert_order(&make_order("SO-PG-0002")).await;
    assert!(matches!(result, Err(StoreError::DuplicateOrderNumber(_))));
}

#[tokio::test]
#[serial]
async fn test_update_if_status_is_a_compare_and_swap() {
    let store = get_test_store().await;
    let order = make_order("SO-PG-0003");
    store.insert_order(&order).await.unwrap();

    let mut copy_a = store.get_order(order.id).await.unwrap().unwrap();
    let mut copy_b = store.get_order(order.id).await.unwrap().unwrap();

    copy_a.approve(Utc::now()).unwrap();
    store
        .update_if_status(OrderStatus::Pending, &copy_a)
        .await
        .unwrap();

    copy_b.approve(Utc::now()).unwrap();
    match store.update_if_status(OrderStatus::Pending, &copy_b).await {
        Err(StoreError::StaleStatus {
            expected, actual, ..
        }) => {
            assert_eq!(expected, OrderStatus::Pending);
            assert_eq!(actual, OrderStatus::Approved);
        }
        other => panic!("expected StaleStatus, got {other:?}"),
    }

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Approved);
    assert!(loaded.timestamps.approved_at.is_some());
}

#[tokio::test]
#[serial]
async fn test_update_unknown_order_reports_not_found() {
    let store = get_test_store().await;
    let order = make_order("SO-PG-0004");

    let result = store.update_if_status(OrderStatus::Pending, &order).await;
    assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
}

#[tokio::test]
#[serial]
async fn test_full_lifecycle_row_fidelity() {
    let store = get_test_store().await;
    let mut order = make_order("SO-PG-0005");
    store.insert_order(&order).await.unwrap();

    let now = Utc::now();
    order.approve(now).unwrap();
    store
        .update_if_status(OrderStatus::Pending, &order)
        .await
        .unwrap();
    order.start_preparing(now).unwrap();
    store
        .update_if_status(OrderStatus::Approved, &order)
        .await
        .unwrap();
    order.mark_ready(now).unwrap();
    store
        .update_if_status(OrderStatus::Preparing, &order)
        .await
        .unwrap();
    order
        .assign(Some(StaffId::new()), Some(VehicleId::new()), now)
        .unwrap();
    store
        .update_if_status(OrderStatus::Ready, &order)
        .await
        .unwrap();
    order.dispatch(now).unwrap();
    store
        .update_if_status(OrderStatus::Ready, &order)
        .await
        .unwrap();
    order.deliver("Abdullah", now).unwrap();
    store
        .update_if_status(OrderStatus::Dispatched, &order)
        .await
        .unwrap();
    order
        .mark_returned(
            &[ReturnedLine {
                product_id: ProductId::new("TABLE-ROUND"),
                quantity: 1,
            }],
            ReturnReport {
                damaged_items: Some("one table leg bent".to_string()),
                missing_items: None,
            },
            now,
        )
        .unwrap();
    store
        .update_if_status(OrderStatus::Delivered, &order)
        .await
        .unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Returned);
    assert_eq!(loaded.recipient_name.as_deref(), Some("Abdullah"));
    assert_eq!(
        loaded.return_report.as_ref().unwrap().damaged_items,
        Some("one table leg bent".to_string())
    );
    let table = loaded.item(&ProductId::new("TABLE-ROUND")).unwrap();
    assert_eq!(table.quantity_dispatched, 5);
    assert_eq!(table.quantity_returned, 1);
    assert!(loaded.timestamps.returned_at.is_some());
}

#[tokio::test]
#[serial]
async fn test_claim_latest_is_single_use() {
    let store = get_test_store().await;
    let now = Utc::now();
    let cred = Credential::issue(phone(), CredentialPurpose::DeliveryConfirmation, now);
    store.insert_credential(&cred).await.unwrap();

    let claimed = store
        .claim_latest(
            &phone(),
            CredentialPurpose::DeliveryConfirmation,
            cred.code.as_str(),
            now,
        )
        .await
        .unwrap();
    assert_eq!(claimed, Some(cred.id));

    let again = store
        .claim_latest(
            &phone(),
            CredentialPurpose::DeliveryConfirmation,
            cred.code.as_str(),
            now,
        )
        .await
        .unwrap();
    assert_eq!(again, None);
}

#[tokio::test]
#[serial]
async fn test_claim_rejects_expired_credential() {
    let store = get_test_store().await;
    let now = Utc::now();
    let cred = Credential::issue(phone(), CredentialPurpose::DeliveryConfirmation, now);
    store.insert_credential(&cred).await.unwrap();

    let late = now + TimeDelta::minutes(5) + TimeDelta::seconds(1);
    let claimed = store
        .claim_latest(
            &phone(),
            CredentialPurpose::DeliveryConfirmation,
            cred.code.as_str(),
            late,
        )
        .await
        .unwrap();
    assert_eq!(claimed, None);
}

#[tokio::test]
#[serial]
async fn test_claim_only_targets_latest_credential() {
    let store = get_test_store().await;
    let now = Utc::now();

    let mut first = Credential::issue(phone(), CredentialPurpose::OrderApproval, now);
    first.code = VerificationCode::from_stored("111111");
    let mut second = Credential::issue(
        phone(),
        CredentialPurpose::OrderApproval,
        now + TimeDelta::seconds(30),
    );
    second.code = VerificationCode::from_stored("222222");
    store.insert_credential(&first).await.unwrap();
    store.insert_credential(&second).await.unwrap();

    // Superseded code is unclaimable even though valid and unexpired.
    let claimed = store
        .claim_latest(&phone(), CredentialPurpose::OrderApproval, "111111", now)
        .await
        .unwrap();
    assert_eq!(claimed, None);

    let claimed = store
        .claim_latest(&phone(), CredentialPurpose::OrderApproval, "222222", now)
        .await
        .unwrap();
    assert_eq!(claimed, Some(second.id));

    let latest = store
        .latest_credential(&phone(), CredentialPurpose::OrderApproval)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, second.id);
    assert!(latest.claimed);
}

#[tokio::test]
#[serial]
async fn test_deduct_is_all_or_nothing() {
    let store = get_test_store().await;
    store
        .upsert_line(&InventoryLine {
            product_id: ProductId::new("CHAIR-GOLD"),
            available_quantity: 50,
        })
        .await
        .unwrap();
    store
        .upsert_line(&InventoryLine {
            product_id: ProductId::new("TABLE-ROUND"),
            available_quantity: 2,
        })
        .await
        .unwrap();

    let demands = vec![
        StockDemand {
            product_id: ProductId::new("CHAIR-GOLD"),
            quantity: 40,
        },
        StockDemand {
            product_id: ProductId::new("TABLE-ROUND"),
            quantity: 5,
        },
    ];

    match store.deduct(&demands).await {
        Err(StoreError::InsufficientStock(shortfalls)) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].product_id, ProductId::new("TABLE-ROUND"));
            assert_eq!(shortfalls[0].requested, 5);
            assert_eq!(shortfalls[0].available, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // The transaction rolled back: the satisfiable line is untouched.
    let chair = store
        .get_line(&ProductId::new("CHAIR-GOLD"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chair.available_quantity, 50);
}

#[tokio::test]
#[serial]
async fn test_deduct_then_restore_roundtrip() {
    let store = get_test_store().await;
    store
        .upsert_line(&InventoryLine {
            product_id: ProductId::new("CHAIR-GOLD"),
            available_quantity: 50,
        })
        .await
        .unwrap();

    let demands = vec![StockDemand {
        product_id: ProductId::new("CHAIR-GOLD"),
        quantity: 40,
    }];
    store.deduct(&demands).await.unwrap();
    assert_eq!(
        store
            .get_line(&ProductId::new("CHAIR-GOLD"))
            .await
            .unwrap()
            .unwrap()
            .available_quantity,
        10
    );

    store.restore(&demands).await.unwrap();
    assert_eq!(
        store
            .get_line(&ProductId::new("CHAIR-GOLD"))
            .await
            .unwrap()
            .unwrap()
            .available_quantity,
        50
    );
}

fn ready_order(number: &str) -> Order {
    let mut order = make_order(number);
    let now = Utc::now();
    order.approve(now).unwrap();
    order.start_preparing(now).unwrap();
    order.mark_ready(now).unwrap();
    order
        .assign(Some(StaffId::new()), Some(VehicleId::new()), now)
        .unwrap();
    order
}

#[tokio::test]
#[serial]
async fn test_commit_dispatch_is_one_transaction() {
    let store = get_test_store().await;
    let mut order = ready_order("SO-PG-0010");
    store.insert_order(&order).await.unwrap();
    store
        .upsert_line(&InventoryLine {
            product_id: ProductId::new("CHAIR-GOLD"),
            available_quantity: 40,
        })
        .await
        .unwrap();
    store
        .upsert_line(&InventoryLine {
            product_id: ProductId::new("TABLE-ROUND"),
            available_quantity: 2,
        })
        .await
        .unwrap();

    // Shortfall on one line rolls back both the status write and every
    // deduction.
    let demands = StockDemand::from_items(&order.items);
    order.dispatch(Utc::now()).unwrap();
    let result = store
        .commit_dispatch(OrderStatus::Ready, &order, &demands)
        .await;
    match result {
        Err(StoreError::InsufficientStock(shortfalls)) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].product_id, ProductId::new("TABLE-ROUND"));
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Ready);
    assert_eq!(
        store
            .get_line(&ProductId::new("CHAIR-GOLD"))
            .await
            .unwrap()
            .unwrap()
            .available_quantity,
        40
    );

    // Top up the short line; the same commit now lands atomically.
    store
        .upsert_line(&InventoryLine {
            product_id: ProductId::new("TABLE-ROUND"),
            available_quantity: 5,
        })
        .await
        .unwrap();
    store
        .commit_dispatch(OrderStatus::Ready, &order, &demands)
        .await
        .unwrap();
    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Dispatched);
    assert_eq!(
        store
            .get_line(&ProductId::new("CHAIR-GOLD"))
            .await
            .unwrap()
            .unwrap()
            .available_quantity,
        0
    );

    // A stale retry deducts nothing further.
    let result = store
        .commit_dispatch(OrderStatus::Ready, &order, &demands)
        .await;
    assert!(matches!(result, Err(StoreError::StaleStatus { .. })));
    assert_eq!(
        store
            .get_line(&ProductId::new("TABLE-ROUND"))
            .await
            .unwrap()
            .unwrap()
            .available_quantity,
        0
    );
}

#[tokio::test]
#[serial]
async fn test_confirmation_unique_per_phase() {
    let store = get_test_store().await;
    let order = make_order("SO-PG-0006");
    store.insert_order(&order).await.unwrap();

    let record = ConfirmationRecord::new(
        order.id,
        ConfirmationPhase::Delivery,
        "staff:12",
        "Abdullah",
        CredentialId::new(),
        Utc::now(),
    );
    store.record_confirmation(&record).await.unwrap();

    let duplicate = ConfirmationRecord::new(
        order.id,
        ConfirmationPhase::Delivery,
        "staff:13",
        "Someone Else",
        CredentialId::new(),
        Utc::now(),
    );
    let result = store.record_confirmation(&duplicate).await;
    assert!(matches!(result, Err(StoreError::ConfirmationExists { .. })));

    let records = store.confirmations_for_order(order.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].recipient_name, "Abdullah");
}

#[tokio::test]
#[serial]
async fn test_photo_requires_existing_order() {
    let store = get_test_store().await;

    let photo = EvidencePhoto::new(
        common::OrderId::new(),
        EvidencePhase::Loading,
        "blob://nowhere.jpg",
        "staff:1",
        Utc::now(),
    );
    let result = store.attach_photo(&photo).await;
    assert!(matches!(result, Err(StoreError::OrderNotFound(_))));

    let order = make_order("SO-PG-0007");
    store.insert_order(&order).await.unwrap();
    let photo = EvidencePhoto::new(
        order.id,
        EvidencePhase::Loading,
        "blob://orders/loading-1.jpg",
        "staff:1",
        Utc::now(),
    );
    store.attach_photo(&photo).await.unwrap();

    let photos = store.photos_for_order(order.id).await.unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].blob_ref, "blob://orders/loading-1.jpg");
}

#[tokio::test]
#[serial]
async fn test_concurrent_claims_yield_one_winner() {
    let store = get_test_store().await;
    let now = Utc::now();
    let cred = Credential::issue(phone(), CredentialPurpose::DeliveryConfirmation, now);
    store.insert_credential(&cred).await.unwrap();

    let p = phone();
    let (a, b) = tokio::join!(
        store.claim_latest(
            &p,
            CredentialPurpose::DeliveryConfirmation,
            cred.code.as_str(),
            now,
        ),
        store.claim_latest(
            &p,
            CredentialPurpose::DeliveryConfirmation,
            cred.code.as_str(),
            now,
        ),
    );
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
}
