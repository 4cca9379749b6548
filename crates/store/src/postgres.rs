use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CredentialId, CustomerId, OrderId, PhoneNumber, ProductId, StaffId, VehicleId};
use domain::{
    ConfirmationRecord, Credential, CredentialPurpose, EvidencePhoto, Order, OrderItem,
    OrderNumber, OrderStatus, ReturnReport, Shortfall, StatusTimestamps, VerificationCode,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CredentialStore, EvidenceStore, InventoryLedger, InventoryLine, OrderStore, Result,
    StockDemand, StoreError,
};

/// PostgreSQL-backed supply store.
///
/// Every conditional operation (the status compare-and-swap, the
/// latest-credential claim, the multi-row deduct) is a single conditional
/// `UPDATE` (or one transaction of them, rolled back wholesale), so the
/// precondition and the mutation commit together.
#[derive(Clone)]
pub struct PostgresSupplyStore {
    pool: PgPool,
}

impl PostgresSupplyStore {
    /// Creates a new PostgreSQL supply store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let phone: String = row.try_get("supervisor_phone")?;
        let supervisor_phone =
            PhoneNumber::parse(&phone).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let items_json: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items_json)?;

        let returned_at: Option<DateTime<Utc>> = row.try_get("returned_at")?;
        let damaged_items: Option<String> = row.try_get("damaged_items")?;
        let missing_items: Option<String> = row.try_get("missing_items")?;
        // A return report exists exactly when the order was returned.
        let return_report = returned_at.is_some().then_some(ReturnReport {
            damaged_items,
            missing_items,
        });

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: OrderNumber::new(row.try_get::<String, _>("order_number")?),
            customer: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            event_name: row.try_get("event_name")?,
            event_date: row.try_get("event_date")?,
            status,
            assigned_staff: row
                .try_get::<Option<Uuid>, _>("assigned_staff")?
                .map(StaffId::from_uuid),
            assigned_vehicle: row
                .try_get::<Option<Uuid>, _>("assigned_vehicle")?
                .map(VehicleId::from_uuid),
            supervisor_phone,
            recipient_name: row.try_get("recipient_name")?,
            items,
            return_report,
            cancel_reason: row.try_get("cancel_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            timestamps: StatusTimestamps {
                approved_at: row.try_get("approved_at")?,
                dispatched_at: row.try_get("dispatched_at")?,
                delivered_at: row.try_get("delivered_at")?,
                returned_at,
            },
        })
    }

    fn row_to_credential(row: PgRow) -> Result<Credential> {
        let purpose: String = row.try_get("purpose")?;
        let purpose = purpose
            .parse::<CredentialPurpose>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let phone: String = row.try_get("phone")?;
        let phone = PhoneNumber::parse(&phone).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Credential {
            id: CredentialId::from_uuid(row.try_get::<Uuid, _>("id")?),
            phone,
            code: VerificationCode::from_stored(row.try_get::<String, _>("code")?),
            purpose,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
            claimed: row.try_get("claimed")?,
        })
    }

    fn row_to_line(row: PgRow) -> Result<InventoryLine> {
        let available: i64 = row.try_get("available_quantity")?;
        Ok(InventoryLine {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            available_quantity: u32::try_from(available)
                .map_err(|_| StoreError::Corrupt(format!("negative stock level: {available}")))?,
        })
    }

    fn row_to_photo(row: PgRow) -> Result<EvidencePhoto> {
        let phase: String = row.try_get("phase")?;
        Ok(EvidencePhoto {
            id: common::PhotoId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            phase: phase
                .parse()
                .map_err(|e: domain::UnknownPhase| StoreError::Corrupt(e.to_string()))?,
            blob_ref: row.try_get("blob_ref")?,
            uploaded_by: row.try_get("uploaded_by")?,
            uploaded_at: row.try_get("uploaded_at")?,
        })
    }

    fn row_to_confirmation(row: PgRow) -> Result<ConfirmationRecord> {
        let phase: String = row.try_get("phase")?;
        Ok(ConfirmationRecord {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            phase: phase
                .parse()
                .map_err(|e: domain::UnknownPhase| StoreError::Corrupt(e.to_string()))?,
            confirmed_by: row.try_get("confirmed_by")?,
            recipient_name: row.try_get("recipient_name")?,
            credential_id: CredentialId::from_uuid(row.try_get::<Uuid, _>("credential_id")?),
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

/// True if the error is a violation of the named constraint.
fn violates(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, event_name, event_date, status, \
     assigned_staff, assigned_vehicle, supervisor_phone, recipient_name, items, \
     damaged_items, missing_items, cancel_reason, created_at, updated_at, \
     approved_at, dispatched_at, delivered_at, returned_at";

const UPDATE_ORDER_SQL: &str = r#"
UPDATE orders
SET status = $3, assigned_staff = $4, assigned_vehicle = $5, recipient_name = $6,
    items = $7, damaged_items = $8, missing_items = $9, cancel_reason = $10,
    updated_at = $11, approved_at = $12, dispatched_at = $13, delivered_at = $14,
    returned_at = $15
WHERE id = $1 AND status = $2
"#;

impl PostgresSupplyStore {
    /// Conditionally writes the whole order row; the precondition (current
    /// status) and the mutation are one update. Returns the affected row
    /// count: zero means the status no longer matched (or no such order).
    async fn exec_order_cas<'e, E>(executor: E, expected: OrderStatus, order: &Order) -> Result<u64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let items_json = serde_json::to_value(&order.items)?;
        let report = order.return_report.as_ref();

        let result = sqlx::query(UPDATE_ORDER_SQL)
            .bind(order.id.as_uuid())
            .bind(expected.as_str())
            .bind(order.status.as_str())
            .bind(order.assigned_staff.map(|s| s.as_uuid()))
            .bind(order.assigned_vehicle.map(|v| v.as_uuid()))
            .bind(&order.recipient_name)
            .bind(items_json)
            .bind(report.and_then(|r| r.damaged_items.clone()))
            .bind(report.and_then(|r| r.missing_items.clone()))
            .bind(&order.cancel_reason)
            .bind(order.updated_at)
            .bind(order.timestamps.approved_at)
            .bind(order.timestamps.dispatched_at)
            .bind(order.timestamps.delivered_at)
            .bind(order.timestamps.returned_at)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Resolves a zero-row CAS into the right conflict error by re-reading
    /// the stored status.
    async fn status_conflict(&self, expected: OrderStatus, order_id: OrderId) -> Result<StoreError> {
        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(match actual {
            None => StoreError::OrderNotFound(order_id),
            Some(actual) => StoreError::StaleStatus {
                order_id,
                expected,
                actual: actual
                    .parse()
                    .map_err(|e: domain::UnknownStatus| StoreError::Corrupt(e.to_string()))?,
            },
        })
    }

    /// Applies conditional decrements for every demand inside `tx`.
    /// Returns false (caller rolls back) as soon as any line misses.
    async fn try_deduct_lines(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        demands: &[StockDemand],
    ) -> Result<bool> {
        for demand in demands {
            let result = sqlx::query(
                r#"
                UPDATE inventory_lines
                SET available_quantity = available_quantity - $2
                WHERE product_id = $1 AND available_quantity >= $2
                "#,
            )
            .bind(demand.product_id.as_str())
            .bind(i64::from(demand.quantity))
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for PostgresSupplyStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let items_json = serde_json::to_value(&order.items)?;
        let report = order.return_report.as_ref();

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, event_name, event_date, status,
                                assigned_staff, assigned_vehicle, supervisor_phone, recipient_name,
                                items, damaged_items, missing_items, cancel_reason,
                                created_at, updated_at, approved_at, dispatched_at, delivered_at, returned_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.customer.as_uuid())
        .bind(&order.event_name)
        .bind(order.event_date)
        .bind(order.status.as_str())
        .bind(order.assigned_staff.map(|s| s.as_uuid()))
        .bind(order.assigned_vehicle.map(|v| v.as_uuid()))
        .bind(order.supervisor_phone.as_str())
        .bind(&order.recipient_name)
        .bind(items_json)
        .bind(report.and_then(|r| r.damaged_items.clone()))
        .bind(report.and_then(|r| r.missing_items.clone()))
        .bind(&order.cancel_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.timestamps.approved_at)
        .bind(order.timestamps.dispatched_at)
        .bind(order.timestamps.delivered_at)
        .bind(order.timestamps.returned_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, "unique_order_number") {
                StoreError::DuplicateOrderNumber(order.order_number.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_if_status(&self, expected: OrderStatus, order: &Order) -> Result<()> {
        let rows = Self::exec_order_cas(&self.pool, expected, order).await?;
        if rows == 0 {
            return Err(self.status_conflict(expected, order.id).await?);
        }
        Ok(())
    }

    async fn commit_dispatch(
        &self,
        expected: OrderStatus,
        order: &Order,
        demands: &[StockDemand],
    ) -> Result<()> {
        // Status CAS and inventory deduction commit or roll back together.
        let mut tx = self.pool.begin().await?;

        let rows = Self::exec_order_cas(&mut *tx, expected, order).await?;
        if rows == 0 {
            tx.rollback().await?;
            return Err(self.status_conflict(expected, order.id).await?);
        }

        if !Self::try_deduct_lines(&mut tx, demands).await? {
            tx.rollback().await?;
            // Report every shortfall, not just the first line that missed.
            let shortfalls = self.check_availability(demands).await?;
            return Err(StoreError::InsufficientStock(shortfalls));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresSupplyStore {
    async fn insert_credential(&self, credential: &Credential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (id, phone, code, purpose, issued_at, expires_at, claimed)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(credential.id.as_uuid())
        .bind(credential.phone.as_str())
        .bind(credential.code.as_str())
        .bind(credential.purpose.as_str())
        .bind(credential.issued_at)
        .bind(credential.expires_at)
        .bind(credential.claimed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_credential(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
    ) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT id, phone, code, purpose, issued_at, expires_at, claimed
            FROM credentials
            WHERE phone = $1 AND purpose = $2
            ORDER BY issued_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(phone.as_str())
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_credential).transpose()
    }

    async fn claim_latest(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CredentialId>> {
        // One conditional update: the claim only lands on the latest
        // credential, and only while it is unclaimed, unexpired and the
        // code matches. Concurrent duplicate attempts race on `claimed`.
        let claimed: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE credentials
            SET claimed = TRUE
            WHERE id = (
                SELECT id FROM credentials
                WHERE phone = $1 AND purpose = $2
                ORDER BY issued_at DESC, id DESC
                LIMIT 1
            )
              AND claimed = FALSE
              AND expires_at > $3
              AND code = $4
            RETURNING id
            "#,
        )
        .bind(phone.as_str())
        .bind(purpose.as_str())
        .bind(now)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.map(CredentialId::from_uuid))
    }
}

#[async_trait]
impl InventoryLedger for PostgresSupplyStore {
    async fn upsert_line(&self, line: &InventoryLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_lines (product_id, available_quantity)
            VALUES ($1, $2)
            ON CONFLICT (product_id) DO UPDATE SET available_quantity = EXCLUDED.available_quantity
            "#,
        )
        .bind(line.product_id.as_str())
        .bind(i64::from(line.available_quantity))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_line(&self, product_id: &ProductId) -> Result<Option<InventoryLine>> {
        let row = sqlx::query(
            "SELECT product_id, available_quantity FROM inventory_lines WHERE product_id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_line).transpose()
    }

    async fn list_lines(&self) -> Result<Vec<InventoryLine>> {
        let rows = sqlx::query(
            "SELECT product_id, available_quantity FROM inventory_lines ORDER BY product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_line).collect()
    }

    async fn check_availability(&self, demands: &[StockDemand]) -> Result<Vec<Shortfall>> {
        let ids: Vec<String> = demands
            .iter()
            .map(|d| d.product_id.as_str().to_string())
            .collect();

        let rows = sqlx::query(
            "SELECT product_id, available_quantity FROM inventory_lines WHERE product_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut available = std::collections::HashMap::new();
        for row in rows {
            let line = Self::row_to_line(row)?;
            available.insert(line.product_id, line.available_quantity);
        }

        Ok(demands
            .iter()
            .filter_map(|demand| {
                let on_hand = available.get(&demand.product_id).copied().unwrap_or(0);
                (on_hand < demand.quantity).then(|| Shortfall {
                    product_id: demand.product_id.clone(),
                    requested: demand.quantity,
                    available: on_hand,
                })
            })
            .collect())
    }

    async fn deduct(&self, demands: &[StockDemand]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !Self::try_deduct_lines(&mut tx, demands).await? {
            // Any miss aborts the whole deduction; report every shortfall.
            tx.rollback().await?;
            let shortfalls = self.check_availability(demands).await?;
            return Err(StoreError::InsufficientStock(shortfalls));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn restore(&self, demands: &[StockDemand]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for demand in demands {
            sqlx::query(
                r#"
                INSERT INTO inventory_lines (product_id, available_quantity)
                VALUES ($1, $2)
                ON CONFLICT (product_id)
                DO UPDATE SET available_quantity = inventory_lines.available_quantity + EXCLUDED.available_quantity
                "#,
            )
            .bind(demand.product_id.as_str())
            .bind(i64::from(demand.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EvidenceStore for PostgresSupplyStore {
    async fn attach_photo(&self, photo: &EvidencePhoto) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO evidence_photos (id, order_id, phase, blob_ref, uploaded_by, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(photo.id.as_uuid())
        .bind(photo.order_id.as_uuid())
        .bind(photo.phase.as_str())
        .bind(&photo.blob_ref)
        .bind(&photo.uploaded_by)
        .bind(photo.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, "evidence_photos_order_id_fkey") {
                StoreError::OrderNotFound(photo.order_id)
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn photos_for_order(&self, order_id: OrderId) -> Result<Vec<EvidencePhoto>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, phase, blob_ref, uploaded_by, uploaded_at
            FROM evidence_photos
            WHERE order_id = $1
            ORDER BY uploaded_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_photo).collect()
    }

    async fn record_confirmation(&self, record: &ConfirmationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO confirmation_records (order_id, phase, confirmed_by, recipient_name, credential_id, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.order_id.as_uuid())
        .bind(record.phase.as_str())
        .bind(&record.confirmed_by)
        .bind(&record.recipient_name)
        .bind(record.credential_id.as_uuid())
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, "unique_confirmation_phase") {
                StoreError::ConfirmationExists {
                    order_id: record.order_id,
                    phase: record.phase,
                }
            } else if violates(&e, "confirmation_records_order_id_fkey") {
                StoreError::OrderNotFound(record.order_id)
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn confirmations_for_order(&self, order_id: OrderId) -> Result<Vec<ConfirmationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, phase, confirmed_by, recipient_name, credential_id, recorded_at
            FROM confirmation_records
            WHERE order_id = $1
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_confirmation).collect()
    }
}
