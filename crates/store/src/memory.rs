use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CredentialId, OrderId, PhoneNumber, ProductId};
use domain::{
    ConfirmationRecord, Credential, CredentialPurpose, EvidencePhoto, Order, OrderNumber,
    OrderStatus, Shortfall,
};
use tokio::sync::RwLock;

use crate::{
    CredentialStore, EvidenceStore, InventoryLedger, InventoryLine, OrderStore, Result,
    StockDemand, StoreError,
};

/// In-memory supply store for tests and development.
///
/// Provides the same interface and conflict semantics as the PostgreSQL
/// implementation: every conditional update happens under one write-lock
/// scope, so the compare-and-swap, claim and deduct operations are just as
/// atomic as their SQL counterparts.
#[derive(Clone, Default)]
pub struct InMemorySupplyStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    credentials: Arc<RwLock<Vec<Credential>>>,
    inventory: Arc<RwLock<HashMap<ProductId, u32>>>,
    photos: Arc<RwLock<Vec<EvidencePhoto>>>,
    confirmations: Arc<RwLock<Vec<ConfirmationRecord>>>,
}

impl InMemorySupplyStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of credentials ever stored, claimed or
    /// not.
    pub async fn credential_count(&self) -> usize {
        self.credentials.read().await.len()
    }

    /// Clears all state.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
        self.credentials.write().await.clear();
        self.inventory.write().await.clear();
        self.photos.write().await.clear();
        self.confirmations.write().await.clear();
    }
}

#[async_trait]
impl OrderStore for InMemorySupplyStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| &o.order_number == number)
            .cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_if_status(&self, expected: OrderStatus, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;
        if stored.status != expected {
            return Err(StoreError::StaleStatus {
                order_id: order.id,
                expected,
                actual: stored.status,
            });
        }
        *stored = order.clone();
        Ok(())
    }

    async fn commit_dispatch(
        &self,
        expected: OrderStatus,
        order: &Order,
        demands: &[StockDemand],
    ) -> Result<()> {
        // One lock scope over both maps: the status check, the stock check
        // and both mutations are a single atomic step, matching the SQL
        // backend's transaction.
        let mut orders = self.orders.write().await;
        let mut inventory = self.inventory.write().await;

        let stored = orders
            .get_mut(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;
        if stored.status != expected {
            return Err(StoreError::StaleStatus {
                order_id: order.id,
                expected,
                actual: stored.status,
            });
        }

        let shortfalls = shortfalls_of(&inventory, demands);
        if !shortfalls.is_empty() {
            return Err(StoreError::InsufficientStock(shortfalls));
        }

        for demand in demands {
            if let Some(available) = inventory.get_mut(&demand.product_id) {
                *available -= demand.quantity;
            }
        }
        *stored = order.clone();
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemorySupplyStore {
    async fn insert_credential(&self, credential: &Credential) -> Result<()> {
        self.credentials.write().await.push(credential.clone());
        Ok(())
    }

    async fn latest_credential(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
    ) -> Result<Option<Credential>> {
        let credentials = self.credentials.read().await;
        Ok(latest_index(&credentials, phone, purpose).map(|i| credentials[i].clone()))
    }

    async fn claim_latest(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CredentialId>> {
        let mut credentials = self.credentials.write().await;
        let Some(index) = latest_index(&credentials, phone, purpose) else {
            return Ok(None);
        };
        let credential = &mut credentials[index];
        if credential.is_claimable(now) && credential.code.matches(code) {
            credential.claimed = true;
            Ok(Some(credential.id))
        } else {
            Ok(None)
        }
    }
}

/// Index of the most recently issued credential for (phone, purpose);
/// insertion order breaks issued-at ties.
fn latest_index(
    credentials: &[Credential],
    phone: &PhoneNumber,
    purpose: CredentialPurpose,
) -> Option<usize> {
    credentials
        .iter()
        .enumerate()
        .filter(|(_, c)| &c.phone == phone && c.purpose == purpose)
        .max_by_key(|(i, c)| (c.issued_at, *i))
        .map(|(i, _)| i)
}

#[async_trait]
impl InventoryLedger for InMemorySupplyStore {
    async fn upsert_line(&self, line: &InventoryLine) -> Result<()> {
        self.inventory
            .write()
            .await
            .insert(line.product_id.clone(), line.available_quantity);
        Ok(())
    }

    async fn get_line(&self, product_id: &ProductId) -> Result<Option<InventoryLine>> {
        Ok(self
            .inventory
            .read()
            .await
            .get(product_id)
            .map(|&available_quantity| InventoryLine {
                product_id: product_id.clone(),
                available_quantity,
            }))
    }

    async fn list_lines(&self) -> Result<Vec<InventoryLine>> {
        let mut lines: Vec<InventoryLine> = self
            .inventory
            .read()
            .await
            .iter()
            .map(|(product_id, &available_quantity)| InventoryLine {
                product_id: product_id.clone(),
                available_quantity,
            })
            .collect();
        lines.sort_by(|a, b| a.product_id.as_str().cmp(b.product_id.as_str()));
        Ok(lines)
    }

    async fn check_availability(&self, demands: &[StockDemand]) -> Result<Vec<Shortfall>> {
        let inventory = self.inventory.read().await;
        Ok(shortfalls_of(&inventory, demands))
    }

    async fn deduct(&self, demands: &[StockDemand]) -> Result<()> {
        let mut inventory = self.inventory.write().await;

        // Check every line before touching any; the deduction is one unit.
        let shortfalls = shortfalls_of(&inventory, demands);
        if !shortfalls.is_empty() {
            return Err(StoreError::InsufficientStock(shortfalls));
        }

        for demand in demands {
            if let Some(available) = inventory.get_mut(&demand.product_id) {
                *available -= demand.quantity;
            }
        }
        Ok(())
    }

    async fn restore(&self, demands: &[StockDemand]) -> Result<()> {
        let mut inventory = self.inventory.write().await;
        for demand in demands {
            *inventory.entry(demand.product_id.clone()).or_insert(0) += demand.quantity;
        }
        Ok(())
    }
}

fn shortfalls_of(inventory: &HashMap<ProductId, u32>, demands: &[StockDemand]) -> Vec<Shortfall> {
    demands
        .iter()
        .filter_map(|demand| {
            let available = inventory.get(&demand.product_id).copied().unwrap_or(0);
            (available < demand.quantity).then(|| Shortfall {
                product_id: demand.product_id.clone(),
                requested: demand.quantity,
                available,
            })
        })
        .collect()
}

#[async_trait]
impl EvidenceStore for InMemorySupplyStore {
    async fn attach_photo(&self, photo: &EvidencePhoto) -> Result<()> {
        if !self.orders.read().await.contains_key(&photo.order_id) {
            return Err(StoreError::OrderNotFound(photo.order_id));
        }
        self.photos.write().await.push(photo.clone());
        Ok(())
    }

    async fn photos_for_order(&self, order_id: OrderId) -> Result<Vec<EvidencePhoto>> {
        Ok(self
            .photos
            .read()
            .await
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn record_confirmation(&self, record: &ConfirmationRecord) -> Result<()> {
        if !self.orders.read().await.contains_key(&record.order_id) {
            return Err(StoreError::OrderNotFound(record.order_id));
        }
        let mut confirmations = self.confirmations.write().await;
        if confirmations
            .iter()
            .any(|c| c.order_id == record.order_id && c.phase == record.phase)
        {
            return Err(StoreError::ConfirmationExists {
                order_id: record.order_id,
                phase: record.phase,
            });
        }
        confirmations.push(record.clone());
        Ok(())
    }

    async fn confirmations_for_order(&self, order_id: OrderId) -> Result<Vec<ConfirmationRecord>> {
        Ok(self
            .confirmations
            .read()
            .await
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }
}
