use async_trait::async_trait;
use common::ProductId;
use domain::{OrderItem, Shortfall};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Available stock for one product.
///
/// Mutated only through [`InventoryLedger`]; the lifecycle engine never
/// writes these rows directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLine {
    /// The product.
    pub product_id: ProductId,

    /// Units currently available for dispatch.
    pub available_quantity: u32,
}

/// One product demand extracted from an order's line items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDemand {
    /// The product to deduct.
    pub product_id: ProductId,

    /// Units to deduct.
    pub quantity: u32,
}

impl StockDemand {
    /// Builds the demand list for an order's items from their requested
    /// quantities.
    pub fn from_items(items: &[OrderItem]) -> Vec<Self> {
        items
            .iter()
            .map(|item| Self {
                product_id: item.product_id.clone(),
                quantity: item.quantity_requested,
            })
            .collect()
    }
}

/// Inventory persistence contract.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Creates or replaces the stock level for a product.
    async fn upsert_line(&self, line: &InventoryLine) -> Result<()>;

    /// Returns the stock level for a product, if tracked.
    async fn get_line(&self, product_id: &ProductId) -> Result<Option<InventoryLine>>;

    /// Lists all tracked stock levels, ordered by product ID.
    async fn list_lines(&self) -> Result<Vec<InventoryLine>>;

    /// Read-only availability check; returns one [`Shortfall`] per demand
    /// that cannot be satisfied (untracked products count as zero stock).
    /// Empty means every line is satisfiable.
    async fn check_availability(&self, demands: &[StockDemand]) -> Result<Vec<Shortfall>>;

    /// Atomically decrements stock for every demand.
    ///
    /// The whole deduction is one unit: a shortfall on any line aborts
    /// everything, returns `InsufficientStock` with the complete shortfall
    /// list, and leaves no line changed.
    async fn deduct(&self, demands: &[StockDemand]) -> Result<()>;

    /// Adds stock back for every demand; the compensating inverse of
    /// [`deduct`](InventoryLedger::deduct).
    async fn restore(&self, demands: &[StockDemand]) -> Result<()>;
}
