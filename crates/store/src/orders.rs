use async_trait::async_trait;
use common::OrderId;
use domain::{Order, OrderNumber, OrderStatus};

use crate::{Result, StockDemand};

/// Order persistence contract.
///
/// All implementations must be thread-safe (`Send + Sync`); many
/// uncoordinated callers hit the same rows concurrently.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a freshly created order.
    ///
    /// Fails with `DuplicateOrderNumber` if the human-readable number is
    /// already taken; uniqueness is the invariant idempotent lookups
    /// rely on.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Retrieves an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves an order by its unique human-readable number.
    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;

    /// Lists all orders, most recently created first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Commits a mutated order iff its stored status still equals
    /// `expected`, the compare-and-swap behind every transition.
    ///
    /// The whole row (status, items, assignments, timestamps, notes) is
    /// written as one conditional update. A loser of a concurrent race
    /// receives `StaleStatus` carrying the status actually found and
    /// should re-read the order.
    async fn update_if_status(&self, expected: OrderStatus, order: &Order) -> Result<()>;

    /// Commits a dispatch: the status compare-and-swap and the inventory
    /// deduction in one transactional boundary.
    ///
    /// Exactly one of three things happens, atomically:
    /// - the stored status still equals `expected`, every demanded line
    ///   has enough stock, the order row is written and all lines are
    ///   decremented;
    /// - a concurrent transition already moved the order: `StaleStatus`,
    ///   nothing deducted;
    /// - some line is short: `InsufficientStock` with the complete
    ///   shortfall list, the order untouched, nothing deducted.
    ///
    /// Concurrent dispatches of the same order therefore produce exactly
    /// one deduction; the loser sees `StaleStatus`.
    async fn commit_dispatch(
        &self,
        expected: OrderStatus,
        order: &Order,
        demands: &[StockDemand],
    ) -> Result<()>;
}
