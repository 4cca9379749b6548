use common::OrderId;
use domain::{ConfirmationPhase, OrderNumber, OrderStatus, Shortfall};
use thiserror::Error;

/// Errors that can occur when interacting with the supply store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order's stored status no longer matches the status the caller
    /// loaded it with; a concurrent transition won the compare-and-swap.
    #[error("stale status for order {order_id}: expected {expected}, found {actual}")]
    StaleStatus {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The order was not found in the store.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Another order already carries this order number.
    #[error("order number already in use: {0}")]
    DuplicateOrderNumber(OrderNumber),

    /// A confirmation record already exists for this (order, phase).
    #[error("confirmation already recorded for order {order_id} in phase {phase}")]
    ConfirmationExists {
        order_id: OrderId,
        phase: ConfirmationPhase,
    },

    /// One or more inventory lines cannot satisfy the demanded quantity;
    /// nothing was deducted.
    #[error("insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<Shortfall>),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded into its domain type.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
