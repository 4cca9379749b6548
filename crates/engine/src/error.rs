//! Engine error types.

use common::OrderId;
use domain::{ConfirmationPhase, OrderError, OrderNumber, UnmetPrecondition};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
///
/// `Order` and `CredentialRejected` are expected, recoverable-by-retry
/// conditions callers branch on; `Persistence` is fatal and surfaced
/// unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transition or precondition validation failed.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Uniform credential failure.
    ///
    /// Wrong code, expired, already claimed, superseded and never-issued
    /// all collapse here; distinguishing them would allow enumeration.
    #[error("credential rejected")]
    CredentialRejected,

    /// A confirmation record already exists for this (order, phase).
    #[error("confirmation already recorded for order {order_id} in phase {phase}")]
    ConfirmationAlreadyRecorded {
        order_id: OrderId,
        phase: ConfirmationPhase,
    },

    /// The order was not found.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Another order already carries this order number.
    #[error("order number already in use: {0}")]
    DuplicateOrderNumber(OrderNumber),

    /// A code was requested again before the resend cooldown elapsed.
    #[error("a code was sent recently, retry in {retry_after_secs}s")]
    ResendThrottled { retry_after_secs: i64 },

    /// Fatal storage failure, surfaced unchanged and never retried here.
    #[error("persistence failure: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OrderNotFound(id) => EngineError::OrderNotFound(id),
            StoreError::DuplicateOrderNumber(number) => EngineError::DuplicateOrderNumber(number),
            StoreError::ConfirmationExists { order_id, phase } => {
                EngineError::ConfirmationAlreadyRecorded { order_id, phase }
            }
            StoreError::InsufficientStock(shortfalls) => EngineError::Order(
                OrderError::PreconditionUnmet(UnmetPrecondition::InsufficientStock(shortfalls)),
            ),
            other => EngineError::Persistence(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
