//! Order status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a supply order in its lifecycle.
///
/// Normal progress is strictly ordered:
/// ```text
/// Pending ──► Approved ──► Preparing ──► Ready ──► Dispatched ──► Delivered ──► Returned
///    │            │             │          │                         (optional)
///    └────────────┴─────────────┴──────────┴──► Cancelled
/// ```
///
/// There is no skipping: a transition is only valid from the exact
/// predecessor status, and nothing leaves a terminal status except the
/// single `Delivered -> Returned` exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order was created and awaits approval.
    #[default]
    Pending,

    /// Order was approved by staff or by the customer via credential.
    Approved,

    /// Items are being picked and packed.
    Preparing,

    /// Packed and awaiting staff/vehicle dispatch.
    Ready,

    /// Goods left the warehouse; stock has been deducted.
    Dispatched,

    /// Delivery confirmed by credential (terminal unless returned).
    Delivered,

    /// Goods came back after delivery (terminal).
    Returned,

    /// Order was cancelled before dispatch (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be approved in this status.
    pub fn can_approve(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if preparation can start in this status.
    pub fn can_start_preparing(&self) -> bool {
        matches!(self, OrderStatus::Approved)
    }

    /// Returns true if the order can be marked ready in this status.
    pub fn can_mark_ready(&self) -> bool {
        matches!(self, OrderStatus::Preparing)
    }

    /// Returns true if the order can be dispatched in this status.
    pub fn can_dispatch(&self) -> bool {
        matches!(self, OrderStatus::Ready)
    }

    /// Returns true if delivery can be confirmed in this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Dispatched)
    }

    /// Returns true if the order can be marked returned in this status.
    pub fn can_mark_returned(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true if the order can be cancelled in this status.
    ///
    /// Cancellation is only possible before dispatch, so there is never
    /// deducted stock to restore.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::Approved
                | OrderStatus::Preparing
                | OrderStatus::Ready
        )
    }

    /// Returns true if staff/vehicle assignments may still change.
    pub fn can_assign(&self) -> bool {
        self.can_cancel()
    }

    /// Returns true if this is a terminal status.
    ///
    /// `Delivered` counts as terminal even though the single
    /// `Delivered -> Returned` exit remains open.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Returned | OrderStatus::Cancelled
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Dispatched => "dispatched",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when decoding an unrecognized status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "approved" => Ok(OrderStatus::Approved),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "dispatched" => Ok(OrderStatus::Dispatched),
            "delivered" => Ok(OrderStatus::Delivered),
            "returned" => Ok(OrderStatus::Returned),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
