//! Order aggregate and related types.

mod aggregate;
mod status;
mod value_objects;

pub use aggregate::{Order, StatusTimestamps};
pub use status::{OrderStatus, UnknownStatus};
pub use value_objects::{OrderItem, OrderNumber, ReturnReport, ReturnedLine, Shortfall};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order's current status is not the required "from" state for the
    /// requested transition.
    #[error("invalid transition: order is {current}, cannot move to {requested}")]
    InvalidTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// A transition precondition was not satisfied.
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(UnmetPrecondition),

    /// Order has no items.
    #[error("order has no items")]
    NoItems,

    /// An item quantity is invalid.
    #[error("invalid quantity {quantity} for {product_id} (must be greater than 0)")]
    InvalidQuantity {
        product_id: common::ProductId,
        quantity: u32,
    },

    /// The same product appears twice in the item list.
    #[error("duplicate item: {product_id}")]
    DuplicateItem { product_id: common::ProductId },

    /// A returned line references a product the order never dispatched.
    #[error("returned item {product_id} was not part of the dispatch")]
    UnknownReturnItem { product_id: common::ProductId },

    /// A returned quantity exceeds what was dispatched.
    #[error(
        "return quantity {returned} for {product_id} exceeds dispatched quantity {dispatched}"
    )]
    ReturnExceedsDispatched {
        product_id: common::ProductId,
        returned: u32,
        dispatched: u32,
    },

    /// Staff or vehicle assignments cannot change once the order left the
    /// warehouse.
    #[error("assignments are locked once the order is {current}")]
    AssignmentLocked { current: OrderStatus },
}

/// The specific precondition that blocked a transition.
///
/// Carried inside [`OrderError::PreconditionUnmet`] so callers can branch
/// on (and display) exactly what is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmetPrecondition {
    /// Dispatch requires both a staff and a vehicle assignment.
    MissingAssignments { staff: bool, vehicle: bool },

    /// Delivery confirmation requires the recipient's name.
    MissingRecipientName,

    /// One or more line items cannot be satisfied from available stock.
    InsufficientStock(Vec<Shortfall>),
}

impl std::fmt::Display for UnmetPrecondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnmetPrecondition::MissingAssignments { staff, vehicle } => {
                let missing: Vec<&str> = [(*staff, "staff"), (*vehicle, "vehicle")]
                    .iter()
                    .filter(|(m, _)| *m)
                    .map(|(_, name)| *name)
                    .collect();
                write!(f, "missing assignment: {}", missing.join(", "))
            }
            UnmetPrecondition::MissingRecipientName => write!(f, "recipient name missing"),
            UnmetPrecondition::InsufficientStock(shortfalls) => {
                write!(f, "insufficient stock for ")?;
                for (i, s) in shortfalls.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} (short {})", s.product_id, s.deficit())?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    #[test]
    fn unmet_precondition_display_missing_assignments() {
        let p = UnmetPrecondition::MissingAssignments {
            staff: true,
            vehicle: true,
        };
        assert_eq!(p.to_string(), "missing assignment: staff, vehicle");

        let p = UnmetPrecondition::MissingAssignments {
            staff: false,
            vehicle: true,
        };
        assert_eq!(p.to_string(), "missing assignment: vehicle");
    }

    #[test]
    fn unmet_precondition_display_shortfalls() {
        let p = UnmetPrecondition::InsufficientStock(vec![
            Shortfall {
                product_id: ProductId::new("CHAIR"),
                requested: 5,
                available: 3,
            },
            Shortfall {
                product_id: ProductId::new("TABLE"),
                requested: 2,
                available: 0,
            },
        ]);
        assert_eq!(
            p.to_string(),
            "insufficient stock for CHAIR (short 2), TABLE (short 2)"
        );
    }
}
