//! Value objects for the order domain.

use chrono::NaiveDate;
use common::ProductId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Human-readable unique order number.
///
/// The exact format is a policy of the surrounding system; the core only
/// relies on uniqueness, which the store enforces with a unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Creates an order number from a caller-supplied string.
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Generates a number of the form `SO-YYYYMMDD-XXXX` for the given
    /// event date, with a random 4-digit suffix.
    pub fn generate(event_date: NaiveDate) -> Self {
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        Self(format!("SO-{}-{suffix:04}", event_date.format("%Y%m%d")))
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A line item on a supply order.
///
/// `quantity_dispatched` and `quantity_returned` start at zero and are set
/// by the dispatch and return transitions; the aggregate maintains
/// `quantity_returned <= quantity_dispatched <= quantity_requested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Human-readable product name.
    pub product_name: String,

    /// Quantity the customer asked for.
    pub quantity_requested: u32,

    /// Quantity that left the warehouse at dispatch.
    pub quantity_dispatched: u32,

    /// Quantity that came back after delivery.
    pub quantity_returned: u32,
}

impl OrderItem {
    /// Creates a new, not-yet-dispatched order item.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity_requested: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity_requested,
            quantity_dispatched: 0,
            quantity_returned: 0,
        }
    }
}

/// Per-product deficit between requested and available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    /// The product that cannot be satisfied.
    pub product_id: ProductId,

    /// Quantity the order requires.
    pub requested: u32,

    /// Quantity currently available.
    pub available: u32,
}

impl Shortfall {
    /// Returns how many units are missing.
    pub fn deficit(&self) -> u32 {
        self.requested.saturating_sub(self.available)
    }
}

/// One line of a return: how many units of a product came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedLine {
    /// The product being returned.
    pub product_id: ProductId,

    /// Units coming back; at most the dispatched quantity.
    pub quantity: u32,
}

/// Free-form notes captured when goods come back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReport {
    /// Notes about damaged items, if any.
    pub damaged_items: Option<String>,

    /// Notes about missing items, if any.
    pub missing_items: Option<String>,
}
