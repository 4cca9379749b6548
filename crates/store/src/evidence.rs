use async_trait::async_trait;
use common::OrderId;
use domain::{ConfirmationRecord, EvidencePhoto};

use crate::Result;

/// Evidence persistence contract: photo references and confirmation
/// records.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Appends a photo reference.
    ///
    /// Fails only with `OrderNotFound`; the core places no upper bound on
    /// photos per order.
    async fn attach_photo(&self, photo: &EvidencePhoto) -> Result<()>;

    /// Lists photo references for an order in upload order.
    async fn photos_for_order(&self, order_id: OrderId) -> Result<Vec<EvidencePhoto>>;

    /// Inserts a confirmation record.
    ///
    /// A phase is confirmed at most once: a second record for the same
    /// (order, phase) fails with `ConfirmationExists` and leaves the
    /// original untouched.
    async fn record_confirmation(&self, record: &ConfirmationRecord) -> Result<()>;

    /// Lists confirmation records for an order.
    async fn confirmations_for_order(&self, order_id: OrderId) -> Result<Vec<ConfirmationRecord>>;
}
