//! Evidence captured along the order lifecycle: confirmation records for
//! gated transitions and photo attachments per phase.

use chrono::{DateTime, Utc};
use common::{CredentialId, OrderId, PhotoId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::CredentialPurpose;

/// The gated transition a confirmation record proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPhase {
    /// Customer self-approval of the order.
    Approval,

    /// Delivery handover.
    Delivery,
}

impl ConfirmationPhase {
    /// The credential purpose that gates this phase.
    pub fn purpose(&self) -> CredentialPurpose {
        match self {
            ConfirmationPhase::Approval => CredentialPurpose::OrderApproval,
            ConfirmationPhase::Delivery => CredentialPurpose::DeliveryConfirmation,
        }
    }

    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationPhase::Approval => "approval",
            ConfirmationPhase::Delivery => "delivery",
        }
    }
}

impl std::fmt::Display for ConfirmationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when decoding an unrecognized phase string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl std::str::FromStr for ConfirmationPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approval" => Ok(ConfirmationPhase::Approval),
            "delivery" => Ok(ConfirmationPhase::Delivery),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Audit record proving a claimed credential authorized a gated transition.
///
/// Created exactly once per (order, phase) and immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    /// The order the confirmation belongs to.
    pub order_id: OrderId,

    /// Which gated transition was confirmed.
    pub phase: ConfirmationPhase,

    /// Opaque reference to the actor who confirmed.
    pub confirmed_by: String,

    /// Name of the person who approved or received the goods.
    pub recipient_name: String,

    /// The credential that was claimed for this confirmation.
    pub credential_id: CredentialId,

    /// When the confirmation was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl ConfirmationRecord {
    /// Creates a confirmation record.
    pub fn new(
        order_id: OrderId,
        phase: ConfirmationPhase,
        confirmed_by: impl Into<String>,
        recipient_name: impl Into<String>,
        credential_id: CredentialId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            phase,
            confirmed_by: confirmed_by.into(),
            recipient_name: recipient_name.into(),
            credential_id,
            recorded_at: now,
        }
    }
}

/// The lifecycle moment a photo documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidencePhase {
    /// Goods being loaded onto the vehicle.
    Loading,

    /// Goods handed over at the venue.
    Delivery,

    /// Goods coming back after the event.
    Return,
}

impl EvidencePhase {
    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidencePhase::Loading => "loading",
            EvidencePhase::Delivery => "delivery",
            EvidencePhase::Return => "return",
        }
    }
}

impl std::fmt::Display for EvidencePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EvidencePhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loading" => Ok(EvidencePhase::Loading),
            "delivery" => Ok(EvidencePhase::Delivery),
            "return" => Ok(EvidencePhase::Return),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Reference to a photo stored in an external blob store.
///
/// Append-only; the core never bounds how many photos an order carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePhoto {
    /// Unique photo identifier.
    pub id: PhotoId,

    /// The order the photo documents.
    pub order_id: OrderId,

    /// Which lifecycle moment the photo captures.
    pub phase: EvidencePhase,

    /// Opaque reference into the external blob store.
    pub blob_ref: String,

    /// Opaque reference to the uploading actor.
    pub uploaded_by: String,

    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
}

impl EvidencePhoto {
    /// Creates a photo reference.
    pub fn new(
        order_id: OrderId,
        phase: EvidencePhase,
        blob_ref: impl Into<String>,
        uploaded_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PhotoId::new(),
            order_id,
            phase,
            blob_ref: blob_ref.into(),
            uploaded_by: uploaded_by.into(),
            uploaded_at: now,
        }
    }
}
