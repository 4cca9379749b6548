//! Domain model for event-supply delivery coordination.
//!
//! The two halves of the core live here: the order lifecycle state machine
//! (aggregate, status enum, transition validation) and the time-boxed
//! credential protocol (credential entity, purposes, verification codes),
//! together with the evidence records that prove gated transitions were
//! authorized.

pub mod credential;
pub mod evidence;
pub mod order;

pub use credential::{Credential, CredentialPurpose, UnknownPurpose, VerificationCode};
pub use evidence::{ConfirmationPhase, ConfirmationRecord, EvidencePhase, EvidencePhoto, UnknownPhase};
pub use order::{
    Order, OrderError, OrderItem, OrderNumber, OrderStatus, ReturnReport, ReturnedLine, Shortfall,
    StatusTimestamps, UnknownStatus, UnmetPrecondition,
};
