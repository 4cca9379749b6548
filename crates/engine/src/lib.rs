//! Orchestration layer: the order lifecycle engine and the credential
//! service.
//!
//! The engine owns every status transition: it validates preconditions
//! through the domain aggregate, requires a claimed credential for the
//! gated transitions, commits through the store's conditional updates and
//! records the evidence trail. The credential service owns issuing policy:
//! code generation, per-purpose TTLs, the resend cooldown and best-effort
//! delivery through the notification gateway.

pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod notification;

pub use credentials::{CredentialService, IssuedCode, RESEND_COOLDOWN_SECS};
pub use error::{EngineError, Result};
pub use lifecycle::{
    ApproveOrder, CancelOrder, DeliverOrder, NewOrder, OrderLifecycleEngine, ReturnOrder,
};
pub use notification::{
    InMemoryNotificationGateway, LoggingNotificationGateway, NotificationError,
    NotificationGateway, SentMessage,
};
