//! Shared primitive types for the supply coordination workspace.

pub mod phone;
pub mod types;

pub use phone::{PhoneError, PhoneNumber};
pub use types::{CredentialId, CustomerId, OrderId, PhotoId, ProductId, StaffId, VehicleId};
