//! Time-boxed single-use verification credentials.
//!
//! A credential is a 6-digit numeric code bound to a (phone, purpose) pair.
//! Issuing never invalidates earlier credentials; verification only ever
//! targets the most recently issued one, so older codes are superseded
//! rather than deleted. A credential is claimed at most once and becomes
//! inert at `expires_at`.

use chrono::{DateTime, TimeDelta, Utc};
use common::{CredentialId, PhoneNumber};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The action a credential authorizes.
///
/// Credentials are never valid across purposes: a login code cannot
/// confirm a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPurpose {
    /// Actor login.
    Login,

    /// Customer self-approval of an order.
    OrderApproval,

    /// Delivery confirmation at handover.
    DeliveryConfirmation,
}

impl CredentialPurpose {
    /// Time-to-live for credentials of this purpose.
    ///
    /// Delivery confirmation happens with the courier standing at the
    /// door, so its window is tighter.
    pub fn ttl(&self) -> TimeDelta {
        match self {
            CredentialPurpose::DeliveryConfirmation => TimeDelta::minutes(5),
            CredentialPurpose::Login | CredentialPurpose::OrderApproval => TimeDelta::minutes(10),
        }
    }

    /// Returns the purpose name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialPurpose::Login => "login",
            CredentialPurpose::OrderApproval => "order_approval",
            CredentialPurpose::DeliveryConfirmation => "delivery_confirmation",
        }
    }
}

impl std::fmt::Display for CredentialPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when decoding an unrecognized purpose string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown credential purpose: {0}")]
pub struct UnknownPurpose(pub String);

impl std::str::FromStr for CredentialPurpose {
    type Err = UnknownPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(CredentialPurpose::Login),
            "order_approval" => Ok(CredentialPurpose::OrderApproval),
            "delivery_confirmation" => Ok(CredentialPurpose::DeliveryConfirmation),
            other => Err(UnknownPurpose(other.to_string())),
        }
    }
}

/// A 6-digit numeric verification code.
///
/// Stored as a string so leading zeros survive; `042917` and `42917` are
/// different codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Generates a uniform random code in `000000..=999999`.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Self(format!("{n:06}"))
    }

    /// Rebuilds a code from its stored representation.
    pub fn from_stored(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code digits as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact string comparison against an attempt.
    pub fn matches(&self, attempt: &str) -> bool {
        self.0 == attempt
    }
}

/// A short-lived, single-use credential bound to (phone, purpose).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Unique credential identifier.
    pub id: CredentialId,

    /// Phone the code was sent to, in canonical form.
    pub phone: PhoneNumber,

    /// The 6-digit code.
    pub code: VerificationCode,

    /// What the credential authorizes.
    pub purpose: CredentialPurpose,

    /// Issuance time.
    pub issued_at: DateTime<Utc>,

    /// Expiry; the credential is inert from this instant on.
    pub expires_at: DateTime<Utc>,

    /// Set to true exactly once, by a successful verification.
    pub claimed: bool,
}

impl Credential {
    /// Issues a fresh credential with a newly generated code and the
    /// purpose's TTL.
    pub fn issue(phone: PhoneNumber, purpose: CredentialPurpose, now: DateTime<Utc>) -> Self {
        Self {
            id: CredentialId::new(),
            phone,
            code: VerificationCode::generate(),
            purpose,
            issued_at: now,
            expires_at: now + purpose.ttl(),
            claimed: false,
        }
    }

    /// Returns true once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the credential could still be claimed at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        !self.claimed && !self.is_expired(now)
    }
}
