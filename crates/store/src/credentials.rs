use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CredentialId, PhoneNumber};
use domain::{Credential, CredentialPurpose};

use crate::Result;

/// Credential persistence contract.
///
/// Issuing policy (code generation, TTLs, resend cooldowns) lives in the
/// calling service; the store only persists credentials and performs the
/// atomic claim.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persists a newly issued credential.
    ///
    /// Prior credentials for the same (phone, purpose) are left in place;
    /// they are superseded by virtue of no longer being the latest.
    async fn insert_credential(&self, credential: &Credential) -> Result<()>;

    /// Returns the most recently issued credential for (phone, purpose),
    /// claimed or not, expired or not.
    ///
    /// Used by callers enforcing resend cooldowns.
    async fn latest_credential(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
    ) -> Result<Option<Credential>>;

    /// Atomically claims the latest credential for (phone, purpose) iff it
    /// is unclaimed, unexpired at `now`, and its code matches `code`
    /// exactly.
    ///
    /// The check and the `claimed` flip are one conditional update, so two
    /// near-simultaneous attempts with the same correct code cannot both
    /// succeed. Returns `Ok(None)` for every non-matching condition
    /// (wrong code, expired, already claimed, superseded, none issued)
    /// without revealing which; distinguishing them would allow
    /// enumeration.
    async fn claim_latest(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CredentialId>>;
}
