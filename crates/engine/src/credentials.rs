//! Credential service: issuing policy over the credential store.

use chrono::{DateTime, TimeDelta, Utc};
use common::{CredentialId, PhoneNumber};
use domain::{Credential, CredentialPurpose};
use store::CredentialStore;

use crate::error::{EngineError, Result};
use crate::notification::NotificationGateway;

/// Cooldown enforced between resends of order-related codes.
///
/// The store imposes none; the policy lives here, in its caller, because
/// not every flow wants one (login issuance is uncooled).
pub const RESEND_COOLDOWN_SECS: i64 = 60;

/// Outcome of issuing a code.
///
/// Carries metadata only; the code itself travels exclusively over the
/// notification channel.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    /// The stored credential's identifier.
    pub credential_id: CredentialId,

    /// When the code becomes inert.
    pub expires_at: DateTime<Utc>,

    /// False when the gateway failed; the credential still exists and can
    /// be resent, so this is a warning, not an error.
    pub delivered: bool,
}

/// Issues, resends and verifies time-boxed single-use credentials.
pub struct CredentialService<S, N> {
    store: S,
    gateway: N,
}

impl<S, N> CredentialService<S, N>
where
    S: CredentialStore,
    N: NotificationGateway,
{
    /// Creates a new credential service.
    pub fn new(store: S, gateway: N) -> Self {
        Self { store, gateway }
    }

    /// Issues a fresh credential and dispatches its code over the gateway.
    ///
    /// Prior unclaimed credentials for the same (phone, purpose) stay in
    /// place; they are superseded because verification only ever targets
    /// the latest. A persistence error is fatal to the caller's
    /// transition; a gateway error is not.
    #[tracing::instrument(skip(self))]
    pub async fn issue(&self, phone: &PhoneNumber, purpose: CredentialPurpose) -> Result<IssuedCode> {
        let credential = Credential::issue(phone.clone(), purpose, Utc::now());
        self.store.insert_credential(&credential).await?;
        metrics::counter!("credentials_issued_total", "purpose" => purpose.as_str()).increment(1);

        let delivered = self.dispatch_code(&credential).await;
        Ok(IssuedCode {
            credential_id: credential.id,
            expires_at: credential.expires_at,
            delivered,
        })
    }

    /// Issues a fresh credential unless one went out within the last
    /// [`RESEND_COOLDOWN_SECS`] seconds.
    #[tracing::instrument(skip(self))]
    pub async fn resend(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
    ) -> Result<IssuedCode> {
        if let Some(latest) = self.store.latest_credential(phone, purpose).await? {
            let elapsed = Utc::now() - latest.issued_at;
            if elapsed < TimeDelta::seconds(RESEND_COOLDOWN_SECS) {
                return Err(EngineError::ResendThrottled {
                    retry_after_secs: RESEND_COOLDOWN_SECS - elapsed.num_seconds(),
                });
            }
        }
        self.issue(phone, purpose).await
    }

    /// Verifies a code by atomically claiming the latest credential for
    /// (phone, purpose).
    ///
    /// Succeeds at most once per issued credential. Every failure mode
    /// collapses into the uniform [`EngineError::CredentialRejected`].
    #[tracing::instrument(skip(self, code))]
    pub async fn verify(
        &self,
        phone: &PhoneNumber,
        purpose: CredentialPurpose,
        code: &str,
    ) -> Result<CredentialId> {
        match self
            .store
            .claim_latest(phone, purpose, code, Utc::now())
            .await?
        {
            Some(credential_id) => {
                metrics::counter!("credentials_claimed_total", "purpose" => purpose.as_str())
                    .increment(1);
                Ok(credential_id)
            }
            None => {
                metrics::counter!("credentials_rejected_total", "purpose" => purpose.as_str())
                    .increment(1);
                Err(EngineError::CredentialRejected)
            }
        }
    }

    /// Hands the code to the gateway; failure downgrades to a warning.
    async fn dispatch_code(&self, credential: &Credential) -> bool {
        let minutes = credential.purpose.ttl().num_minutes();
        let message = match credential.purpose {
            CredentialPurpose::Login => format!(
                "Your login code is {}. It expires in {minutes} minutes.",
                credential.code.as_str()
            ),
            CredentialPurpose::OrderApproval => format!(
                "Your order approval code is {}. It expires in {minutes} minutes.",
                credential.code.as_str()
            ),
            CredentialPurpose::DeliveryConfirmation => format!(
                "Your delivery confirmation code is {}. Share it with the courier only at handover. It expires in {minutes} minutes.",
                credential.code.as_str()
            ),
        };

        match self.gateway.send(&credential.phone, &message).await {
            Ok(()) => true,
            Err(e) => {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(
                    phone = %credential.phone,
                    purpose = %credential.purpose,
                    error = %e,
                    "credential issued but text delivery failed"
                );
                false
            }
        }
    }
}
