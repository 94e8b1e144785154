/// TOTP second-factor engine
///
/// Owns the per-user activation state machine:
/// Disabled -> Provisioning -> Enabled -> Disabled. The secret lives
/// encrypted at rest and is only persisted once a code for it has been
/// confirmed; verification itself is stateless per call.
use crate::crypto::{totp, SecretCipher};
use crate::db::user::{User, UserStore};
use crate::error::{GateError, GateResult};
use uuid::Uuid;

pub use crate::crypto::totp::Enrollment;

#[derive(Clone)]
pub struct OtpEngine {
    store: UserStore,
    cipher: SecretCipher,
    /// Issuer name shown in authenticator apps
    issuer: String,
}

impl OtpEngine {
    pub fn new(store: UserStore, cipher: SecretCipher, issuer: String) -> Self {
        Self {
            store,
            cipher,
            issuer,
        }
    }

    /// Whether the second factor is required at login for this user
    pub async fn is_enabled(&self, user_id: Uuid) -> GateResult<bool> {
        Ok(self.store.otp_record(user_id).await?.is_active)
    }

    /// Generate a fresh secret and provisioning URI. Nothing is
    /// persisted until the caller confirms a code for this secret.
    pub fn begin_provisioning(&self, user: &User) -> GateResult<Enrollment> {
        totp::generate_enrollment(&self.issuer, &user.email)
    }

    /// Confirm a provisioning attempt: the submitted code must match
    /// the freshly generated secret within the accepted window.
    ///
    /// On match the secret is encrypted and persisted together with
    /// the activation flag in a single atomic update. On mismatch any
    /// stored secret is cleared and the record deactivated. A failed
    /// confirmation never leaves a previously-active record degraded
    /// but still marked active.
    pub async fn confirm_provisioning(
        &self,
        user: &User,
        secret_base32: &str,
        code: &str,
    ) -> GateResult<()> {
        if totp::verify_code(secret_base32, code, &self.issuer, &user.email)? {
            let encrypted = self.cipher.encrypt(secret_base32)?;
            self.store.activate_otp(user.id, &encrypted).await?;
            tracing::info!(user = %user.username, "OTP enabled");
            Ok(())
        } else {
            self.store.clear_otp(user.id).await?;
            tracing::warn!(user = %user.username, "OTP provisioning failed, record cleared");
            Err(GateError::OtpInvalid)
        }
    }

    /// Verify a login code against the stored, encrypted secret.
    pub async fn verify_login(&self, user: &User, code: &str) -> GateResult<()> {
        let record = self.store.otp_record(user.id).await?;

        if !record.is_active {
            return Err(GateError::OtpNotEnabled);
        }
        let encrypted = record.secret.ok_or_else(|| {
            // is_active without a secret violates the record invariant
            GateError::Internal("active OTP record with empty secret".to_string())
        })?;

        let secret = self.cipher.decrypt(&encrypted)?;

        if totp::verify_code(&secret, code, &self.issuer, &user.email)? {
            Ok(())
        } else {
            Err(GateError::OtpInvalid)
        }
    }

    /// Disable the second factor, clearing the secret. Idempotent.
    pub async fn remove(&self, user_id: Uuid) -> GateResult<()> {
        self.store.clear_otp(user_id).await
    }
}
