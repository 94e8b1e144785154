/// Account manager: login, OTP step-up, refresh, and password flows
///
/// Composes the credential check, token service, OTP engine, and
/// signed-link service. Store-layer and crypto errors are mapped to
/// the user-facing taxonomy at this boundary; anything unmapped
/// surfaces as a generic internal failure.
use crate::{
    account::SignupRequest,
    config::ServerConfig,
    db::user::{NewUser, User, UserStore},
    error::{GateError, GateResult},
    link::{LinkPurpose, SignedLinkService},
    otp::OtpEngine,
    rate_limit::AttemptLimiter,
    token::{TokenPair, TokenService},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::Arc;
use validator::ValidateEmail;

/// Result of the password stage of a login
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials accepted, no second factor configured
    Tokens(TokenPair),
    /// OTP required: an opaque step-up ticket instead of real tokens
    StepUp { secret: String },
}

/// Result of a refresh: always a fresh access token, plus a rotated
/// refresh token when rotation is enabled
#[derive(Debug)]
pub struct RefreshOutcome {
    pub access: String,
    pub refresh: Option<String>,
}

/// Result of a signup
#[derive(Debug)]
pub struct SignupOutcome {
    pub user: User,
    /// Tokens when email verification is not required
    pub tokens: Option<TokenPair>,
    /// Verification link token to mail when it is
    pub verification_token: Option<String>,
}

pub struct AccountManager {
    store: UserStore,
    tokens: TokenService,
    links: SignedLinkService,
    otp: OtpEngine,
    limiter: AttemptLimiter,
    config: Arc<ServerConfig>,
    /// Verified against on unknown-identifier lookups so the miss path
    /// costs the same as a real password check
    dummy_hash: String,
}

impl AccountManager {
    pub fn new(
        store: UserStore,
        tokens: TokenService,
        links: SignedLinkService,
        otp: OtpEngine,
        limiter: AttemptLimiter,
        config: Arc<ServerConfig>,
    ) -> GateResult<Self> {
        let dummy_hash = hash_password("gatehouse-timing-pad")?;
        Ok(Self {
            store,
            tokens,
            links,
            otp,
            limiter,
            config,
            dummy_hash,
        })
    }

    // ---- credential verification ----

    /// Look up an identity by username, email, or phone and verify the
    /// password. Unknown identifier and wrong password are
    /// indistinguishable to the caller. Does not check `is_active`.
    pub async fn verify_credentials(&self, identifier: &str, password: &str) -> GateResult<User> {
        match self.store.find_by_identifier(identifier).await? {
            Some(user) => {
                if verify_password(password, &user.password_hash)? {
                    Ok(user)
                } else {
                    Err(GateError::CredentialRejected)
                }
            }
            None => {
                // Burn a hash verification anyway
                let _ = verify_password(password, &self.dummy_hash);
                Err(GateError::CredentialRejected)
            }
        }
    }

    /// Check a password against a specific, already-authenticated user
    pub fn check_password(&self, user: &User, password: &str) -> GateResult<bool> {
        verify_password(password, &user.password_hash)
    }

    // ---- signup ----

    pub async fn signup(&self, req: SignupRequest) -> GateResult<SignupOutcome> {
        if req.username.trim().is_empty() {
            return Err(GateError::Validation("Username should not be empty".to_string()));
        }
        if !req.email.validate_email() {
            return Err(GateError::Validation("Invalid email address".to_string()));
        }
        if let Some(domain) = req.email.rsplit('@').next() {
            if self
                .config
                .auth
                .blocked_email_domains
                .iter()
                .any(|blocked| blocked.eq_ignore_ascii_case(domain))
            {
                return Err(GateError::Validation(
                    "Email domain not allowed".to_string(),
                ));
            }
        }
        if req.password != req.retype_password {
            return Err(GateError::Validation("Passwords doesn't match".to_string()));
        }
        self.validate_password_policy(&req.password)?;

        let password_hash = hash_password(&req.password)?;
        let user = self
            .store
            .create_user(NewUser {
                username: req.username,
                email: req.email,
                phone: req.phone,
                password_hash,
            })
            .await?;

        tracing::info!(user = %user.username, "account created");

        if self.config.features.email_verification_required {
            let token = self.links.build(
                user.id,
                LinkPurpose::VerifyEmail,
                self.config.auth.link_ttl_secs,
            )?;
            Ok(SignupOutcome {
                user,
                tokens: None,
                verification_token: Some(token),
            })
        } else {
            let tokens = self.tokens.issue(&user)?;
            self.store.touch_last_login(user.id).await?;
            Ok(SignupOutcome {
                user,
                tokens: Some(tokens),
                verification_token: None,
            })
        }
    }

    // ---- login / OTP step-up / refresh ----

    /// Password stage of a login. Produces either a token pair or,
    /// when the second factor is enabled, a step-up ticket.
    pub async fn login(&self, identifier: &str, password: &str) -> GateResult<LoginOutcome> {
        self.limiter.check(identifier)?;

        let user = self.verify_credentials(identifier, password).await?;

        if !user.is_active {
            return Err(GateError::AccountDisabled);
        }
        if self.config.features.email_verification_required && !user.is_email_verified {
            return Err(GateError::EmailUnverified);
        }

        if self.otp.is_enabled(user.id).await? {
            let secret = self.links.build(
                user.id,
                LinkPurpose::OtpStepUp,
                self.config.auth.step_up_ttl_secs,
            )?;
            tracing::debug!(user = %user.username, "login pending OTP step-up");
            return Ok(LoginOutcome::StepUp { secret });
        }

        self.store.touch_last_login(user.id).await?;
        Ok(LoginOutcome::Tokens(self.tokens.issue(&user)?))
    }

    /// Second stage of a login: a step-up ticket plus a TOTP code.
    /// The ticket is consumed on success; failures leave it valid but
    /// count against the identifier's attempt quota.
    pub async fn otp_login(&self, ticket: &str, code: &str) -> GateResult<TokenPair> {
        let claims = self.links.resolve(ticket, LinkPurpose::OtpStepUp)?;
        let user = self.store.get(claims.user_id()?).await?;

        self.limiter.check(&user.username)?;

        if !user.is_active {
            return Err(GateError::AccountDisabled);
        }

        self.otp.verify_login(&user, code).await?;

        // Single-use: the first successful submission wins
        if !self.store.consume_token(&claims.jti).await? {
            return Err(GateError::LinkInvalid);
        }

        self.store.touch_last_login(user.id).await?;
        self.tokens.issue(&user)
    }

    /// Exchange a refresh token for a fresh access token. With
    /// rotation enabled the refresh token is single-use: a second
    /// presentation of the same token fails with `TokenReused`.
    pub async fn refresh(&self, refresh_token: &str) -> GateResult<RefreshOutcome> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let user = self.store.get(claims.user_id()?).await.map_err(|e| match e {
            GateError::NotFound(_) => GateError::TokenInvalid("unknown subject".to_string()),
            other => other,
        })?;

        if !user.is_active {
            return Err(GateError::AccountDisabled);
        }

        if self.config.features.refresh_rotation_enabled {
            if !self.store.consume_token(&claims.jti).await? {
                tracing::warn!(user = %user.username, "refresh token replay detected");
                return Err(GateError::TokenReused);
            }
            let pair = self.tokens.issue(&user)?;
            Ok(RefreshOutcome {
                access: pair.access,
                refresh: Some(pair.refresh),
            })
        } else {
            Ok(RefreshOutcome {
                access: self.tokens.issue_access(&user)?,
                refresh: None,
            })
        }
    }

    /// Verify signature and expiry of a bearer token of either kind
    pub fn verify_token(&self, token: &str) -> GateResult<()> {
        self.tokens.verify(token).map(|_| ())
    }

    /// Revoke a refresh token at logout by consuming its `jti`, so a
    /// later presentation fails with `TokenReused`. Takes effect when
    /// rotation is enabled; without rotation the refresh path does not
    /// consult the consumed set and the token ages out naturally.
    pub async fn revoke_refresh(&self, refresh_token: &str) -> GateResult<()> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        self.store.consume_token(&claims.jti).await?;
        tracing::info!(user = %claims.username, "refresh token revoked");
        Ok(())
    }

    // ---- password change / reset ----

    pub fn validate_password_policy(&self, password: &str) -> GateResult<()> {
        let min = self.config.auth.min_password_length;
        if password.len() < min {
            return Err(GateError::PasswordPolicyViolation(format!(
                "Password must be at least {} characters",
                min
            )));
        }
        if password.chars().all(|c| c.is_ascii_digit()) {
            return Err(GateError::PasswordPolicyViolation(
                "Password cannot be entirely numeric".to_string(),
            ));
        }
        Ok(())
    }

    /// Change the password of an authenticated user after re-checking
    /// the current one.
    pub async fn change_password(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
        retype_password: &str,
    ) -> GateResult<()> {
        if !self.check_password(user, old_password)? {
            return Err(GateError::Validation(
                "You have entered wrong password".to_string(),
            ));
        }
        if new_password != retype_password {
            return Err(GateError::Validation(
                "The two password fields didn't match".to_string(),
            ));
        }
        self.validate_password_policy(new_password)?;

        let hash = hash_password(new_password)?;
        self.store.update_password(user.id, &hash).await?;
        tracing::info!(user = %user.username, "password changed");
        Ok(())
    }

    /// Build a reset link token for an identifier. The identifier must
    /// resolve; throttled per identifier.
    pub async fn request_password_reset(&self, identifier: &str) -> GateResult<(User, String)> {
        self.limiter.check(identifier)?;

        let user = self
            .store
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| GateError::Validation("Wrong Username/Email/Phone Number".to_string()))?;

        let token = self.links.build(
            user.id,
            LinkPurpose::ResetPassword,
            self.config.auth.link_ttl_secs,
        )?;
        Ok((user, token))
    }

    /// Check that a reset link token is still valid, without consuming it
    pub fn check_reset_token(&self, token: &str) -> GateResult<()> {
        self.links
            .resolve(token, LinkPurpose::ResetPassword)
            .map(|_| ())
    }

    /// Resolve a reset link and set the new password. The link is
    /// consumed on success and cannot be replayed.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        password: &str,
        retype_password: &str,
    ) -> GateResult<()> {
        let claims = self.links.resolve(token, LinkPurpose::ResetPassword)?;

        if password != retype_password {
            return Err(GateError::Validation("Passwords doesn't match".to_string()));
        }
        self.validate_password_policy(password)?;

        let user = self.store.get(claims.user_id()?).await?;

        if !self.store.consume_token(&claims.jti).await? {
            return Err(GateError::LinkInvalid);
        }

        let hash = hash_password(password)?;
        self.store.update_password(user.id, &hash).await?;
        tracing::info!(user = %user.username, "password reset completed");
        Ok(())
    }

    // ---- email verification ----

    /// Build a verification link for a user who has not verified yet
    pub async fn request_email_verification(&self, email: &str) -> GateResult<(User, String)> {
        self.limiter.check(email)?;

        let user = self
            .store
            .find_by_identifier(email)
            .await?
            .ok_or_else(|| GateError::NotFound("No account with that email".to_string()))?;

        if user.is_email_verified {
            return Err(GateError::Validation("Email already verified".to_string()));
        }

        let token = self.links.build(
            user.id,
            LinkPurpose::VerifyEmail,
            self.config.auth.link_ttl_secs,
        )?;
        Ok((user, token))
    }

    /// Resolve a verification link and flip the flag. Returns whether
    /// the email was already verified; repeat resolutions are
    /// harmless.
    pub async fn verify_email(&self, token: &str) -> GateResult<bool> {
        let claims = self.links.resolve(token, LinkPurpose::VerifyEmail)?;
        let user = self.store.get(claims.user_id()?).await?;

        if user.is_email_verified {
            return Ok(true);
        }

        self.store.set_email_verified(user.id).await?;
        tracing::info!(user = %user.username, "email verified");
        Ok(false)
    }

    // ---- accessors for the API layer ----

    pub fn otp_engine(&self) -> &OtpEngine {
        &self.otp
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    pub fn token_service(&self) -> &TokenService {
        &self.tokens
    }
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> GateResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GateError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against an Argon2id PHC-format hash
fn verify_password(password: &str, hash: &str) -> GateResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| GateError::Internal(format!("Invalid stored hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(GateError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_password("P@ssw0rd1").unwrap();
        assert!(verify_password("P@ssw0rd1", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_internal_error() {
        assert!(matches!(
            verify_password("pw", "not-a-hash"),
            Err(GateError::Internal(_))
        ));
    }
}
