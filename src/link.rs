/// Time-boxed, single-purpose link tokens
///
/// Two layers: an inner HS256-signed claims blob is wrapped with
/// SecretCipher, so the transport string is opaque to the client. A
/// party without the encryption key cannot parse the claims; a party
/// with it still cannot forge the signature. Both secrets must be
/// known to forge a link.
use crate::crypto::SecretCipher;
use crate::error::{GateError, GateResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a link is allowed to do. Resolution checks the purpose so a
/// reset link can never verify an email, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPurpose {
    ResetPassword,
    VerifyEmail,
    /// Step-up ticket proving password-stage success, gating the OTP stage
    OtpStepUp,
}

/// Claims carried inside a link token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkClaims {
    /// Subject: user id (UUID string)
    pub sub: String,
    pub purpose: LinkPurpose,
    pub iat: i64,
    pub exp: i64,
    /// Unique id for single-use consumption
    pub jti: String,
}

impl LinkClaims {
    pub fn user_id(&self) -> GateResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| GateError::LinkInvalid)
    }
}

/// Builds and resolves opaque link tokens
#[derive(Clone)]
pub struct SignedLinkService {
    cipher: SecretCipher,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    leeway_secs: u64,
}

impl SignedLinkService {
    pub fn new(cipher: SecretCipher, jwt_secret: &str, leeway_secs: u64) -> Self {
        Self {
            cipher,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            leeway_secs,
        }
    }

    /// Build an opaque token for `subject`, valid for `ttl_secs`.
    pub fn build(&self, subject: Uuid, purpose: LinkPurpose, ttl_secs: i64) -> GateResult<String> {
        let now = Utc::now().timestamp();
        let claims = LinkClaims {
            sub: subject.to_string(),
            purpose,
            iat: now,
            exp: now + ttl_secs,
            jti: Uuid::new_v4().to_string(),
        };

        let signed = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GateError::Internal(format!("link encode: {}", e)))?;

        self.cipher.encrypt(&signed)
    }

    /// Resolve an opaque token back into claims.
    ///
    /// Fails `LinkInvalid` when the outer decryption or inner
    /// signature fails or the purpose does not match, `LinkExpired`
    /// past the TTL.
    pub fn resolve(&self, token: &str, expected: LinkPurpose) -> GateResult<LinkClaims> {
        let signed = self.cipher.decrypt(token).map_err(|_| GateError::LinkInvalid)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let claims = decode::<LinkClaims>(&signed, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => GateError::LinkExpired,
                _ => GateError::LinkInvalid,
            })?;

        if claims.purpose != expected {
            return Err(GateError::LinkInvalid);
        }

        Ok(claims)
    }
}
