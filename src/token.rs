/// Bearer token issuance and verification
///
/// Access and refresh tokens are self-contained HS256 JWTs: claims are
/// legible and integrity-protected, never encrypted. Replay detection
/// for rotated refresh tokens lives in the orchestrator, keyed by the
/// `jti` claim.
use crate::config::AuthConfig;
use crate::db::user::User;
use crate::error::{GateError, GateResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator of the two token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims embedded in every bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user id (UUID string)
    pub sub: String,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    pub token_type: TokenType,
    /// Issued-at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Unique token id, used for refresh replay detection
    pub jti: String,
}

impl TokenClaims {
    pub fn user_id(&self) -> GateResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| GateError::TokenInvalid("malformed subject".to_string()))
    }
}

/// Access + refresh pair minted on successful authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and validates bearer tokens. Stateless per call.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    leeway_secs: u64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            leeway_secs: config.leeway_secs,
        }
    }

    fn claims_for(&self, user: &User, token_type: TokenType) -> TokenClaims {
        let now = Utc::now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl_secs,
            TokenType::Refresh => self.refresh_ttl_secs,
        };
        TokenClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            is_staff: user.is_staff,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            token_type,
            iat: now,
            exp: now + ttl,
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn sign(&self, claims: &TokenClaims) -> GateResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| GateError::Internal(format!("JWT encode: {}", e)))
    }

    /// Mint an access/refresh pair for an authenticated user.
    pub fn issue(&self, user: &User) -> GateResult<TokenPair> {
        Ok(TokenPair {
            access: self.sign(&self.claims_for(user, TokenType::Access))?,
            refresh: self.sign(&self.claims_for(user, TokenType::Refresh))?,
        })
    }

    /// Mint a fresh access token against already-verified refresh claims.
    pub fn issue_access(&self, user: &User) -> GateResult<String> {
        self.sign(&self.claims_for(user, TokenType::Access))
    }

    fn decode_claims(&self, token: &str) -> GateResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.set_required_spec_claims(&["sub", "exp"]);

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => GateError::TokenExpired,
                _ => GateError::TokenInvalid(e.to_string()),
            })
    }

    /// Verify an access token. Fails closed on any structural,
    /// signature, or expiry problem, and on a refresh token presented
    /// as access.
    pub fn verify_access(&self, token: &str) -> GateResult<TokenClaims> {
        let claims = self.decode_claims(token)?;
        if claims.token_type != TokenType::Access {
            return Err(GateError::TokenInvalid("not an access token".to_string()));
        }
        Ok(claims)
    }

    /// Verify signature and expiry of either token kind. Backs the
    /// bare token-verification endpoint.
    pub fn verify(&self, token: &str) -> GateResult<TokenClaims> {
        self.decode_claims(token)
    }

    /// Verify a refresh token and return its claims.
    pub fn verify_refresh(&self, token: &str) -> GateResult<TokenClaims> {
        let claims = self.decode_claims(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(GateError::TokenInvalid("not a refresh token".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(access_ttl: i64, refresh_ttl: i64) -> TokenService {
        TokenService {
            encoding_key: EncodingKey::from_secret(b"test-secret-test-secret-test-secret!"),
            decoding_key: DecodingKey::from_secret(b"test-secret-test-secret-test-secret!"),
            access_ttl_secs: access_ttl,
            refresh_ttl_secs: refresh_ttl,
            leeway_secs: 0,
        }
    }

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            phone: None,
            password_hash: String::new(),
            is_email_verified: true,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn issued_access_token_verifies() {
        let svc = service(900, 86400);
        let user = test_user();
        let pair = svc.issue(&user).unwrap();
        let claims = svc.verify_access(&pair.access).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_rejected_as_access() {
        let svc = service(900, 86400);
        let pair = svc.issue(&test_user()).unwrap();
        assert!(matches!(
            svc.verify_access(&pair.refresh),
            Err(GateError::TokenInvalid(_))
        ));
        assert!(svc.verify_refresh(&pair.refresh).is_ok());
    }

    #[test]
    fn expired_token_fails_with_token_expired() {
        let svc = service(-10, -10); // already expired at issue
        let pair = svc.issue(&test_user()).unwrap();
        assert!(matches!(
            svc.verify_access(&pair.access),
            Err(GateError::TokenExpired)
        ));
        assert!(matches!(
            svc.verify_refresh(&pair.refresh),
            Err(GateError::TokenExpired)
        ));
    }

    #[test]
    fn tampered_token_fails_with_token_invalid() {
        let svc = service(900, 86400);
        let pair = svc.issue(&test_user()).unwrap();
        let mut tampered = pair.access.clone();
        // Flip a character in the payload segment
        let mid = tampered.len() / 2;
        let replacement = if tampered.as_bytes()[mid] == b'A' { "B" } else { "A" };
        tampered.replace_range(mid..mid + 1, replacement);
        assert!(matches!(
            svc.verify_access(&tampered),
            Err(GateError::TokenInvalid(_)) | Err(GateError::TokenExpired)
        ));
    }

    #[test]
    fn foreign_signature_rejected() {
        let svc = service(900, 86400);
        let other = TokenService {
            encoding_key: EncodingKey::from_secret(b"another-secret-another-secret-ok!"),
            decoding_key: DecodingKey::from_secret(b"another-secret-another-secret-ok!"),
            access_ttl_secs: 900,
            refresh_ttl_secs: 86400,
            leeway_secs: 0,
        };
        let pair = other.issue(&test_user()).unwrap();
        assert!(matches!(
            svc.verify_access(&pair.access),
            Err(GateError::TokenInvalid(_))
        ));
    }

    #[test]
    fn jti_is_unique_per_token() {
        let svc = service(900, 86400);
        let user = test_user();
        let p1 = svc.issue(&user).unwrap();
        let p2 = svc.issue(&user).unwrap();
        let c1 = svc.verify_access(&p1.access).unwrap();
        let c2 = svc.verify_access(&p2.access).unwrap();
        assert_ne!(c1.jti, c2.jti);
    }
}
