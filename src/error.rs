/// Unified error types for the Gatehouse auth engine
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum GateError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bad identifier or password; never discloses which
    #[error("Invalid credentials")]
    CredentialRejected,

    /// Account exists but is soft-disabled
    #[error("Account is disabled")]
    AccountDisabled,

    /// Login blocked until the email address is verified
    #[error("Email not verified")]
    EmailUnverified,

    /// Token signature/structure valid but past expiry
    #[error("Token has expired")]
    TokenExpired,

    /// Token failed structural or signature checks
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// A rotated refresh token was presented a second time
    #[error("Refresh token already used")]
    TokenReused,

    /// TOTP code did not match the accepted window
    #[error("OTP is wrong or expired")]
    OtpInvalid,

    /// OTP verification requested but no active secret exists
    #[error("OTP is not enabled for this account")]
    OtpNotEnabled,

    /// Signed link past its TTL
    #[error("Link has expired")]
    LinkExpired,

    /// Signed link failed decryption or signature checks
    #[error("Invalid link")]
    LinkInvalid,

    /// Ciphertext was not produced by us (or key rotated)
    #[error("Invalid ciphertext")]
    InvalidCiphertext,

    /// New password rejected by policy
    #[error("Password policy violation: {0}")]
    PasswordPolicyViolation(String),

    /// Per-identifier attempt quota exceeded
    #[error("Too many attempts, slow down")]
    RateLimited,

    /// Request validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (duplicate username/email/phone)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server errors (crypto primitives, store failures)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert GateError to HTTP response
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            GateError::CredentialRejected => (
                StatusCode::UNAUTHORIZED,
                "CredentialRejected",
                self.to_string(),
            ),
            GateError::AccountDisabled => {
                (StatusCode::FORBIDDEN, "AccountDisabled", self.to_string())
            }
            GateError::EmailUnverified => {
                (StatusCode::FORBIDDEN, "EmailUnverified", self.to_string())
            }
            GateError::TokenExpired => {
                (StatusCode::UNAUTHORIZED, "TokenExpired", self.to_string())
            }
            GateError::TokenInvalid(_) => {
                (StatusCode::UNAUTHORIZED, "TokenInvalid", self.to_string())
            }
            GateError::TokenReused => {
                (StatusCode::UNAUTHORIZED, "TokenReused", self.to_string())
            }
            GateError::OtpInvalid => (StatusCode::UNAUTHORIZED, "OtpInvalid", self.to_string()),
            GateError::OtpNotEnabled => {
                (StatusCode::UNAUTHORIZED, "OtpNotEnabled", self.to_string())
            }
            GateError::LinkExpired => (StatusCode::GONE, "LinkExpired", self.to_string()),
            GateError::LinkInvalid | GateError::InvalidCiphertext => (
                StatusCode::BAD_REQUEST,
                "LinkInvalid",
                "Invalid link".to_string(),
            ),
            GateError::PasswordPolicyViolation(_) => (
                StatusCode::BAD_REQUEST,
                "PasswordPolicyViolation",
                self.to_string(),
            ),
            GateError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimited",
                self.to_string(),
            ),
            GateError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            GateError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            GateError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            GateError::Database(_) | GateError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for engine operations
pub type GateResult<T> = Result<T, GateError>;
