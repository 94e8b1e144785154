/// Account and authentication flows
///
/// Request/response types for the auth endpoints, and the manager that
/// composes the credential, token, OTP, and link services.

mod manager;

pub use manager::{AccountManager, LoginOutcome, RefreshOutcome, SignupOutcome};

use serde::{Deserialize, Serialize};

/// Signup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub retype_password: String,
}

/// Login request; identifier may be username, email, or phone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// OTP step-up request: the ticket from the login response plus the
/// code from the authenticator app
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpLoginRequest {
    pub secret: String,
    pub otp: String,
}

/// OTP provisioning confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfirmRequest {
    pub generated_key: String,
    pub otp: String,
}

/// OTP provisioning response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpProvisionResponse {
    pub qr_key: String,
    pub generated_key: String,
}

/// Bare token verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenVerifyRequest {
    pub token: String,
}

/// Current-password validation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordValidateRequest {
    pub password: String,
}

/// Password change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub password: String,
    pub retype_password: String,
}

/// Password reset request; identifier may be username, email, or phone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub username: String,
}

/// Reset link validity check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordCheckRequest {
    pub token: String,
}

/// Reset confirmation: link token plus the new password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordConfirmRequest {
    pub token: String,
    pub password: String,
    pub retype_password: String,
}

/// Resend-verification-email request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}
