/// TOTP generation and verification (RFC 6238)
use crate::error::{GateError, GateResult};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1; // ±1 step tolerance
const STEP_SECS: u64 = 30;

/// A freshly generated, not-yet-confirmed TOTP enrollment.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// Base32-encoded seed, shown to the user once
    pub secret_base32: String,
    /// QR-encodable otpauth:// URI (label = account email, issuer = product name)
    pub provisioning_uri: String,
}

fn build_totp(secret_base32: &str, issuer: &str, account: &str) -> GateResult<TOTP> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| GateError::Internal(format!("TOTP secret decode: {:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1, // RFC 6238 default, what authenticator apps expect
        DIGITS,
        SKEW,
        STEP_SECS,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| GateError::Internal(format!("TOTP init: {}", e)))
}

/// Generate a new random enrollment for an account.
pub fn generate_enrollment(issuer: &str, account: &str) -> GateResult<Enrollment> {
    let secret = Secret::generate_secret();
    let secret_base32 = secret.to_encoded().to_string();
    let totp = build_totp(&secret_base32, issuer, account)?;

    Ok(Enrollment {
        secret_base32,
        provisioning_uri: totp.get_url(),
    })
}

/// Verify a code against a base32 seed within the accepted window.
pub fn verify_code(
    secret_base32: &str,
    code: &str,
    issuer: &str,
    account: &str,
) -> GateResult<bool> {
    let totp = build_totp(secret_base32, issuer, account)?;
    totp.check_current(code)
        .map_err(|e| GateError::Internal(format!("TOTP check: {}", e)))
}

/// Current code for a seed. Test helper and debugging aid.
pub fn current_code(secret_base32: &str, issuer: &str, account: &str) -> GateResult<String> {
    let totp = build_totp(secret_base32, issuer, account)?;
    totp.generate_current()
        .map_err(|e| GateError::Internal(format!("TOTP generate: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_produces_base32_secret_and_uri() {
        let enrollment = generate_enrollment("Gatehouse", "alice@example.com").unwrap();
        assert!(!enrollment.secret_base32.is_empty());
        assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));
        assert!(enrollment.provisioning_uri.contains("Gatehouse"));
        assert!(enrollment.provisioning_uri.contains("alice"));
    }

    #[test]
    fn current_code_verifies() {
        let enrollment = generate_enrollment("Gatehouse", "bob@example.com").unwrap();
        let code =
            current_code(&enrollment.secret_base32, "Gatehouse", "bob@example.com").unwrap();
        assert!(
            verify_code(&enrollment.secret_base32, &code, "Gatehouse", "bob@example.com").unwrap()
        );
    }

    #[test]
    fn wrong_code_rejected() {
        let enrollment = generate_enrollment("Gatehouse", "bob@example.com").unwrap();
        let code =
            current_code(&enrollment.secret_base32, "Gatehouse", "bob@example.com").unwrap();
        // Flip one digit to guarantee a mismatch
        let wrong: String = code
            .chars()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    char::from_digit((c.to_digit(10).unwrap() + 1) % 10, 10).unwrap()
                } else {
                    c
                }
            })
            .collect();
        assert!(
            !verify_code(&enrollment.secret_base32, &wrong, "Gatehouse", "bob@example.com")
                .unwrap()
        );
    }

    #[test]
    fn code_from_different_secret_rejected() {
        let a = generate_enrollment("Gatehouse", "a@example.com").unwrap();
        let b = generate_enrollment("Gatehouse", "b@example.com").unwrap();
        let code_b = current_code(&b.secret_base32, "Gatehouse", "b@example.com").unwrap();
        // Overwhelmingly unlikely to collide within the window
        if code_b != current_code(&a.secret_base32, "Gatehouse", "a@example.com").unwrap() {
            assert!(
                !verify_code(&a.secret_base32, &code_b, "Gatehouse", "a@example.com").unwrap()
            );
        }
    }
}
