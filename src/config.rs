/// Configuration management for Gatehouse
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub cookies: CookieConfig,
    pub features: FeatureConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Issuer name shown in authenticator apps and mail templates
    pub product_name: String,
    /// Public base URL used to build verification/reset links
    pub public_url: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC key for JWT signing (access/refresh tokens and link claims)
    pub jwt_secret: String,
    /// 32-byte AES-256-GCM key, hex-encoded, for SecretCipher
    pub cipher_key_hex: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Lifetime of the OTP step-up ticket issued after the password stage
    pub step_up_ttl_secs: i64,
    /// Lifetime of password-reset and email-verification links
    pub link_ttl_secs: i64,
    /// Clock-skew tolerance for expiry checks
    pub leeway_secs: u64,
    pub min_password_length: usize,
    /// Email domains rejected at signup
    pub blocked_email_domains: Vec<String>,
}

/// Cookie transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    pub access_name: String,
    pub refresh_name: String,
    pub secure: bool,
    pub httponly: bool,
    /// One of "lax", "strict", "none"
    pub samesite: String,
    /// Refresh cookie is scoped to this path
    pub refresh_path: String,
}

/// Feature flags consulted once at flow entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub email_verification_required: bool,
    pub refresh_rotation_enabled: bool,
    pub logout_on_password_change: bool,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Per-identifier attempt throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub attempts_per_minute: u32,
    pub burst: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> GateResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("GATE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("GATE_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| GateError::Validation("Invalid port number".to_string()))?;
        let product_name =
            env::var("GATE_PRODUCT_NAME").unwrap_or_else(|_| "Gatehouse".to_string());
        let public_url = env::var("GATE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));

        let data_directory: PathBuf = env::var("GATE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("GATE_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("gatehouse.sqlite"));

        let jwt_secret = env::var("GATE_JWT_SECRET")
            .map_err(|_| GateError::Validation("JWT secret required".to_string()))?;
        let cipher_key_hex = env::var("GATE_CIPHER_KEY")
            .map_err(|_| GateError::Validation("Cipher key required".to_string()))?;

        let email = if let Ok(smtp_url) = env::var("GATE_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("GATE_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                product_name,
                public_url,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            auth: AuthConfig {
                jwt_secret,
                cipher_key_hex,
                access_ttl_secs: env_parse("GATE_ACCESS_TTL_SECS", 900),
                refresh_ttl_secs: env_parse("GATE_REFRESH_TTL_SECS", 1_209_600),
                step_up_ttl_secs: env_parse("GATE_STEP_UP_TTL_SECS", 300),
                link_ttl_secs: env_parse("GATE_LINK_TTL_SECS", 1800),
                leeway_secs: env_parse("GATE_LEEWAY_SECS", 5),
                min_password_length: env_parse("GATE_MIN_PASSWORD_LENGTH", 8),
                blocked_email_domains: env::var("GATE_BLOCKED_EMAIL_DOMAINS")
                    .map(|v| {
                        v.split(',')
                            .map(|d| d.trim().to_lowercase())
                            .filter(|d| !d.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            cookies: CookieConfig {
                access_name: env::var("GATE_ACCESS_COOKIE")
                    .unwrap_or_else(|_| "access".to_string()),
                refresh_name: env::var("GATE_REFRESH_COOKIE")
                    .unwrap_or_else(|_| "refresh".to_string()),
                secure: env_parse("GATE_COOKIE_SECURE", false),
                httponly: env_parse("GATE_COOKIE_HTTPONLY", true),
                samesite: env::var("GATE_COOKIE_SAMESITE").unwrap_or_else(|_| "lax".to_string()),
                refresh_path: env::var("GATE_REFRESH_COOKIE_PATH")
                    .unwrap_or_else(|_| "/auth/token".to_string()),
            },
            features: FeatureConfig {
                email_verification_required: env_parse("GATE_EMAIL_VERIFICATION_REQUIRED", false),
                refresh_rotation_enabled: env_parse("GATE_REFRESH_ROTATION_ENABLED", true),
                logout_on_password_change: env_parse("GATE_LOGOUT_ON_PASSWORD_CHANGE", true),
            },
            email,
            rate_limit: RateLimitConfig {
                enabled: env_parse("GATE_RATE_LIMITS_ENABLED", true),
                attempts_per_minute: env_parse("GATE_ATTEMPTS_PER_MINUTE", 5),
                burst: env_parse("GATE_ATTEMPT_BURST", 5),
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> GateResult<()> {
        if self.service.hostname.is_empty() {
            return Err(GateError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(GateError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        self.cipher_key()?;

        if !matches!(self.cookies.samesite.as_str(), "lax" | "strict" | "none") {
            return Err(GateError::Validation(
                "Cookie samesite must be lax, strict or none".to_string(),
            ));
        }

        Ok(())
    }

    /// Decode the configured cipher key into raw bytes
    pub fn cipher_key(&self) -> GateResult<[u8; 32]> {
        let bytes = hex::decode(&self.auth.cipher_key_hex)
            .map_err(|_| GateError::Validation("Cipher key must be hex".to_string()))?;
        bytes.try_into().map_err(|_| {
            GateError::Validation("Cipher key must be 32 bytes (64 hex chars)".to_string())
        })
    }
}
