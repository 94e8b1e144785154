/// Shared application state wired together at startup
use crate::{
    account::AccountManager,
    config::ServerConfig,
    crypto::SecretCipher,
    db::{self, user::UserStore, DatabaseOptions},
    error::GateResult,
    link::SignedLinkService,
    mailer::Mailer,
    otp::OtpEngine,
    rate_limit::{AttemptLimitConfig, AttemptLimiter},
    token::TokenService,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context shared across all request handlers
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Initialize the full application: database, migrations, and all
    /// services behind the account manager.
    pub async fn new(config: ServerConfig) -> GateResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.storage.database, DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        tracing::info!("Database ready at {}", config.storage.database.display());

        let config = Arc::new(config);
        let store = UserStore::new(db.clone());
        let cipher = SecretCipher::new(config.cipher_key()?);
        let tokens = TokenService::new(&config.auth);
        let links = SignedLinkService::new(
            cipher.clone(),
            &config.auth.jwt_secret,
            config.auth.leeway_secs,
        );
        let otp = OtpEngine::new(store.clone(), cipher, config.service.product_name.clone());
        let limiter = AttemptLimiter::new(AttemptLimitConfig {
            enabled: config.rate_limit.enabled,
            attempts_per_minute: config.rate_limit.attempts_per_minute,
            burst: config.rate_limit.burst,
        });

        let accounts = Arc::new(AccountManager::new(
            store,
            tokens,
            links,
            otp,
            limiter,
            config.clone(),
        )?);
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        if !mailer.is_configured() {
            tracing::warn!("SMTP not configured, outbound email will be logged and dropped");
        }

        Ok(Self {
            config,
            db,
            accounts,
            mailer,
        })
    }
}
