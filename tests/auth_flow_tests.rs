/// End-to-end account flows against an in-memory database:
/// signup, login with and without the second factor, refresh
/// rotation, and the password-reset and email-verification links.
use gatehouse::{
    account::{AccountManager, LoginOutcome, SignupOutcome, SignupRequest},
    config::{
        AuthConfig, CookieConfig, EmailConfig, FeatureConfig, LoggingConfig, RateLimitConfig,
        ServerConfig, ServiceConfig, StorageConfig,
    },
    crypto::{totp, SecretCipher},
    db,
    db::user::UserStore,
    error::GateError,
    jobs,
    link::SignedLinkService,
    otp::OtpEngine,
    rate_limit::{AttemptLimitConfig, AttemptLimiter},
    token::TokenService,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".into(),
            port: 0,
            product_name: "Gatehouse".into(),
            public_url: "http://localhost".into(),
        },
        storage: StorageConfig {
            data_directory: ":memory:".into(),
            database: ":memory:".into(),
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret-with-32-bytes!".into(),
            cipher_key_hex: "ab".repeat(32),
            access_ttl_secs: 900,
            refresh_ttl_secs: 3600,
            step_up_ttl_secs: 300,
            link_ttl_secs: 1800,
            leeway_secs: 5,
            min_password_length: 8,
            blocked_email_domains: Vec::new(),
        },
        cookies: CookieConfig {
            access_name: "access".into(),
            refresh_name: "refresh".into(),
            secure: false,
            httponly: true,
            samesite: "lax".into(),
            refresh_path: "/auth/token".into(),
        },
        features: FeatureConfig {
            email_verification_required: false,
            refresh_rotation_enabled: true,
            logout_on_password_change: true,
        },
        email: None::<EmailConfig>,
        rate_limit: RateLimitConfig {
            enabled: false,
            attempts_per_minute: 100,
            burst: 100,
        },
        logging: LoggingConfig {
            level: "debug".into(),
        },
    }
}

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

async fn build_manager(config: ServerConfig) -> AccountManager {
    let pool = memory_pool().await;
    let config = Arc::new(config);
    let store = UserStore::new(pool);
    let cipher = SecretCipher::new(config.cipher_key().unwrap());
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
    AccountManager::new(store, tokens, links, otp, limiter, config).unwrap()
}

fn signup_request(username: &str) -> SignupRequest {
    SignupRequest {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        phone: None,
        password: "correct horse".into(),
        retype_password: "correct horse".into(),
    }
}

async fn create_account(manager: &AccountManager, username: &str) -> SignupOutcome {
    manager.signup(signup_request(username)).await.unwrap()
}

#[tokio::test]
async fn signup_then_login_without_otp_yields_tokens() {
    let manager = build_manager(test_config()).await;
    let outcome = create_account(&manager, "alice").await;
    assert!(outcome.tokens.is_some());
    assert!(outcome.verification_token.is_none());

    match manager.login("alice", "correct horse").await.unwrap() {
        LoginOutcome::Tokens(pair) => {
            manager.verify_token(&pair.access).unwrap();
            manager.verify_token(&pair.refresh).unwrap();
        }
        LoginOutcome::StepUp { .. } => panic!("no OTP is enrolled"),
    }
}

#[tokio::test]
async fn login_accepts_email_and_phone_identifiers() {
    let manager = build_manager(test_config()).await;
    let mut req = signup_request("bob");
    req.phone = Some("+15550100".into());
    manager.signup(req).await.unwrap();

    assert!(manager.login("bob@example.com", "correct horse").await.is_ok());
    assert!(manager.login("+15550100", "correct horse").await.is_ok());
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_indistinguishable() {
    let manager = build_manager(test_config()).await;
    create_account(&manager, "carol").await;

    let wrong = manager.login("carol", "incorrect").await.unwrap_err();
    let unknown = manager.login("nobody", "incorrect").await.unwrap_err();
    assert!(matches!(wrong, GateError::CredentialRejected));
    assert!(matches!(unknown, GateError::CredentialRejected));
}

#[tokio::test]
async fn duplicate_username_rejected() {
    let manager = build_manager(test_config()).await;
    create_account(&manager, "dave").await;

    let err = manager.signup(signup_request("dave")).await.unwrap_err();
    assert!(matches!(err, GateError::Conflict(_)));
}

#[tokio::test]
async fn password_policy_enforced_at_signup() {
    let manager = build_manager(test_config()).await;

    let mut req = signup_request("erin");
    req.password = "short".into();
    req.retype_password = "short".into();
    assert!(matches!(
        manager.signup(req).await.unwrap_err(),
        GateError::PasswordPolicyViolation(_)
    ));

    let mut req = signup_request("erin");
    req.password = "123456789012".into();
    req.retype_password = "123456789012".into();
    assert!(matches!(
        manager.signup(req).await.unwrap_err(),
        GateError::PasswordPolicyViolation(_)
    ));
}

#[tokio::test]
async fn blocked_email_domain_rejected_at_signup() {
    let mut config = test_config();
    config.auth.blocked_email_domains = vec!["mailinator.com".into()];
    let manager = build_manager(config).await;

    let mut req = signup_request("spammer");
    req.email = "spammer@Mailinator.com".into();
    assert!(matches!(
        manager.signup(req).await.unwrap_err(),
        GateError::Validation(_)
    ));

    // Other domains unaffected
    manager.signup(signup_request("legit")).await.unwrap();
}

// ---- OTP enrollment and step-up ----

#[tokio::test]
async fn otp_enrollment_turns_login_into_step_up() {
    let manager = build_manager(test_config()).await;
    let user = create_account(&manager, "frank").await.user;

    let enrollment = manager.otp_engine().begin_provisioning(&user).unwrap();
    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    manager
        .otp_engine()
        .confirm_provisioning(&user, &enrollment.secret_base32, &code)
        .await
        .unwrap();
    assert!(manager.otp_engine().is_enabled(user.id).await.unwrap());

    let ticket = match manager.login("frank", "correct horse").await.unwrap() {
        LoginOutcome::StepUp { secret } => secret,
        LoginOutcome::Tokens(_) => panic!("OTP is enrolled, expected step-up"),
    };

    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    let pair = manager.otp_login(&ticket, &code).await.unwrap();
    manager.verify_token(&pair.access).unwrap();
}

#[tokio::test]
async fn step_up_ticket_is_single_use() {
    let manager = build_manager(test_config()).await;
    let user = create_account(&manager, "grace").await.user;

    let enrollment = manager.otp_engine().begin_provisioning(&user).unwrap();
    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    manager
        .otp_engine()
        .confirm_provisioning(&user, &enrollment.secret_base32, &code)
        .await
        .unwrap();

    let ticket = match manager.login("grace", "correct horse").await.unwrap() {
        LoginOutcome::StepUp { secret } => secret,
        LoginOutcome::Tokens(_) => panic!("expected step-up"),
    };

    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    manager.otp_login(&ticket, &code).await.unwrap();

    // Second submission of the same ticket must fail even with a valid code
    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    assert!(matches!(
        manager.otp_login(&ticket, &code).await.unwrap_err(),
        GateError::LinkInvalid
    ));
}

#[tokio::test]
async fn wrong_otp_code_rejected_and_ticket_stays_valid() {
    let manager = build_manager(test_config()).await;
    let user = create_account(&manager, "heidi").await.user;

    let enrollment = manager.otp_engine().begin_provisioning(&user).unwrap();
    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    manager
        .otp_engine()
        .confirm_provisioning(&user, &enrollment.secret_base32, &code)
        .await
        .unwrap();

    let ticket = match manager.login("heidi", "correct horse").await.unwrap() {
        LoginOutcome::StepUp { secret } => secret,
        LoginOutcome::Tokens(_) => panic!("expected step-up"),
    };

    assert!(matches!(
        manager.otp_login(&ticket, "000000").await.unwrap_err(),
        GateError::OtpInvalid
    ));

    // The failure did not burn the ticket
    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    manager.otp_login(&ticket, &code).await.unwrap();
}

#[tokio::test]
async fn failed_provisioning_confirmation_leaves_otp_disabled() {
    let manager = build_manager(test_config()).await;
    let user = create_account(&manager, "ivan").await.user;

    let enrollment = manager.otp_engine().begin_provisioning(&user).unwrap();
    assert!(matches!(
        manager
            .otp_engine()
            .confirm_provisioning(&user, &enrollment.secret_base32, "000000")
            .await
            .unwrap_err(),
        GateError::OtpInvalid
    ));
    assert!(!manager.otp_engine().is_enabled(user.id).await.unwrap());

    // Login proceeds straight to tokens
    assert!(matches!(
        manager.login("ivan", "correct horse").await.unwrap(),
        LoginOutcome::Tokens(_)
    ));
}

#[tokio::test]
async fn otp_removal_restores_direct_login() {
    let manager = build_manager(test_config()).await;
    let user = create_account(&manager, "judy").await.user;

    let enrollment = manager.otp_engine().begin_provisioning(&user).unwrap();
    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    manager
        .otp_engine()
        .confirm_provisioning(&user, &enrollment.secret_base32, &code)
        .await
        .unwrap();

    manager.otp_engine().remove(user.id).await.unwrap();
    assert!(!manager.otp_engine().is_enabled(user.id).await.unwrap());
    assert!(matches!(
        manager.login("judy", "correct horse").await.unwrap(),
        LoginOutcome::Tokens(_)
    ));
}

// ---- refresh rotation ----

#[tokio::test]
async fn refresh_rotates_and_detects_replay() {
    let manager = build_manager(test_config()).await;
    let pair = create_account(&manager, "kim").await.tokens.unwrap();

    let first = manager.refresh(&pair.refresh).await.unwrap();
    let rotated = first.refresh.expect("rotation enabled");
    manager.verify_token(&first.access).unwrap();

    // Replaying the consumed token is detected
    assert!(matches!(
        manager.refresh(&pair.refresh).await.unwrap_err(),
        GateError::TokenReused
    ));

    // The rotated token still works once
    manager.refresh(&rotated).await.unwrap();
}

#[tokio::test]
async fn refresh_without_rotation_keeps_token_valid() {
    let mut config = test_config();
    config.features.refresh_rotation_enabled = false;
    let manager = build_manager(config).await;
    let pair = create_account(&manager, "leo").await.tokens.unwrap();

    let first = manager.refresh(&pair.refresh).await.unwrap();
    assert!(first.refresh.is_none());

    // No rotation, so the same token may be presented again
    manager.refresh(&pair.refresh).await.unwrap();
}

#[tokio::test]
async fn access_token_cannot_be_used_as_refresh() {
    let manager = build_manager(test_config()).await;
    let pair = create_account(&manager, "mallory").await.tokens.unwrap();

    assert!(matches!(
        manager.refresh(&pair.access).await.unwrap_err(),
        GateError::TokenInvalid(_)
    ));
}

#[tokio::test]
async fn revoked_refresh_token_fails_as_reused() {
    let manager = build_manager(test_config()).await;
    let pair = create_account(&manager, "victor").await.tokens.unwrap();

    manager.revoke_refresh(&pair.refresh).await.unwrap();

    assert!(matches!(
        manager.refresh(&pair.refresh).await.unwrap_err(),
        GateError::TokenReused
    ));
}

#[tokio::test]
async fn revocation_of_garbage_token_is_rejected() {
    let manager = build_manager(test_config()).await;
    assert!(matches!(
        manager.revoke_refresh("not-a-token").await.unwrap_err(),
        GateError::TokenInvalid(_)
    ));
}

// ---- password reset links ----

#[tokio::test]
async fn password_reset_link_is_single_use() {
    let manager = build_manager(test_config()).await;
    create_account(&manager, "nina").await;

    let (_, token) = manager.request_password_reset("nina").await.unwrap();
    manager.check_reset_token(&token).unwrap();

    manager
        .confirm_password_reset(&token, "new password 1", "new password 1")
        .await
        .unwrap();

    assert!(manager.login("nina", "new password 1").await.is_ok());
    assert!(matches!(
        manager.login("nina", "correct horse").await.unwrap_err(),
        GateError::CredentialRejected
    ));

    // The consumed link cannot set another password
    assert!(matches!(
        manager
            .confirm_password_reset(&token, "new password 2", "new password 2")
            .await
            .unwrap_err(),
        GateError::LinkInvalid
    ));
}

#[tokio::test]
async fn expired_reset_link_reports_expiry() {
    let mut config = test_config();
    config.auth.link_ttl_secs = -120; // already past, beyond leeway
    let manager = build_manager(config).await;
    create_account(&manager, "oscar").await;

    let (_, token) = manager.request_password_reset("oscar").await.unwrap();
    assert!(matches!(
        manager.check_reset_token(&token).unwrap_err(),
        GateError::LinkExpired
    ));
    assert!(matches!(
        manager
            .confirm_password_reset(&token, "whatever pw", "whatever pw")
            .await
            .unwrap_err(),
        GateError::LinkExpired
    ));
}

#[tokio::test]
async fn prune_retains_consumed_link_jtis_for_the_full_link_ttl() {
    // Links may outlive refresh tokens; a consumed reset link must not
    // fall out of the consumed set while it can still pass expiry
    // checks, or it would replay.
    let mut config = test_config();
    config.auth.refresh_ttl_secs = 3600;
    config.auth.link_ttl_secs = 30 * 86400;
    let auth = config.auth.clone();
    let manager = build_manager(config).await;
    create_account(&manager, "walter").await;

    let (_, token) = manager.request_password_reset("walter").await.unwrap();
    manager
        .confirm_password_reset(&token, "new password 1", "new password 1")
        .await
        .unwrap();

    let pruned = manager
        .store()
        .prune_consumed_tokens(jobs::prune_cutoff(&auth))
        .await
        .unwrap();
    assert_eq!(pruned, 0);

    assert!(matches!(
        manager
            .confirm_password_reset(&token, "new password 2", "new password 2")
            .await
            .unwrap_err(),
        GateError::LinkInvalid
    ));
}

#[tokio::test]
async fn step_up_ticket_rejected_as_reset_link() {
    let manager = build_manager(test_config()).await;
    let user = create_account(&manager, "peggy").await.user;

    let enrollment = manager.otp_engine().begin_provisioning(&user).unwrap();
    let code = totp::current_code(&enrollment.secret_base32, "Gatehouse", &user.email).unwrap();
    manager
        .otp_engine()
        .confirm_provisioning(&user, &enrollment.secret_base32, &code)
        .await
        .unwrap();

    let ticket = match manager.login("peggy", "correct horse").await.unwrap() {
        LoginOutcome::StepUp { secret } => secret,
        LoginOutcome::Tokens(_) => panic!("expected step-up"),
    };

    // Purpose mismatch, not expiry
    assert!(matches!(
        manager.check_reset_token(&ticket).unwrap_err(),
        GateError::LinkInvalid
    ));
}

#[tokio::test]
async fn reset_for_unknown_identifier_rejected() {
    let manager = build_manager(test_config()).await;
    assert!(manager.request_password_reset("ghost").await.is_err());
}

// ---- email verification ----

#[tokio::test]
async fn email_verification_gates_login_and_is_idempotent() {
    let mut config = test_config();
    config.features.email_verification_required = true;
    let manager = build_manager(config).await;

    let outcome = manager.signup(signup_request("quinn")).await.unwrap();
    assert!(outcome.tokens.is_none());
    let token = outcome.verification_token.unwrap();

    assert!(matches!(
        manager.login("quinn", "correct horse").await.unwrap_err(),
        GateError::EmailUnverified
    ));

    assert!(!manager.verify_email(&token).await.unwrap());
    // Clicking the link again is harmless
    assert!(manager.verify_email(&token).await.unwrap());

    assert!(manager.login("quinn", "correct horse").await.is_ok());
}

#[tokio::test]
async fn resend_rejected_once_verified() {
    let mut config = test_config();
    config.features.email_verification_required = true;
    let manager = build_manager(config).await;

    manager.signup(signup_request("ruth")).await.unwrap();
    let (_, token) = manager
        .request_email_verification("ruth@example.com")
        .await
        .unwrap();
    manager.verify_email(&token).await.unwrap();

    assert!(manager
        .request_email_verification("ruth@example.com")
        .await
        .is_err());
}

// ---- password change ----

#[tokio::test]
async fn change_password_requires_current_password() {
    let manager = build_manager(test_config()).await;
    let user = create_account(&manager, "sybil").await.user;

    assert!(manager
        .change_password(&user, "wrong", "fresh password", "fresh password")
        .await
        .is_err());

    manager
        .change_password(&user, "correct horse", "fresh password", "fresh password")
        .await
        .unwrap();

    assert!(manager.login("sybil", "fresh password").await.is_ok());
    assert!(matches!(
        manager.login("sybil", "correct horse").await.unwrap_err(),
        GateError::CredentialRejected
    ));
}

// ---- throttling ----

#[tokio::test]
async fn login_attempts_are_throttled_per_identifier() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        enabled: true,
        attempts_per_minute: 3,
        burst: 3,
    };
    let manager = build_manager(config).await;
    create_account(&manager, "trent").await;

    for _ in 0..3 {
        let _ = manager.login("trent", "incorrect").await;
    }
    assert!(matches!(
        manager.login("trent", "correct horse").await.unwrap_err(),
        GateError::RateLimited
    ));

    // A different identifier is unaffected
    assert!(matches!(
        manager.login("someone-else", "pw").await.unwrap_err(),
        GateError::CredentialRejected
    ));
}
