/// Identity store: user rows, OTP records, and consumed token ids
use crate::error::{GateError, GateResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// User record in the identity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_email_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// One-to-one OTP state for a user
///
/// Invariant: `is_active` implies `secret` is present; the secret is a
/// SecretCipher ciphertext of the base32 TOTP seed.
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub user_id: Uuid,
    pub secret: Option<String>,
    pub is_active: bool,
}

/// Fields required to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
}

/// Typed access to the identity store. Cheap to clone.
#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> GateResult<User> {
    let id: String = row.get("id");
    Ok(User {
        id: Uuid::parse_str(&id)
            .map_err(|_| GateError::Internal("malformed user id in store".to_string()))?,
        username: row.get("username"),
        email: row.get("email"),
        phone: row.get("phone"),
        password_hash: row.get("password_hash"),
        is_email_verified: row.get("is_email_verified"),
        is_active: row.get("is_active"),
        is_staff: row.get("is_staff"),
        is_superuser: row.get("is_superuser"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    })
}

const USER_COLUMNS: &str = "id, username, email, phone, password_hash, is_email_verified, \
                            is_active, is_staff, is_superuser, created_at, last_login";

fn map_insert_error(e: sqlx::Error) -> GateError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            GateError::Conflict("Username, email or phone already registered".to_string())
        }
        _ => GateError::Database(e),
    }
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a user and its empty OTP record in one transaction.
    ///
    /// The OTP row is an explicit post-creation step inside the same
    /// transaction rather than an implicit hook, so the creation
    /// sequence stays linear.
    pub async fn create_user(&self, new_user: NewUser) -> GateResult<User> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.db.begin().await.map_err(GateError::Database)?;

        sqlx::query(
            "INSERT INTO user_account (id, username, email, phone, password_hash, \
             is_email_verified, is_active, is_staff, is_superuser, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(id.to_string())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.phone)
        .bind(&new_user.password_hash)
        .bind(false)
        .bind(true)
        .bind(false)
        .bind(false)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        sqlx::query("INSERT INTO otp_record (user_id, secret, is_active) VALUES (?1, NULL, 0)")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(GateError::Database)?;

        tx.commit().await.map_err(GateError::Database)?;

        Ok(User {
            id,
            username: new_user.username,
            email: new_user.email,
            phone: new_user.phone,
            password_hash: new_user.password_hash,
            is_email_verified: false,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            created_at: now,
            last_login: None,
        })
    }

    /// Find a user by username, email, or phone. The three fields are
    /// each unique, so at most one row matches across the union.
    pub async fn find_by_identifier(&self, identifier: &str) -> GateResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_account WHERE username = ?1 OR email = ?1 OR phone = ?1",
            USER_COLUMNS
        ))
        .bind(identifier)
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        row.as_ref().map(row_to_user).transpose()
    }

    /// Get a user by id
    pub async fn get(&self, id: Uuid) -> GateResult<User> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_account WHERE id = ?1",
            USER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?
        .ok_or_else(|| GateError::NotFound("User not found".to_string()))?;

        row_to_user(&row)
    }

    /// Replace the password hash. Single atomic field update.
    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> GateResult<()> {
        let result = sqlx::query("UPDATE user_account SET password_hash = ?1 WHERE id = ?2")
            .bind(password_hash)
            .bind(id.to_string())
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        if result.rows_affected() == 0 {
            return Err(GateError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    /// Flip the email-verified flag. Idempotent.
    pub async fn set_email_verified(&self, id: Uuid) -> GateResult<()> {
        sqlx::query("UPDATE user_account SET is_email_verified = 1 WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;
        Ok(())
    }

    /// Record a successful login
    pub async fn touch_last_login(&self, id: Uuid) -> GateResult<()> {
        sqlx::query("UPDATE user_account SET last_login = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;
        Ok(())
    }

    /// Fetch the OTP record for a user
    pub async fn otp_record(&self, user_id: Uuid) -> GateResult<OtpRecord> {
        let row = sqlx::query("SELECT user_id, secret, is_active FROM otp_record WHERE user_id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.db)
            .await
            .map_err(GateError::Database)?
            .ok_or_else(|| GateError::NotFound("OTP record not found".to_string()))?;

        Ok(OtpRecord {
            user_id,
            secret: row.get("secret"),
            is_active: row.get("is_active"),
        })
    }

    /// Store an encrypted secret and flip activation in one statement,
    /// so no state exists where the flag is set but the secret empty.
    pub async fn activate_otp(&self, user_id: Uuid, encrypted_secret: &str) -> GateResult<()> {
        let result =
            sqlx::query("UPDATE otp_record SET secret = ?1, is_active = 1 WHERE user_id = ?2")
                .bind(encrypted_secret)
                .bind(user_id.to_string())
                .execute(&self.db)
                .await
                .map_err(GateError::Database)?;

        if result.rows_affected() == 0 {
            return Err(GateError::NotFound("OTP record not found".to_string()));
        }
        Ok(())
    }

    /// Clear the secret and deactivate. Idempotent; the secret is
    /// removed rather than just deactivated so a half-registered seed
    /// cannot be reused.
    pub async fn clear_otp(&self, user_id: Uuid) -> GateResult<()> {
        sqlx::query("UPDATE otp_record SET secret = NULL, is_active = 0 WHERE user_id = ?1")
            .bind(user_id.to_string())
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;
        Ok(())
    }

    /// Mark a token id as consumed. Returns false if it was already
    /// consumed; the insert-or-ignore makes concurrent consumers race
    /// safely, with exactly one winner.
    pub async fn consume_token(&self, jti: &str) -> GateResult<bool> {
        let result = sqlx::query(
            "INSERT INTO consumed_token (jti, consumed_at) VALUES (?1, ?2) \
             ON CONFLICT(jti) DO NOTHING",
        )
        .bind(jti)
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Drop consumed-token rows older than the longest token lifetime.
    /// Anything older can no longer pass expiry checks anyway.
    pub async fn prune_consumed_tokens(&self, older_than: DateTime<Utc>) -> GateResult<u64> {
        let result = sqlx::query("DELETE FROM consumed_token WHERE consumed_at < ?1")
            .bind(older_than)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(result.rows_affected())
    }
}
