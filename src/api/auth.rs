/// Auth endpoints: signup, login, OTP, token refresh, password flows
use crate::{
    account::{
        ChangePasswordRequest, LoginRequest, OtpConfirmRequest, OtpLoginRequest,
        OtpProvisionResponse, PasswordValidateRequest, ResendVerificationRequest,
        ResetPasswordCheckRequest, ResetPasswordConfirmRequest, ResetPasswordRequest,
        SignupRequest, TokenVerifyRequest,
    },
    account::LoginOutcome,
    api::cookies::{set_access_cookie, set_jwt_cookies, set_refresh_cookie, unset_jwt_cookies},
    auth::AuthContext,
    config::CookieConfig,
    context::AppContext,
    error::{GateError, GateResult},
    token::TokenPair,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/registration", post(registration))
        .route("/auth/resend-verification-email", post(resend_verification_email))
        .route("/auth/verify-email/:token", get(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/otp-login", post(otp_login))
        .route("/auth/otp-check", get(otp_check))
        .route(
            "/auth/qr-create",
            get(otp_provision).post(otp_confirm).delete(otp_remove),
        )
        .route("/auth/token/refresh", post(token_refresh))
        .route("/auth/token/verify", post(token_verify))
        .route("/auth/password-validate", post(password_validate))
        .route("/auth/change-password", put(change_password))
        .route("/auth/password-reset", post(password_reset))
        .route("/auth/password-reset-check", post(password_reset_check))
        .route("/auth/password-reset-confirm", post(password_reset_confirm))
}

/// Token pair as a JSON body, keyed by the configured cookie names
fn token_body(config: &CookieConfig, access: &str, refresh: &str) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(config.access_name.clone(), json!(access));
    body.insert(config.refresh_name.clone(), json!(refresh));
    Value::Object(body)
}

/// Attach tokens to the response via cookies and body
fn direct_login(
    jar: CookieJar,
    config: &CookieConfig,
    tokens: &TokenPair,
    status: StatusCode,
) -> Response {
    let jar = set_jwt_cookies(jar, config, &tokens.access, &tokens.refresh);
    let body = token_body(config, &tokens.access, &tokens.refresh);
    (jar, (status, Json(body))).into_response()
}

// ---- signup & email verification ----

async fn registration(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> GateResult<Response> {
    let outcome = ctx.accounts.signup(req).await?;

    if let Some(token) = outcome.verification_token {
        let base_url = &ctx.config.service.public_url;
        if let Err(e) = ctx
            .mailer
            .send_verification_email(
                &outcome.user.email,
                &outcome.user.username,
                &token,
                base_url,
                &ctx.config.service.product_name,
            )
            .await
        {
            // Delivery failure is non-fatal; the link can be re-sent
            tracing::warn!("Failed to send verification email: {}", e);
        }
        return Ok((
            StatusCode::OK,
            Json(json!({
                "detail": "Verification Email Sent",
                "email_verification_required": true,
            })),
        )
            .into_response());
    }

    match outcome.tokens {
        Some(tokens) => Ok(direct_login(
            jar,
            &ctx.config.cookies,
            &tokens,
            StatusCode::CREATED,
        )),
        None => Err(GateError::Internal("signup produced no tokens".to_string())),
    }
}

async fn resend_verification_email(
    State(ctx): State<AppContext>,
    Json(req): Json<ResendVerificationRequest>,
) -> GateResult<Json<Value>> {
    let (user, token) = ctx.accounts.request_email_verification(&req.email).await?;

    if let Err(e) = ctx
        .mailer
        .send_verification_email(
            &user.email,
            &user.username,
            &token,
            &ctx.config.service.public_url,
            &ctx.config.service.product_name,
        )
        .await
    {
        tracing::warn!("Failed to send verification email: {}", e);
    }

    Ok(Json(json!({
        "detail": "Verification Email Sent",
        "email_verification_required": true,
    })))
}

async fn verify_email(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> GateResult<Json<Value>> {
    let already_verified = ctx.accounts.verify_email(&token).await?;

    let detail = if already_verified {
        "Email Already Verified"
    } else {
        "Email Verification Successful"
    };
    Ok(Json(json!({ "detail": detail })))
}

// ---- login / OTP / refresh ----

async fn login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> GateResult<Response> {
    match ctx.accounts.login(&req.username, &req.password).await? {
        LoginOutcome::StepUp { secret } => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "secret": secret })),
        )
            .into_response()),
        LoginOutcome::Tokens(tokens) => Ok(direct_login(
            jar,
            &ctx.config.cookies,
            &tokens,
            StatusCode::OK,
        )),
    }
}

async fn otp_login(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(req): Json<OtpLoginRequest>,
) -> GateResult<Response> {
    let tokens = ctx.accounts.otp_login(&req.secret, &req.otp).await?;
    Ok(direct_login(jar, &ctx.config.cookies, &tokens, StatusCode::OK))
}

async fn logout(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    body: Option<Json<Value>>,
) -> GateResult<Response> {
    let config = &ctx.config.cookies;

    // Best-effort revocation: an absent or already-expired refresh
    // token still logs the client out.
    let refresh_token = jar
        .get(&config.refresh_name)
        .map(|c| c.value().to_string())
        .or_else(|| {
            body.as_ref().and_then(|Json(value)| {
                value
                    .get(&config.refresh_name)
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
            })
        });

    if let Some(token) = refresh_token {
        if let Err(e) = ctx.accounts.revoke_refresh(&token).await {
            tracing::debug!("Logout revocation skipped: {}", e);
        }
    }

    let jar = unset_jwt_cookies(jar, config);
    Ok((
        jar,
        (
            StatusCode::OK,
            Json(json!({ "detail": "Successfully logged out." })),
        ),
    )
        .into_response())
}

async fn token_refresh(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    body: Option<Json<Value>>,
) -> GateResult<Response> {
    let config = &ctx.config.cookies;

    // Refresh token from the cookie or the body, in that order
    let refresh_token = jar
        .get(&config.refresh_name)
        .map(|c| c.value().to_string())
        .or_else(|| {
            body.as_ref().and_then(|Json(value)| {
                value
                    .get(&config.refresh_name)
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
            })
        })
        .ok_or_else(|| GateError::TokenInvalid("No refresh token provided".to_string()))?;

    let outcome = ctx.accounts.refresh(&refresh_token).await?;

    let mut jar = set_access_cookie(jar, config, &outcome.access);
    let mut body = serde_json::Map::new();
    body.insert(config.access_name.clone(), json!(outcome.access));
    if let Some(ref rotated) = outcome.refresh {
        jar = set_refresh_cookie(jar, config, rotated);
        body.insert(config.refresh_name.clone(), json!(rotated));
    }

    Ok((jar, (StatusCode::OK, Json(Value::Object(body)))).into_response())
}

async fn token_verify(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenVerifyRequest>,
) -> GateResult<Json<Value>> {
    ctx.accounts.verify_token(&req.token)?;
    Ok(Json(json!({})))
}

// ---- OTP provisioning ----

async fn otp_check(auth: AuthContext, State(ctx): State<AppContext>) -> GateResult<Json<Value>> {
    let enabled = ctx.accounts.otp_engine().is_enabled(auth.user.id).await?;
    Ok(Json(json!({ "detail": enabled })))
}

async fn otp_provision(
    auth: AuthContext,
    State(ctx): State<AppContext>,
) -> GateResult<Json<OtpProvisionResponse>> {
    let enrollment = ctx.accounts.otp_engine().begin_provisioning(&auth.user)?;
    Ok(Json(OtpProvisionResponse {
        qr_key: enrollment.provisioning_uri,
        generated_key: enrollment.secret_base32,
    }))
}

async fn otp_confirm(
    auth: AuthContext,
    State(ctx): State<AppContext>,
    Json(req): Json<OtpConfirmRequest>,
) -> GateResult<Json<Value>> {
    ctx.accounts
        .otp_engine()
        .confirm_provisioning(&auth.user, &req.generated_key, &req.otp)
        .await?;
    Ok(Json(json!({ "detail": "Accepted" })))
}

async fn otp_remove(auth: AuthContext, State(ctx): State<AppContext>) -> GateResult<Json<Value>> {
    ctx.accounts.otp_engine().remove(auth.user.id).await?;
    Ok(Json(json!({ "message": "OTP Removed" })))
}

// ---- passwords ----

async fn password_validate(
    auth: AuthContext,
    State(ctx): State<AppContext>,
    Json(req): Json<PasswordValidateRequest>,
) -> GateResult<Response> {
    if ctx.accounts.check_password(&auth.user, &req.password)? {
        Ok((StatusCode::OK, Json(json!({ "message": "Password Accepted" }))).into_response())
    } else {
        Ok((
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({ "message": "Wrong Password" })),
        )
            .into_response())
    }
}

async fn change_password(
    auth: AuthContext,
    State(ctx): State<AppContext>,
    jar: CookieJar,
    Json(req): Json<ChangePasswordRequest>,
) -> GateResult<Response> {
    ctx.accounts
        .change_password(&auth.user, &req.old_password, &req.password, &req.retype_password)
        .await?;

    let body = Json(json!({ "detail": "Password updated successfully" }));

    if ctx.config.features.logout_on_password_change {
        let jar = unset_jwt_cookies(jar, &ctx.config.cookies);
        Ok((jar, (StatusCode::OK, body)).into_response())
    } else {
        Ok((StatusCode::OK, body).into_response())
    }
}

async fn password_reset(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> GateResult<Json<Value>> {
    let (user, token) = ctx.accounts.request_password_reset(&req.username).await?;

    if let Err(e) = ctx
        .mailer
        .send_password_reset_email(&user.email, &token, &ctx.config.service.public_url)
        .await
    {
        tracing::warn!("Failed to send password reset email: {}", e);
    }

    Ok(Json(json!({ "detail": "Email Sent", "is_email": true })))
}

async fn password_reset_check(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordCheckRequest>,
) -> GateResult<Json<Value>> {
    ctx.accounts.check_reset_token(&req.token)?;
    Ok(Json(json!({ "data": "Accepted" })))
}

async fn password_reset_confirm(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordConfirmRequest>,
) -> GateResult<Json<Value>> {
    ctx.accounts
        .confirm_password_reset(&req.token, &req.password, &req.retype_password)
        .await?;
    Ok(Json(json!({ "detail": "Password Changed Successfully" })))
}
