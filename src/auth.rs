/// Authentication extractors and utilities
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::user::User,
    error::GateError,
    token::TokenClaims,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

/// Authenticated context - verifies the access token from the request
/// and loads the subject from the identity store
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: TokenClaims,
    pub user: User,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        // Bearer header first, then the access cookie
        let token = match extract_bearer_token(&parts.headers) {
            Some(token) => token,
            None => {
                let jar = CookieJar::from_headers(&parts.headers);
                jar.get(&state.config.cookies.access_name)
                    .map(|c| c.value().to_string())
                    .ok_or_else(|| {
                        GateError::TokenInvalid("Missing authorization".to_string())
                    })?
            }
        };

        let claims = state.accounts.token_service().verify_access(&token)?;

        let user = state
            .accounts
            .store()
            .get(claims.user_id()?)
            .await
            .map_err(|e| match e {
                GateError::NotFound(_) => GateError::TokenInvalid("unknown subject".to_string()),
                other => other,
            })?;

        if !user.is_active {
            return Err(GateError::AccountDisabled);
        }

        Ok(AuthContext { claims, user })
    }
}
