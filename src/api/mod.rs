pub mod auth;
pub mod cookies;
pub mod middleware;

use crate::context::AppContext;
use axum::Router;

/// Compose all API routes
pub fn routes() -> Router<AppContext> {
    Router::new().merge(auth::routes())
}
