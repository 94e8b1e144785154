/// Background maintenance tasks
use crate::config::AuthConfig;
use crate::context::AppContext;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Earliest `consumed_at` worth keeping. `consumed_token` holds jtis
/// from refresh tokens, reset/verify links, and step-up tickets, so
/// the retention must cover the longest of those lifetimes; anything
/// older fails expiry checks before the consumed-token lookup matters.
pub fn prune_cutoff(auth: &AuthConfig) -> DateTime<Utc> {
    let longest = auth
        .refresh_ttl_secs
        .max(auth.link_ttl_secs)
        .max(auth.step_up_ttl_secs);
    Utc::now() - ChronoDuration::seconds(longest + auth.leeway_secs as i64)
}

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");
        tokio::spawn(Self::consumed_token_prune_job(Arc::clone(&self)));
    }

    /// Prune consumed-token ids past any possible expiry (runs every hour)
    async fn consumed_token_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            let cutoff = prune_cutoff(&scheduler.context.config.auth);

            match scheduler
                .context
                .accounts
                .store()
                .prune_consumed_tokens(cutoff)
                .await
            {
                Ok(count) => {
                    if count > 0 {
                        info!("Pruned {} consumed token ids", count);
                    }
                }
                Err(e) => error!("Failed to prune consumed tokens: {}", e),
            }
        }
    }
}
