use gatehouse::{config::ServerConfig, context::AppContext, error::GateResult, jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> GateResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenv::dotenv().ok();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______      __       __
  / ____/___ _/ /____  / /_  ____  __  __________
 / / __/ __ `/ __/ _ \/ __ \/ __ \/ / / / ___/ _ \
/ /_/ / /_/ / /_/  __/ / / / /_/ / /_/ (__  )  __/
\____/\__,_/\__/\___/_/ /_/\____/\__,_/____/\___/

        Credential & Session Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
