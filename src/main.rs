/// Tandem - interaction engine server
///
/// Serves the like / pass / match / notification API over HTTP and runs the
/// background reconciliation and retention jobs.
use std::sync::Arc;
use tandem::{context::AppContext, error::EngineResult, jobs, server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> EngineResult<()> {
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    print_banner();

    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ______                __
 /_  __/___ _____  ____/ /__  ____ ___
  / / / __ `/ __ \/ __  / _ \/ __ `__ \
 / / / /_/ / / / / /_/ /  __/ / / / / /
/_/  \__,_/_/ /_/\__,_/\___/_/ /_/ /_/

        Interaction Engine v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
