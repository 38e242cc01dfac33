use feed_dashboard_lib::error::AppError;
use feed_dashboard_lib::feed::types::StartFeedArgs;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();
    init_tracing();
    if !dotenv_loaded {
        tracing::debug!("no .env file found, using process environment");
    }

    let args = StartFeedArgs::from_env()?;
    feed_dashboard_lib::run(args).await
}
