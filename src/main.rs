use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asset_processing_worker::config::Config;
use asset_processing_worker::supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "asset_processing_worker=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        api_base_url = %config.api_base_url,
        max_num_workers = config.max_num_workers,
        temp_dir = %config.temp_dir.display(),
        "starting asset processing worker"
    );

    supervisor::run(config).await
}
