use anyhow::Result;
use reel_server::{build_with_remote, connect_remote, Settings, DEFAULT_LOG_FILTER};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::from_env();
    let remote = connect_remote(&settings).await?;
    let app = build_with_remote(&settings, remote);

    app.listen(settings.addr()).await?;

    Ok(())
}
