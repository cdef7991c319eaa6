use veriscan_api::setup;
use veriscan_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    let (state, replication, router) = setup::initialize_app(config.clone()).await?;

    setup::server::start_server(&config, router).await?;

    // Stop background workers once the listener has drained.
    state.event_queue.shutdown().await;
    if let Some(handle) = replication {
        handle.shutdown().await;
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,veriscan=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.is_production() {
        builder.json().init();
    } else {
        builder.init();
    }
}
