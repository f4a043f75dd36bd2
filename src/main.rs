use axum::serve;
use slumber::api::handlers::ServerState;
use slumber::api::routes::create_router;
use slumber::config::AppConfig;
use slumber::seed;
use slumber::store::MemoryStore;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}, page size {}",
        config.server.host,
        config.server.port,
        config.server.page_size
    );

    let store = Arc::new(MemoryStore::new());

    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        log::info!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
    } else {
        seed::load_models(&*store).await?;
    }

    let state = ServerState::new(store, config.server.page_size);
    run_server(create_router().with_state(state), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("slumber directory running on http://{}/slumber/", bind_address);

    serve(listener, app).await?;

    Ok(())
}
