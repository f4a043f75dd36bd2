pub mod api;
pub mod config;
pub mod connector;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export connector types
pub use connector::{
    request_cache, request_cache_layer, AppConnector, ApplicationNode, Client, ConnectorError,
    FieldValue, Fetcher, HttpFetcher, InstanceProxy, ModelConnector, PagedSequence,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, ModelStore};

/// Start a directory server from configuration, for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = crate::config::AppConfig::load()?;

    let store = Arc::new(MemoryStore::new());
    crate::seed::load_seed_data(&*store).await?;

    let state = crate::api::handlers::ServerState::new(store, config.server.page_size);
    let app = crate::api::routes::create_router().with_state(state);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("slumber directory listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
