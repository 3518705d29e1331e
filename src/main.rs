use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use hybrid_query_backend::api;
use hybrid_query_backend::api::handlers::AppState;
use hybrid_query_backend::config::{Config, LoggingConfig};
use hybrid_query_backend::services::database::{create_adapter, DatabaseType};
use hybrid_query_backend::services::{
    mask_credentials, ConnectionPoolManager, DatabaseCatalog, ModelHandles, QueryPipeline,
    QueryService, SchemaCatalog, SessionManager,
};
use hybrid_query_backend::storage::SqliteStorage;

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let ansi = match logging.style.as_str() {
        "never" => false,
        "always" => true,
        _ => std::io::IsTerminal::is_terminal(&std::io::stdout()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging depends on configuration, so a config error goes to stderr
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    init_logging(&config.logging);

    info!("Starting server on {}", config.server_address());

    // Turn log
    let storage = Arc::new(SqliteStorage::new(&config.storage.url).await.map_err(|e| {
        error!("Failed to initialize turn log: {}", e);
        e
    })?);

    // Data store
    let db_type = DatabaseType::from_str(&config.datastore.kind)?;
    let pool_manager = Arc::new(ConnectionPoolManager::new(config.datastore.max_pool_size));
    let adapter = create_adapter(
        db_type,
        &config.datastore.url,
        pool_manager.clone(),
        config.datastore.query_timeout_secs,
    )
    .await?;
    info!(
        "Using {} data store at {}",
        db_type.as_str(),
        mask_credentials(&config.datastore.url)
    );
    if let Err(e) = adapter.test_connection().await {
        warn!("Data store is not reachable yet: {}", e);
    }

    // Catalog
    let mut catalog = DatabaseCatalog::new(adapter.clone(), config.catalog.cache_ttl_secs);
    if let Some(path) = &config.catalog.descriptions_path {
        let descriptions = DatabaseCatalog::load_descriptions(Path::new(path))?;
        info!("Loaded {} table descriptions from {}", descriptions.len(), path);
        catalog = catalog.with_descriptions(descriptions);
    }
    let catalog: Arc<dyn SchemaCatalog> = Arc::new(catalog);

    // Pipeline and sessions
    let models = ModelHandles::from_config(&config.llm);
    info!(
        "Models: primary {}, secondary {} via {}",
        config.llm.primary_model, config.llm.secondary_model, config.llm.gateway_url
    );
    let query_service = Arc::new(QueryService::new(
        adapter.clone(),
        &config.datastore,
        &config.validation,
    ));
    let pipeline = Arc::new(QueryPipeline::new(
        models,
        adapter.clone(),
        catalog,
        query_service,
        &config.search,
        config.datastore.query_timeout_secs,
    ));
    let sessions = Arc::new(SessionManager::new(pipeline, storage));

    let state = AppState {
        sessions,
        adapter,
        pool_manager,
        config: config.clone(),
    };
    let app: Router = api::routes::create_router_with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
