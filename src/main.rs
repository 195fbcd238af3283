use airvinyl_api::config::AppConfig;
use airvinyl_api::seed;
use airvinyl_api::store::{MemoryStore, PostgresStore, Store};
use airvinyl_api::serve_app;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info) // Default to Info for everything
        .filter_module("sqlx", LevelFilter::Warn) // Suppress sqlx Debug logs
        .parse_default_env() // RUST_LOG overrides
        .init();

    println!("AirVinyl: OData record collection service");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    match config.database_url() {
        Some(database_url) => {
            println!("Connecting to PostgreSQL...");
            let max_connections = config.database.max_connections.unwrap_or(20);
            let postgres_store = PostgresStore::new(&database_url, max_connections).await?;

            println!("Running database migrations...");
            postgres_store.migrate().await?;
            println!("Database ready");

            run_server(Arc::new(postgres_store), config).await
        }
        None => {
            println!("No database configured, using the in-memory store");
            run_server(Arc::new(MemoryStore::new()), config).await
        }
    }
}

async fn run_server<S: Store + 'static>(store: Arc<S>, config: AppConfig) -> anyhow::Result<()> {
    if config.database.load_seed_data {
        println!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
        println!("Seed data loaded successfully");
    }

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("AirVinyl server running on http://{}", bind_address);
    println!(
        "Service document available at http://{}{}",
        bind_address,
        config.odata.route_path()
    );

    serve_app(listener, store, config.odata).await
}
