pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;
pub use api::AppState;

// Export logic types
pub use logic::{AssociationLinkManager, PropertyOutcome, PropertyResolver, RatingService, RawOutcome};

// Export all model types
pub use model::*;

pub use error::{AirVinylError, AirVinylResult};

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

/// Build the service: router with state and trailing-slash normalisation.
pub fn build_app<S: Store + 'static>(
    store: std::sync::Arc<S>,
    odata: config::ODataConfig,
) -> tower_http::normalize_path::NormalizePath<axum::Router> {
    use tower::Layer;

    let router = routes::create_router::<S>(&odata).with_state(AppState::new(store, odata));
    tower_http::normalize_path::NormalizePathLayer::trim_trailing_slash().layer(router)
}

/// Serve the app on an already bound listener until the server stops
pub async fn serve_app<S: Store + 'static>(
    listener: tokio::net::TcpListener,
    store: std::sync::Arc<S>,
    odata: config::ODataConfig,
) -> anyhow::Result<()> {
    use axum::{extract::Request, ServiceExt};

    let app = build_app(store, odata);
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await?;

    Ok(())
}
