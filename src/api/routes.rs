use axum::{routing::get, Router};

use crate::api::handlers::{self, AppState};
use crate::config::ODataConfig;
use crate::store::traits::Store;

/// OData paths such as `People(7)/Friends(3)/$ref` cannot be expressed as
/// path templates, so everything below the route prefix goes through one
/// wildcard route per method and is dispatched on the parsed `Resource`.
pub fn create_router<S: Store + 'static>(odata: &ODataConfig) -> Router<AppState<S>> {
    let root = odata.route_path();

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Service document
        .route(&root, get(handlers::service_document::<S>))
        .route(
            &format!("{}/*resource", root),
            get(handlers::dispatch_get::<S>)
                .post(handlers::dispatch_post::<S>)
                .put(handlers::dispatch_put::<S>)
                .patch(handlers::dispatch_patch::<S>)
                .delete(handlers::dispatch_delete::<S>),
        )
}
