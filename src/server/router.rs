//! HTTP router assembly

use super::host::ServerHost;
use crate::orders::handlers::order_routes;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the full application router from a host
///
/// - `/health`, `/healthz`
/// - `/orders/...`
/// - uploaded proofs under the configured public prefix (`/images`)
/// - custom routes, merged last
pub fn build_router(host: &ServerHost, custom_routes: Vec<Router>) -> Router {
    let uploads = &host.config.uploads;

    let mut app = health_routes()
        .merge(order_routes(host.api_state()))
        .nest_service(&uploads.public_prefix, ServeDir::new(&uploads.directory));

    for custom_router in custom_routes {
        app = app.merge(custom_router);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "jrmart",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
