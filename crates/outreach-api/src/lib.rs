//! HTTP control surface for the campaign dispatch engine.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the application router. Middleware layers are added by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/campaigns", routes::campaigns::router())
        .nest("/api/v1/channels", routes::channels::router())
        .nest("/api/v1/contact-lists", routes::contact_lists::router())
        .with_state(state)
}
