use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use authgate_auth::auth_routes;
use serde_json::{json, Value};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(auth_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        .with_state(state)
}

/// Lists the registered providers and their login routes.
async fn index(State(state): State<AppState>) -> Json<Value> {
    let providers: Vec<Value> = state
        .providers
        .iter()
        .map(|name| json!({ "name": name, "login": format!("/auth/{name}") }))
        .collect();

    Json(json!({ "providers": providers }))
}

async fn health() -> &'static str {
    "OK"
}
