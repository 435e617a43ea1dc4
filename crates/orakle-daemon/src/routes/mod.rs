pub mod capabilities;
pub mod chat;
pub mod config;
pub mod hardware;
pub mod health;
pub mod providers;
pub mod test_llm;
pub mod test_skill_key;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::state::AppState;

/// Assemble the façade's router: every route requires a bearer token
/// except `/health`, which stays public for the supervisor's own polling
/// and external liveness checks — grounded on the teacher's
/// `gateway::daemon::start_gateway` public/protected router split.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/framework/chat", post(chat::chat))
        .route("/config", get(config::get_config).put(config::put_config))
        .route("/config/defaults", get(config::get_config_defaults))
        .route("/providers", get(providers::providers))
        .route("/test-llm", post(test_llm::test_llm))
        .route("/test-skill-key", post(test_skill_key::test_skill_key))
        .route("/capabilities", get(capabilities::capabilities))
        .route("/hardware/acceleration", get(hardware::hardware_acceleration))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(state);

    let public = Router::new().route("/health", get(health::health));

    Router::new().merge(public).merge(protected).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http())
}
