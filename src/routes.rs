use crate::api;
use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub const ROUTER_PATH: &str = "/api/tasks";

pub fn map_routes(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route(ROUTER_PATH, get(api::tasks_for_day))
        .route(format!("{}/status", ROUTER_PATH).as_str(), get(api::daily_statuses))
        .route(format!("{}/freq", ROUTER_PATH).as_str(), get(api::weekly_frequency))
        .route(format!("{}/update", ROUTER_PATH).as_str(), post(api::set_status))
        .route(format!("{}/create", ROUTER_PATH).as_str(), post(api::create_task))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
