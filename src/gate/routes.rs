use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use super::handlers::{auth_request, check_visitor, health_check, GateState};
use super::middleware::visitor_gate;

pub fn create_gate_router(state: Arc<GateState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth", get(auth_request))
        .route("/check", get(check_visitor))
        .with_state(state)
}

/// Put every route of `router` behind the visitor filter.
pub fn protect(router: Router, state: Arc<GateState>) -> Router {
    router.layer(middleware::from_fn_with_state(state, visitor_gate))
}
