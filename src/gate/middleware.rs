use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::handlers::{filter_failure, run_filter, with_set_cookies, GateOutcome, GateState};

/// Let allowed visitors through to the inner service; answer everyone else
/// with the deny action.
pub async fn visitor_gate(
    State(state): State<Arc<GateState>>,
    request: Request,
    next: Next,
) -> Response {
    let GateOutcome {
        result,
        set_cookies,
    } = run_filter(&state, &request);

    let allowed = match result {
        Ok(evaluation) => evaluation.verdict.allowed,
        Err(_) => return filter_failure(),
    };

    let response = if allowed {
        next.run(request).await
    } else {
        state.deny_response()
    };

    with_set_cookies(response, set_cookies)
}
