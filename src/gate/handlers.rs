use axum::{
    extract::{connect_info::ConnectInfo, Request, State},
    http::{header::SET_COOKIE, Extensions, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;

use crate::filter::{Evaluation, FilterError, VisitorFilter};
use crate::visitor::{CookieMarkers, RequestSignals};

/// Carries the redirect target on a denied `/auth` answer. A proxy picks it
/// up with `auth_request_set $deny_to $upstream_http_x_visitor_filter_redirect;`.
pub const DENY_REDIRECT_HEADER: HeaderName = HeaderName::from_static("x-visitor-filter-redirect");

/// What a denied visitor gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyAction {
    Forbidden,
    /// 303 See Other to this location from `protect`; `/auth` answers 403
    /// and names the location in [`DENY_REDIRECT_HEADER`].
    Redirect(String),
}

pub struct GateState {
    pub filter: Arc<VisitorFilter>,
    pub deny: DenyAction,
    pub cookie_secure: bool,
}

impl GateState {
    pub fn new(filter: Arc<VisitorFilter>) -> Self {
        Self {
            filter,
            deny: DenyAction::Forbidden,
            cookie_secure: false,
        }
    }

    /// Deny response for routes behind `protect`.
    pub(crate) fn deny_response(&self) -> Response {
        match &self.deny {
            DenyAction::Forbidden => forbidden(),
            DenyAction::Redirect(location) => Redirect::to(location).into_response(),
        }
    }

    /// Deny response for an `auth_request` subrequest. Proxies only act on
    /// 2xx, 401 and 403 there, so a redirect is passed as a header.
    pub(crate) fn auth_deny_response(&self) -> Response {
        let mut response = forbidden();
        if let DenyAction::Redirect(location) = &self.deny {
            match HeaderValue::from_str(location) {
                Ok(value) => {
                    response.headers_mut().insert(DENY_REDIRECT_HEADER, value);
                }
                Err(err) => warn!(error = %err, "deny redirect URL is not a valid header value"),
            }
        }
        response
    }
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Access denied").into_response()
}

/// Outcome of filtering one request, plus the cookies it wants to set.
pub(crate) struct GateOutcome {
    pub result: Result<Evaluation, FilterError>,
    pub set_cookies: Vec<String>,
}

pub(crate) fn run_filter(state: &GateState, request: &Request) -> GateOutcome {
    let signals = RequestSignals::from_headers(request.headers(), remote_ip(request.extensions()));
    let mut markers = CookieMarkers::from_headers(request.headers()).secure(state.cookie_secure);

    let result = state.filter.evaluate_request(&signals, &mut markers);

    GateOutcome {
        result,
        set_cookies: markers.into_set_cookie_headers(),
    }
}

fn remote_ip(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

pub(crate) fn with_set_cookies(mut response: Response, set_cookies: Vec<String>) -> Response {
    for cookie in set_cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "dropping unrepresentable Set-Cookie value"),
        }
    }
    response
}

pub(crate) fn filter_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Visitor could not be evaluated",
    )
        .into_response()
}

/// `auth_request` style check: 204 when allowed, 403 otherwise.
pub async fn auth_request(State(state): State<Arc<GateState>>, request: Request) -> Response {
    let GateOutcome {
        result,
        set_cookies,
    } = run_filter(&state, &request);

    let response = match result {
        Ok(evaluation) if evaluation.verdict.allowed => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => state.auth_deny_response(),
        Err(_) => return filter_failure(),
    };

    with_set_cookies(response, set_cookies)
}

/// Report the verdict and resolved context as JSON.
pub async fn check_visitor(State(state): State<Arc<GateState>>, request: Request) -> Response {
    let GateOutcome {
        result,
        set_cookies,
    } = run_filter(&state, &request);

    match result {
        Ok(evaluation) => with_set_cookies(Json(evaluation).into_response(), set_cookies),
        Err(_) => filter_failure(),
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
