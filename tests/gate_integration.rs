//! Gate integration tests
//!
//! These tests drive the HTTP gate end to end: headers and the socket peer
//! become request signals, the filter decides, and the marker cookie comes
//! back on the response.

use axum::{
    body::Body,
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, ServiceExt};
use visitor_filter::gate::{
    create_gate_router, protect, DenyAction, GateState, DENY_REDIRECT_HEADER,
};
use visitor_filter::geoip::{CountryLookup, GeoIpError};
use visitor_filter::{FilterConfig, VisitorFilter};

/// Geolocation backed by a fixed table
struct TableLookup(HashMap<IpAddr, &'static str>);

impl CountryLookup for TableLookup {
    fn lookup_country(&self, ip: IpAddr) -> Result<Option<String>, GeoIpError> {
        Ok(self.0.get(&ip).map(|c| c.to_string()))
    }
}

fn table_lookup() -> Arc<TableLookup> {
    Arc::new(TableLookup(HashMap::from([
        ("127.0.0.1".parse().unwrap(), "ZZ"),
        ("8.8.8.8".parse().unwrap(), "US"),
        ("77.88.8.8".parse().unwrap(), "RU"),
    ])))
}

fn gate_state(config: FilterConfig) -> Arc<GateState> {
    let filter = Arc::new(VisitorFilter::new(config, table_lookup()));
    Arc::new(GateState::new(filter))
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));

        self.inner.call(req)
    }
}

fn gate_app(state: Arc<GateState>) -> Router {
    create_gate_router(state).layer(TestConnectInfoLayer)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_is_never_filtered() {
    let app = gate_app(gate_state(
        FilterConfig::default().with_disallowed_ip_addresses(["127.0.0.1"]),
    ));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "OK" }));
}

#[tokio::test]
async fn test_auth_allows_unlisted_visitor() {
    let app = gate_app(gate_state(
        FilterConfig::default()
            .with_disallowed_countries(["US"])
            .with_disallowed_languages(["en-US"])
            .with_disallowed_referers(["google.com"]),
    ));

    let request = Request::builder()
        .uri("/auth")
        .header("x-forwarded-for", "77.88.8.8, 10.0.0.1")
        .header("accept-language", "ru-RU,ru;q=0.9")
        .header("referer", "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_auth_denies_disallowed_country() {
    let app = gate_app(gate_state(
        FilterConfig::default().with_disallowed_countries(["US"]),
    ));

    let request = Request::builder()
        .uri("/auth")
        .header("client-ip", "8.8.8.8")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_auth_uses_socket_peer_without_forwarding_headers() {
    let app = gate_app(gate_state(
        FilterConfig::default().with_disallowed_ip_addresses(["127.0.0.1"]),
    ));

    let request = Request::builder()
        .uri("/auth")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_auth_denies_referer_substring() {
    let app = gate_app(gate_state(
        FilterConfig::default().with_disallowed_referers(["google.com"]),
    ));

    let request = Request::builder()
        .uri("/auth")
        .header("referer", "https://www.google.com/search?q=x")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

fn redirecting_state(config: FilterConfig) -> Arc<GateState> {
    let filter = Arc::new(VisitorFilter::new(config, table_lookup()));
    Arc::new(GateState {
        filter,
        deny: DenyAction::Redirect("https://example.com/unavailable".to_string()),
        cookie_secure: false,
    })
}

#[tokio::test]
async fn test_auth_passes_redirect_target_in_header() {
    let state = redirecting_state(FilterConfig::default().with_disallowed_languages(["en-US"]));

    let request = Request::builder()
        .uri("/auth")
        .header("accept-language", "en-US,en;q=0.5")
        .body(Body::empty())
        .unwrap();
    let response = gate_app(state).oneshot(request).await.unwrap();

    // Proxies only understand 2xx, 401 and 403 from an auth subrequest
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(LOCATION).is_none());
    assert_eq!(
        response.headers().get(DENY_REDIRECT_HEADER).unwrap(),
        "https://example.com/unavailable"
    );
}

#[tokio::test]
async fn test_auth_allowed_has_no_redirect_header() {
    let state = redirecting_state(FilterConfig::default().with_disallowed_languages(["en-US"]));

    let request = Request::builder()
        .uri("/auth")
        .header("accept-language", "fr-FR")
        .body(Body::empty())
        .unwrap();
    let response = gate_app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().get(DENY_REDIRECT_HEADER).is_none());
}

#[tokio::test]
async fn test_protect_redirects_denied_visitor() {
    let state = redirecting_state(FilterConfig::default().with_disallowed_languages(["en-US"]));
    let app = protect(
        Router::new().route("/page", get(|| async { "welcome" })),
        state,
    )
    .layer(TestConnectInfoLayer);

    let request = Request::builder()
        .uri("/page")
        .header("accept-language", "en-US,en;q=0.5")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).unwrap(),
        "https://example.com/unavailable"
    );
}

#[tokio::test]
async fn test_repeat_visitor_is_marked_then_denied() {
    let state = gate_state(FilterConfig::default().with_disallow_if_visitor_was_here(true));

    // First visit: allowed, marker set
    let request = Request::builder()
        .uri("/auth")
        .body(Body::empty())
        .unwrap();
    let response = gate_app(state.clone()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("_vf_visitor_was_here=1;"));

    // Second visit carries the marker: denied, marker refreshed
    let request = Request::builder()
        .uri("/auth")
        .header(COOKIE, "_vf_visitor_was_here=1")
        .body(Body::empty())
        .unwrap();
    let response = gate_app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(set_cookies(&response).len(), 1);
}

#[tokio::test]
async fn test_secure_marker_cookie() {
    let filter = Arc::new(VisitorFilter::new(
        FilterConfig::default().with_disallow_if_visitor_was_here(true),
        table_lookup(),
    ));
    let state = Arc::new(GateState {
        filter,
        deny: DenyAction::Forbidden,
        cookie_secure: true,
    });

    let request = Request::builder()
        .uri("/auth")
        .body(Body::empty())
        .unwrap();
    let response = gate_app(state).oneshot(request).await.unwrap();

    assert!(set_cookies(&response)[0].contains("; Secure"));
}

#[tokio::test]
async fn test_check_reports_context_and_reasons() {
    let app = gate_app(gate_state(
        FilterConfig::default()
            .with_disallowed_countries(["US"])
            .with_disallowed_referers(["google."]),
    ));

    let request = Request::builder()
        .uri("/check")
        .header("x-forwarded-for", "8.8.8.8")
        .header("accept-language", "en-GB,en;q=0.8")
        .header("referer", "https://google.de/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["allowed"], json!(false));
    assert_eq!(
        body["context"],
        json!({
            "ip": "8.8.8.8",
            "country_iso_code": "US",
            "language": "en-GB",
            "http_referer": "https://google.de/",
            "was_here_before": false,
        })
    );
    let rules: Vec<&str> = body["denied_by"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["rule"].as_str().unwrap())
        .collect();
    assert_eq!(rules, vec!["country", "referer"]);
}

#[tokio::test]
async fn test_check_with_allow_to_all_has_no_context() {
    let app = gate_app(gate_state(
        FilterConfig::default()
            .with_allow_to_all(true)
            .with_disallowed_ip_addresses(["127.0.0.1"]),
    ));

    let request = Request::builder()
        .uri("/check")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    let body = json_body(response).await;
    assert_eq!(body["allowed"], json!(true));
    assert_eq!(body["context"], Value::Null);
}

/// Geolocation whose every lookup faults
struct BrokenLookup;

impl CountryLookup for BrokenLookup {
    fn lookup_country(&self, _ip: IpAddr) -> Result<Option<String>, GeoIpError> {
        Err(GeoIpError::Missing)
    }
}

#[tokio::test]
async fn test_lookup_fault_is_a_server_error() {
    let filter = Arc::new(VisitorFilter::new(
        FilterConfig::default().with_disallowed_countries(["US"]),
        Arc::new(BrokenLookup),
    ));
    let app = gate_app(Arc::new(GateState::new(filter)));

    let request = Request::builder()
        .uri("/auth")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_lookup_fault_without_country_rules_still_decides() {
    let filter = Arc::new(VisitorFilter::new(
        FilterConfig::default().with_disallowed_referers(["spam."]),
        Arc::new(BrokenLookup),
    ));
    let app = gate_app(Arc::new(GateState::new(filter)));

    let request = Request::builder()
        .uri("/auth")
        .header("referer", "https://spam.example/")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri("/auth")
        .header("referer", "https://example.org/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_underscore_header_cannot_spoof_forwarded_for() {
    let app = gate_app(gate_state(
        FilterConfig::default().with_disallowed_ip_addresses(["203.0.113.9"]),
    ));

    let request = Request::builder()
        .uri("/auth")
        .header("x-forwarded-for", "203.0.113.9")
        .header("x_forwarded_for", "198.51.100.1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_protect_wraps_application_routes() {
    let state = gate_state(FilterConfig::default().with_disallowed_languages(["de-DE"]));
    let app = protect(
        Router::new().route("/page", get(|| async { "welcome" })),
        state,
    )
    .layer(TestConnectInfoLayer);

    let request = Request::builder()
        .uri("/page")
        .header("accept-language", "fr-FR")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"welcome");

    let request = Request::builder()
        .uri("/page")
        .header("accept-language", "de-DE,de;q=0.9")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
