use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use visitor_filter::config::Config;
use visitor_filter::gate::{create_gate_router, DenyAction, GateState};
use visitor_filter::{geoip, VisitorFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    let filter_config = config
        .filter
        .load()
        .context("failed to load filter policy")?;
    info!(
        allow_to_all = filter_config.allow_to_all(),
        countries = filter_config.disallowed_countries().len(),
        languages = filter_config.disallowed_languages().len(),
        referers = filter_config.disallowed_referers().len(),
        ip_addresses = filter_config.disallowed_ip_addresses().len(),
        repeat_visits = filter_config.disallow_if_visitor_was_here(),
        "Loaded filter policy"
    );

    // Open the GeoIP database once; a broken database stops startup
    let lookup = geoip::lookup_for(
        config.geoip.db_path.as_deref(),
        filter_config.needs_geolocation(),
    )
    .context("failed to initialize GeoIP lookup")?;

    let filter = Arc::new(
        VisitorFilter::new(filter_config, lookup).with_marker_policy(config.marker.clone()),
    );

    let deny = match config.gate.deny_redirect_url.clone() {
        Some(url) => {
            info!("Denied visitors are redirected to {} (/auth names it in a header)", url);
            DenyAction::Redirect(url)
        }
        None => DenyAction::Forbidden,
    };

    let state = Arc::new(GateState {
        filter,
        deny,
        cookie_secure: config.gate.cookie_secure,
    });
    let router = create_gate_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Gate listening on http://{}", addr);
    info!("   - auth subrequests at http://{}/auth", addr);
    info!("   - verdict inspection at http://{}/check", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
