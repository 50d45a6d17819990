mod filter;

pub use filter::{ConfigError, FilterConfig};

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

use crate::visitor::marker::{MarkerExpiry, MarkerPolicy, DEFAULT_MARKER_NAME};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub geoip: GeoIpConfig,
    pub filter: FilterSource,
    pub gate: GateConfig,
    pub marker: MarkerPolicy,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct GeoIpConfig {
    /// Path to a GeoLite2/GeoIP2 Country or City .mmdb file
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FilterSource {
    /// Policy file; when unset every denylist is empty
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Redirect target for denied visitors: a 303 from `protect`, a header on `/auth`
    pub deny_redirect_url: Option<String>,
    /// Mark the visit cookie `Secure`
    pub cookie_secure: bool,
}

impl FilterSource {
    pub fn load(&self) -> Result<FilterConfig, ConfigError> {
        match &self.path {
            Some(path) => FilterConfig::from_file(path),
            None => {
                tracing::warn!("VF_FILTER_CONFIG is not set, every visitor will be allowed");
                Ok(FilterConfig::default())
            }
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("VF_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("VF_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("VF_PORT must be a port number")?;

        let db_path = std::env::var("VF_GEOIP_DB_PATH").ok().map(PathBuf::from);
        let filter_path = std::env::var("VF_FILTER_CONFIG").ok().map(PathBuf::from);
        let deny_redirect_url = std::env::var("VF_DENY_REDIRECT_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let cookie_secure = std::env::var("VF_COOKIE_SECURE")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let marker_name =
            std::env::var("VF_MARKER_NAME").unwrap_or_else(|_| DEFAULT_MARKER_NAME.to_string());

        let expiry = match std::env::var("VF_MARKER_MAX_AGE_SECS").ok() {
            Some(secs) => {
                let secs = secs
                    .parse::<u64>()
                    .context("VF_MARKER_MAX_AGE_SECS must be a number of seconds")?;
                MarkerExpiry::MaxAge(Duration::from_secs(secs))
            }
            None => MarkerExpiry::Session,
        };
        let marker = MarkerPolicy::new(marker_name, expiry)
            .context("VF_MARKER_NAME must be a valid cookie name")?;

        Ok(Config {
            server: ServerConfig { host, port },
            geoip: GeoIpConfig { db_path },
            filter: FilterSource { path: filter_path },
            gate: GateConfig {
                deny_redirect_url,
                cookie_secure,
            },
            marker,
        })
    }
}
