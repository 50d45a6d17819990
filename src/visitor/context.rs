use serde::Serialize;
use std::net::IpAddr;
use tracing::debug;

use super::ip::resolve_ip;
use super::marker::{MarkerPolicy, MarkerStore};
use super::signals::{RequestSignals, HTTP_ACCEPT_LANGUAGE, HTTP_REFERER};
use crate::geoip::{CountryLookup, GeoIpError};

/// Leading characters of Accept-Language kept as the visitor language ("en-US").
pub const LANGUAGE_PREFIX_CHARS: usize = 5;

/// Snapshot of one visitor, resolved once per evaluation.
///
/// Every attribute is optional; an absent attribute disables the rules that
/// depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisitorContext {
    pub ip: Option<String>,
    pub country_iso_code: Option<String>,
    pub language: Option<String>,
    pub http_referer: Option<String>,
    pub was_here_before: bool,
}

impl VisitorContext {
    /// Resolve a context from request signals.
    ///
    /// Missing or garbled signals degrade to absent attributes. The only error
    /// is a fault inside the geolocation database, which the caller must not
    /// mistake for "country unknown".
    pub fn resolve(
        signals: &RequestSignals,
        geoip: &dyn CountryLookup,
        markers: &dyn MarkerStore,
        marker: &MarkerPolicy,
    ) -> Result<Self, GeoIpError> {
        let ip = resolve_ip(signals);
        let country_iso_code = match ip.as_deref() {
            Some(ip) => resolve_country(ip, geoip)?,
            None => None,
        };

        Ok(Self {
            ip,
            country_iso_code,
            language: resolve_language(signals),
            http_referer: non_empty(signals.var(HTTP_REFERER)),
            was_here_before: marker.was_here(markers),
        })
    }
}

fn resolve_country(ip: &str, geoip: &dyn CountryLookup) -> Result<Option<String>, GeoIpError> {
    let Ok(addr) = ip.parse::<IpAddr>() else {
        debug!(ip = %ip, "client IP is not an address, skipping country lookup");
        return Ok(None);
    };

    let country = geoip.lookup_country(addr)?;
    if country.is_none() {
        debug!(ip = %addr, "address not found in GeoIP database");
    }
    Ok(country)
}

fn resolve_language(signals: &RequestSignals) -> Option<String> {
    let accept_language = signals.var(HTTP_ACCEPT_LANGUAGE)?;
    let language: String = accept_language.chars().take(LANGUAGE_PREFIX_CHARS).collect();
    if language.is_empty() {
        None
    } else {
        Some(language)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}
