use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use std::net::IpAddr;
use tracing::{debug, error, warn};

use super::engine::{evaluate, Verdict};
use crate::config::{ConfigError, FilterConfig};
use crate::geoip::{CountryLookup, GeoIpError};
use crate::visitor::{MarkerPolicy, MarkerStore, RequestSignals, VisitorContext};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("could not resolve visitor country")]
    Geolocation(#[from] GeoIpError),
}

/// Verdict together with the context it was computed from.
///
/// `context` is `None` when the global override skipped resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    #[serde(flatten)]
    pub verdict: Verdict,
    pub context: Option<VisitorContext>,
}

/// A policy bound to its geolocation capability and marker settings.
///
/// Immutable once built; share one instance (`Arc<VisitorFilter>`) across
/// every request.
pub struct VisitorFilter {
    config: FilterConfig,
    geoip: Arc<dyn CountryLookup>,
    marker: MarkerPolicy,
}

impl VisitorFilter {
    pub fn new(config: FilterConfig, geoip: Arc<dyn CountryLookup>) -> Self {
        Self {
            config,
            geoip,
            marker: MarkerPolicy::default(),
        }
    }

    pub fn from_map(
        map: &Map<String, Value>,
        geoip: Arc<dyn CountryLookup>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(FilterConfig::from_map(map)?, geoip))
    }

    pub fn with_marker_policy(mut self, marker: MarkerPolicy) -> Self {
        self.marker = marker;
        self
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn marker_policy(&self) -> &MarkerPolicy {
        &self.marker
    }

    /// Resolve the visitor's context.
    ///
    /// A geolocation fault is an error only when the policy has country
    /// rules; otherwise the country is left absent.
    pub fn resolve_context(
        &self,
        signals: &RequestSignals,
        markers: &dyn MarkerStore,
    ) -> Result<VisitorContext, FilterError> {
        let resolved = if self.config.needs_geolocation() {
            VisitorContext::resolve(signals, self.geoip.as_ref(), markers, &self.marker)
        } else {
            let lookup = FailSoft(self.geoip.as_ref());
            VisitorContext::resolve(signals, &lookup, markers, &self.marker)
        };

        resolved.map_err(|err| {
            error!(error = %err, "GeoIP lookup failed, refusing to evaluate visitor");
            FilterError::from(err)
        })
    }

    /// Evaluate an already resolved visitor and apply the marker side effect.
    pub fn check(&self, context: &VisitorContext, markers: &mut dyn MarkerStore) -> Verdict {
        let verdict = evaluate(&self.config, context);

        for reason in &verdict.denied_by {
            debug!(ip = ?context.ip, reason = %reason, "visitor denied");
        }

        if verdict.mark_visitor {
            self.marker.mark_visited(markers);
        }

        verdict
    }

    /// Resolve the visitor from `signals` and evaluate it.
    pub fn evaluate_request(
        &self,
        signals: &RequestSignals,
        markers: &mut dyn MarkerStore,
    ) -> Result<Evaluation, FilterError> {
        if self.config.allow_to_all() {
            return Ok(Evaluation {
                verdict: Verdict::allow_all(),
                context: None,
            });
        }

        let context = self.resolve_context(signals, markers)?;
        let verdict = self.check(&context, markers);
        Ok(Evaluation {
            verdict,
            context: Some(context),
        })
    }

    /// Single entry point: is this request allowed?
    pub fn is_allow(
        &self,
        signals: &RequestSignals,
        markers: &mut dyn MarkerStore,
    ) -> Result<bool, FilterError> {
        Ok(self.evaluate_request(signals, markers)?.verdict.allowed)
    }

    /// Expire the repeat-visit marker.
    pub fn forget_visitor(&self, markers: &mut dyn MarkerStore) {
        self.marker.clear_visited_marker(markers);
    }
}

/// Country lookup for policies without country rules: faults are logged
/// and reported as "not found".
struct FailSoft<'a>(&'a dyn CountryLookup);

impl CountryLookup for FailSoft<'_> {
    fn lookup_country(&self, ip: IpAddr) -> Result<Option<String>, GeoIpError> {
        self.0.lookup_country(ip).or_else(|err| {
            warn!(error = %err, "GeoIP lookup failed, continuing without a country");
            Ok(None)
        })
    }
}
