//! Allow/deny evaluation
//!
//! [`evaluate`] is a pure function of the policy and the visitor. The one
//! side effect of the policy, refreshing the repeat-visit marker, comes back
//! as [`Verdict::mark_visitor`] for the caller to apply.

use serde::Serialize;
use std::fmt;

use crate::config::FilterConfig;
use crate::visitor::VisitorContext;

/// A rule that matched the visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DenyReason {
    Country { country: String },
    IpAddress { ip: String },
    Language { language: String },
    Referer { referer: String, pattern: String },
    RepeatVisit,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Country { country } => write!(f, "country {country} is disallowed"),
            DenyReason::IpAddress { ip } => write!(f, "IP address {ip} is disallowed"),
            DenyReason::Language { language } => write!(f, "language {language} is disallowed"),
            DenyReason::Referer { referer, pattern } => {
                write!(f, "referer {referer} contains disallowed '{pattern}'")
            }
            DenyReason::RepeatVisit => write!(f, "visitor was here before"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    /// Every rule that matched, in evaluation order
    pub denied_by: Vec<DenyReason>,
    /// Write the repeat-visit marker for future requests
    pub mark_visitor: bool,
}

impl Verdict {
    /// The global override: allowed, no rule consulted, no side effect.
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            denied_by: Vec::new(),
            mark_visitor: false,
        }
    }
}

/// Evaluate the policy against one visitor.
///
/// Country, IP and language match exactly (case-sensitive); referer entries
/// match as substrings. Absent attributes never match. Once denied, no later
/// rule allows again.
pub fn evaluate(config: &FilterConfig, context: &VisitorContext) -> Verdict {
    if config.allow_to_all() {
        return Verdict::allow_all();
    }

    let mut denied_by = Vec::new();

    if let Some(country) = &context.country_iso_code {
        if config.disallowed_countries().contains(country) {
            denied_by.push(DenyReason::Country {
                country: country.clone(),
            });
        }
    }

    if let Some(ip) = &context.ip {
        if config.disallowed_ip_addresses().contains(ip) {
            denied_by.push(DenyReason::IpAddress { ip: ip.clone() });
        }
    }

    if let Some(language) = &context.language {
        if config.disallowed_languages().contains(language) {
            denied_by.push(DenyReason::Language {
                language: language.clone(),
            });
        }
    }

    if let Some(referer) = &context.http_referer {
        // An empty pattern would match every referer.
        let matched = config
            .disallowed_referers()
            .iter()
            .find(|pattern| !pattern.is_empty() && referer.contains(pattern.as_str()));
        if let Some(pattern) = matched {
            denied_by.push(DenyReason::Referer {
                referer: referer.clone(),
                pattern: pattern.clone(),
            });
        }
    }

    let mut mark_visitor = false;
    if config.disallow_if_visitor_was_here() {
        if context.was_here_before {
            denied_by.push(DenyReason::RepeatVisit);
        }
        mark_visitor = true;
    }

    Verdict {
        allowed: denied_by.is_empty(),
        denied_by,
        mark_visitor,
    }
}
