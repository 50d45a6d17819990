//! Client IP resolution from forwarding variables
//!
//! Unlike a trust-validated extractor, this follows the fixed precedence the
//! filter policy is written against: the first non-empty forwarding variable
//! wins, `REMOTE_ADDR` is the last resort, and a forwarding chain yields its
//! leftmost (client-most) entry.

use super::signals::{
    RequestSignals, HTTP_CLIENT_IP, HTTP_FORWARDED, HTTP_FORWARDED_FOR, HTTP_X_FORWARDED,
    HTTP_X_FORWARDED_FOR, REMOTE_ADDR,
};

/// Forwarding variables in precedence order.
pub const IP_PRECEDENCE: [&str; 5] = [
    HTTP_CLIENT_IP,
    HTTP_X_FORWARDED_FOR,
    HTTP_X_FORWARDED,
    HTTP_FORWARDED_FOR,
    HTTP_FORWARDED,
];

/// Best-guess client IP as it appears in the request, not parsed.
///
/// Returns `None` when no variable carries a non-blank value.
pub fn resolve_ip(signals: &RequestSignals) -> Option<String> {
    let raw = IP_PRECEDENCE
        .iter()
        .filter_map(|name| signals.var(name))
        .find(|value| !value.is_empty())
        .or_else(|| signals.var(REMOTE_ADDR))?;

    let first = raw.split(',').next().unwrap_or(raw).trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
