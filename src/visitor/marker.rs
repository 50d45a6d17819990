//! Repeat-visit marker
//!
//! The marker is a single named value held by the client. [`MarkerStore`]
//! abstracts where it lives; [`CookieMarkers`] keeps it in a cookie.

use axum::http::{header::COOKIE, HeaderMap};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MARKER_NAME: &str = "_vf_visitor_was_here";

const MARKER_VALUE: &str = "1";

/// Lifetime of a written marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerExpiry {
    /// No explicit expiry; the client keeps it for its session.
    #[default]
    Session,
    MaxAge(Duration),
}

/// Client-held marker storage for one request.
///
/// `read` sees the state the client sent; `write` and `clear` take effect on
/// the response.
pub trait MarkerStore {
    /// True when the marker is present with a truthy value.
    fn read(&self, name: &str) -> bool;

    fn write(&mut self, name: &str, value: &str, expiry: MarkerExpiry);

    /// Expire the marker immediately.
    fn clear(&mut self, name: &str);
}

/// A marker value counts as set unless it is empty or `"0"`.
pub fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

/// Cookie names are RFC 7230 tokens.
pub fn is_valid_marker_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

/// RFC 6265 cookie-octets, unquoted.
fn is_valid_cookie_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a valid marker name")]
pub struct InvalidMarkerName(pub String);

/// Name and lifetime of the repeat-visit marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPolicy {
    name: String,
    expiry: MarkerExpiry,
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self {
            name: DEFAULT_MARKER_NAME.to_string(),
            expiry: MarkerExpiry::Session,
        }
    }
}

impl MarkerPolicy {
    /// The name must be a cookie token (see [`is_valid_marker_name`]).
    pub fn new(name: impl Into<String>, expiry: MarkerExpiry) -> Result<Self, InvalidMarkerName> {
        let name = name.into();
        if !is_valid_marker_name(&name) {
            return Err(InvalidMarkerName(name));
        }
        Ok(Self { name, expiry })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expiry(&self) -> MarkerExpiry {
        self.expiry
    }

    pub fn was_here(&self, store: &dyn MarkerStore) -> bool {
        store.read(&self.name)
    }

    /// Write or refresh the marker for future requests.
    pub fn mark_visited(&self, store: &mut dyn MarkerStore) {
        store.write(&self.name, MARKER_VALUE, self.expiry);
    }

    pub fn clear_visited_marker(&self, store: &mut dyn MarkerStore) {
        store.clear(&self.name);
    }
}

/// Marker store reading the `Cookie` request header and collecting
/// `Set-Cookie` values for the response.
#[derive(Debug, Clone, Default)]
pub struct CookieMarkers {
    incoming: HashMap<String, String>,
    set_cookies: Vec<String>,
    secure: bool,
}

impl CookieMarkers {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut markers = Self::default();
        for header in headers.get_all(COOKIE) {
            if let Ok(value) = header.to_str() {
                markers.parse_cookie_header(value);
            }
        }
        markers
    }

    pub fn from_cookie_header(cookie_header: &str) -> Self {
        let mut markers = Self::default();
        markers.parse_cookie_header(cookie_header);
        markers
    }

    /// Add the `Secure` attribute to written cookies.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn set_cookie_headers(&self) -> &[String] {
        &self.set_cookies
    }

    pub fn into_set_cookie_headers(self) -> Vec<String> {
        self.set_cookies
    }

    fn parse_cookie_header(&mut self, cookie_header: &str) {
        for part in cookie_header.split(';') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            // First occurrence wins, as browsers send the most specific path first.
            self.incoming
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().trim_matches('"').to_string());
        }
    }

    fn attributes(&self) -> &'static str {
        if self.secure {
            "; Path=/; HttpOnly; SameSite=Lax; Secure"
        } else {
            "; Path=/; HttpOnly; SameSite=Lax"
        }
    }
}

impl MarkerStore for CookieMarkers {
    fn read(&self, name: &str) -> bool {
        self.incoming.get(name).is_some_and(|value| is_truthy(value))
    }

    fn write(&mut self, name: &str, value: &str, expiry: MarkerExpiry) {
        if !is_valid_marker_name(name) || !is_valid_cookie_value(value) {
            warn!(name = %name, "refusing to set a marker cookie with an invalid name or value");
            return;
        }
        let mut cookie = format!("{}={}{}", name, value, self.attributes());
        if let MarkerExpiry::MaxAge(max_age) = expiry {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        self.set_cookies.push(cookie);
    }

    fn clear(&mut self, name: &str) {
        if !is_valid_marker_name(name) {
            warn!(name = %name, "refusing to clear a marker cookie with an invalid name");
            return;
        }
        self.set_cookies
            .push(format!("{}={}; Max-Age=0", name, self.attributes()));
    }
}
