//! Visitor context resolution
//!
//! Turns untrusted request signals into a [`VisitorContext`]: client IP from
//! the forwarding precedence chain, country through the injected
//! [`CountryLookup`](crate::geoip::CountryLookup), language, referer and the
//! repeat-visit marker.

pub mod context;
pub mod ip;
pub mod marker;
pub mod signals;

pub use context::VisitorContext;
pub use ip::resolve_ip;
pub use marker::{
    CookieMarkers, InvalidMarkerName, MarkerExpiry, MarkerPolicy, MarkerStore, DEFAULT_MARKER_NAME,
};
pub use signals::RequestSignals;
