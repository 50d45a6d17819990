pub mod config;
pub mod filter;
pub mod gate;
pub mod geoip;
pub mod visitor;

pub use config::{ConfigError, FilterConfig};
pub use filter::{evaluate, DenyReason, Evaluation, FilterError, Verdict, VisitorFilter};
pub use geoip::{CountryLookup, GeoIpError, GeoIpService};
pub use visitor::{MarkerPolicy, MarkerStore, RequestSignals, VisitorContext};
