//! HTTP surface for the visitor filter
//!
//! `/auth` answers reverse-proxy subrequests, `/check` reports the verdict
//! as JSON, and [`protect`] wraps any router in the same check.

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::{DenyAction, GateState, DENY_REDIRECT_HEADER};
pub use routes::{create_gate_router, protect};
