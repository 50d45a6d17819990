//! Visitor admission: the rule engine and the filter service around it.

pub mod engine;
pub mod visitor_filter;

pub use engine::{evaluate, DenyReason, Verdict};
pub use visitor_filter::{Evaluation, FilterError, VisitorFilter};
