//! Request signals in CGI naming
//!
//! The resolver never reads ambient process or request state; callers hand it
//! a [`RequestSignals`] built from whatever their transport exposes.

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::net::IpAddr;

pub const HTTP_CLIENT_IP: &str = "HTTP_CLIENT_IP";
pub const HTTP_X_FORWARDED_FOR: &str = "HTTP_X_FORWARDED_FOR";
pub const HTTP_X_FORWARDED: &str = "HTTP_X_FORWARDED";
pub const HTTP_FORWARDED_FOR: &str = "HTTP_FORWARDED_FOR";
pub const HTTP_FORWARDED: &str = "HTTP_FORWARDED";
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
pub const HTTP_ACCEPT_LANGUAGE: &str = "HTTP_ACCEPT_LANGUAGE";
pub const HTTP_REFERER: &str = "HTTP_REFERER";

/// Every variable the resolver consults.
pub const RESOLVER_VARS: [&str; 8] = [
    HTTP_CLIENT_IP,
    HTTP_X_FORWARDED_FOR,
    HTTP_X_FORWARDED,
    HTTP_FORWARDED_FOR,
    HTTP_FORWARDED,
    REMOTE_ADDR,
    HTTP_ACCEPT_LANGUAGE,
    HTTP_REFERER,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    vars: HashMap<String, String>,
}

impl RequestSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable by its CGI name (e.g. `HTTP_X_FORWARDED_FOR`).
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Map HTTP headers to CGI variables the way a web server does:
    /// `X-Forwarded-For` becomes `HTTP_X_FORWARDED_FOR`, repeated headers are
    /// joined with `", "`, and the socket peer becomes `REMOTE_ADDR`.
    ///
    /// Header values that are not visible ASCII are skipped, and so are
    /// header names containing `_`: `X_Forwarded_For` would otherwise land on
    /// the same variable as `X-Forwarded-For`.
    pub fn from_headers(headers: &HeaderMap, remote_addr: Option<IpAddr>) -> Self {
        let mut vars: HashMap<String, String> = HashMap::new();

        for name in headers.keys() {
            if name.as_str().contains('_') {
                continue;
            }
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect();
            if values.is_empty() {
                continue;
            }
            vars.insert(cgi_name(name.as_str()), values.join(", "));
        }

        if let Some(addr) = remote_addr {
            vars.insert(REMOTE_ADDR.to_string(), addr.to_string());
        }

        Self { vars }
    }

    /// Read the resolver variables from the process environment, for CGI
    /// style deployments where the web server exports them.
    pub fn from_process_env() -> Self {
        let vars = RESOLVER_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.to_string(), value)))
            .collect();
        Self { vars }
    }
}

fn cgi_name(header: &str) -> String {
    let mut name = String::with_capacity(header.len() + 5);
    name.push_str("HTTP_");
    for c in header.chars() {
        name.push(if c == '-' { '_' } else { c.to_ascii_uppercase() });
    }
    name
}
