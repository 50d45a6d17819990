//! Country lookup backed by a MaxMind GeoLite2/GeoIP2 MMDB
//!
//! The database is memory-mapped once at startup and shared read-only
//! across requests. "Address not found" is a normal outcome (`Ok(None)`);
//! anything else is a [`GeoIpError`].

use maxminddb::{geoip2, MaxMindDbError, Mmap, Reader};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GeoIpError {
    #[error("failed to open GeoIP database at {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: MaxMindDbError,
    },
    #[error(
        "GeoIP database at {} has type '{}', expected a Country or City database",
        path.display(),
        database_type
    )]
    UnsupportedDatabase {
        path: PathBuf,
        database_type: String,
    },
    #[error("country rules are configured but no GeoIP database was provided")]
    Missing,
    #[error("GeoIP lookup for {ip} failed")]
    Lookup {
        ip: IpAddr,
        #[source]
        source: MaxMindDbError,
    },
}

/// IP to country capability.
///
/// Implementations must be safe for concurrent reads; one instance is shared
/// by every evaluation in the process.
pub trait CountryLookup: Send + Sync {
    /// Returns the ISO 3166-1 alpha-2 code for `ip`, or `None` when the
    /// address is not in the database.
    fn lookup_country(&self, ip: IpAddr) -> Result<Option<String>, GeoIpError>;
}

/// Memory-mapped MaxMind reader
#[derive(Clone)]
pub struct GeoIpService {
    reader: Arc<Reader<Mmap>>,
}

impl GeoIpService {
    /// Open a Country or City MMDB file.
    ///
    /// Fails when the file cannot be mapped or holds some other database
    /// (ASN, ISP, ...), since such a reader would silently report every
    /// address as not found.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GeoIpError> {
        let path = path.as_ref();
        let reader = unsafe { Reader::open_mmap(path) }.map_err(|source| GeoIpError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let database_type = reader.metadata.database_type.clone();
        if !database_type.contains("Country") && !database_type.contains("City") {
            return Err(GeoIpError::UnsupportedDatabase {
                path: path.to_path_buf(),
                database_type,
            });
        }

        info!(path = %path.display(), database_type = %database_type, "opened GeoIP database");

        Ok(Self {
            reader: Arc::new(reader),
        })
    }
}

impl CountryLookup for GeoIpService {
    fn lookup_country(&self, ip: IpAddr) -> Result<Option<String>, GeoIpError> {
        let result = self
            .reader
            .lookup(ip)
            .map_err(|source| GeoIpError::Lookup { ip, source })?;

        // City databases are a superset of Country data, so decoding as
        // Country works for both.
        let country = result
            .decode::<geoip2::Country>()
            .map_err(|source| GeoIpError::Lookup { ip, source })?;

        Ok(country.and_then(|record| record.country.iso_code.map(|code| code.to_string())))
    }
}

/// Lookup used when no database is configured: every address is not found.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLookup;

impl CountryLookup for DisabledLookup {
    fn lookup_country(&self, _ip: IpAddr) -> Result<Option<String>, GeoIpError> {
        Ok(None)
    }
}

/// Pick the lookup for a deployment.
///
/// A configured path is always opened (and must open). Without one, country
/// rules cannot be honoured, so `country_rules_configured` turns the absence
/// into [`GeoIpError::Missing`] instead of quietly allowing every country.
pub fn lookup_for(
    path: Option<&Path>,
    country_rules_configured: bool,
) -> Result<Arc<dyn CountryLookup>, GeoIpError> {
    match path {
        Some(path) => Ok(Arc::new(GeoIpService::open(path)?)),
        None if country_rules_configured => Err(GeoIpError::Missing),
        None => {
            info!("no GeoIP database configured, country lookups disabled");
            Ok(Arc::new(DisabledLookup))
        }
    }
}
