//! Filter policy
//!
//! A [`FilterConfig`] is built once from a mapping of recognized keys and
//! never changes afterwards. Keys are matched ignoring ASCII case and
//! underscores, so `allowToAll` and `allow_to_all` are the same key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown filter config key '{0}'")]
    UnknownKey(String),
    #[error("filter config key '{0}' is given more than once")]
    DuplicateKey(&'static str),
    #[error("invalid value for filter config key '{key}'")]
    InvalidValue {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("filter config must be a mapping of keys, got {0}")]
    NotAMapping(&'static str),
    #[error("filter config key '{0}' contains an empty entry")]
    EmptyEntry(&'static str),
    #[error("failed to load filter config from {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Key {
    AllowToAll,
    DisallowedCountries,
    DisallowedLanguages,
    DisallowedReferers,
    DisallowedIpAddresses,
    DisallowIfVisitorWasHere,
}

impl Key {
    const ALL: [Key; 6] = [
        Key::AllowToAll,
        Key::DisallowedCountries,
        Key::DisallowedLanguages,
        Key::DisallowedReferers,
        Key::DisallowedIpAddresses,
        Key::DisallowIfVisitorWasHere,
    ];

    fn name(self) -> &'static str {
        match self {
            Key::AllowToAll => "allowToAll",
            Key::DisallowedCountries => "disallowedCountries",
            Key::DisallowedLanguages => "disallowedLanguages",
            Key::DisallowedReferers => "disallowedReferers",
            Key::DisallowedIpAddresses => "disallowedIpAddresses",
            Key::DisallowIfVisitorWasHere => "disallowIfVisitorWasHere",
        }
    }

    fn parse(raw: &str) -> Option<Key> {
        let folded: String = raw
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Key::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(&folded))
    }
}

/// Denylist policy for the visitor filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", rename_all = "camelCase")]
pub struct FilterConfig {
    allow_to_all: bool,
    disallowed_countries: BTreeSet<String>,
    disallowed_languages: BTreeSet<String>,
    disallowed_referers: BTreeSet<String>,
    disallowed_ip_addresses: BTreeSet<String>,
    disallow_if_visitor_was_here: bool,
}

impl FilterConfig {
    /// Build a policy from a key/value mapping.
    ///
    /// Unknown keys, repeated keys, wrongly typed values and empty list
    /// entries are rejected. Missing keys keep their defaults (`false`, empty).
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut seen = BTreeSet::new();

        for (raw_key, value) in map {
            let key = Key::parse(raw_key).ok_or_else(|| ConfigError::UnknownKey(raw_key.clone()))?;
            if !seen.insert(key) {
                return Err(ConfigError::DuplicateKey(key.name()));
            }

            match key {
                Key::AllowToAll => config.allow_to_all = parse_bool(key, value)?,
                Key::DisallowedCountries => config.disallowed_countries = parse_set(key, value)?,
                Key::DisallowedLanguages => config.disallowed_languages = parse_set(key, value)?,
                Key::DisallowedReferers => config.disallowed_referers = parse_set(key, value)?,
                Key::DisallowedIpAddresses => {
                    config.disallowed_ip_addresses = parse_set(key, value)?
                }
                Key::DisallowIfVisitorWasHere => {
                    config.disallow_if_visitor_was_here = parse_bool(key, value)?
                }
            }
        }

        Ok(config)
    }

    /// Build a policy from a JSON object value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => Self::from_map(&map),
            Value::Null => Err(ConfigError::NotAMapping("null")),
            Value::Bool(_) => Err(ConfigError::NotAMapping("a boolean")),
            Value::Number(_) => Err(ConfigError::NotAMapping("a number")),
            Value::String(_) => Err(ConfigError::NotAMapping("a string")),
            Value::Array(_) => Err(ConfigError::NotAMapping("an array")),
        }
    }

    /// Load a policy file; the format (JSON, TOML, YAML, ...) follows the
    /// file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let load_error = |source| ConfigError::Load {
            path: path.to_path_buf(),
            source,
        };

        let map = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|settings| settings.try_deserialize::<Map<String, Value>>())
            .map_err(load_error)?;

        Self::from_map(&map)
    }

    pub fn with_allow_to_all(mut self, allow_to_all: bool) -> Self {
        self.allow_to_all = allow_to_all;
        self
    }

    pub fn with_disallowed_countries<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_countries = countries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disallowed_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disallowed_referers<I, S>(mut self, referers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_referers = referers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disallowed_ip_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_ip_addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disallow_if_visitor_was_here(mut self, enabled: bool) -> Self {
        self.disallow_if_visitor_was_here = enabled;
        self
    }

    pub fn allow_to_all(&self) -> bool {
        self.allow_to_all
    }

    pub fn disallowed_countries(&self) -> &BTreeSet<String> {
        &self.disallowed_countries
    }

    pub fn disallowed_languages(&self) -> &BTreeSet<String> {
        &self.disallowed_languages
    }

    /// Substrings; a referer containing any of them is denied.
    pub fn disallowed_referers(&self) -> &BTreeSet<String> {
        &self.disallowed_referers
    }

    pub fn disallowed_ip_addresses(&self) -> &BTreeSet<String> {
        &self.disallowed_ip_addresses
    }

    pub fn disallow_if_visitor_was_here(&self) -> bool {
        self.disallow_if_visitor_was_here
    }

    /// Whether evaluating this policy can ever consult the visitor's country.
    pub fn needs_geolocation(&self) -> bool {
        !self.allow_to_all && !self.disallowed_countries.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for FilterConfig {
    type Error = ConfigError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_map(&map)
    }
}

fn parse_bool(key: Key, value: &Value) -> Result<bool, ConfigError> {
    bool::deserialize(value).map_err(|source| ConfigError::InvalidValue {
        key: key.name(),
        source,
    })
}

fn parse_set(key: Key, value: &Value) -> Result<BTreeSet<String>, ConfigError> {
    let entries =
        Vec::<String>::deserialize(value).map_err(|source| ConfigError::InvalidValue {
            key: key.name(),
            source,
        })?;

    if entries.iter().any(|entry| entry.is_empty()) {
        return Err(ConfigError::EmptyEntry(key.name()));
    }

    Ok(entries.into_iter().collect())
}
