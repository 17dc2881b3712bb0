//! Process configuration loaded from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `WEBHOOK_PORT` | `9443` |
//! | `WEBHOOK_CERT_PATH` | `/etc/webhook/certs/tls.crt` |
//! | `WEBHOOK_KEY_PATH` | `/etc/webhook/certs/tls.key` |
//! | `HEALTH_PORT` | `8080` |
//! | `IGNORE_LABEL_KEYS` | `k8s-app` |

use std::collections::BTreeSet;

use thiserror::Error;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;
/// Default health/metrics server port
pub const HEALTH_PORT: u16 = 8080;
/// Label key carried by cluster infrastructure DaemonSets (kube-proxy, CNI agents)
pub const DEFAULT_IGNORE_LABEL_KEY: &str = "k8s-app";

/// Errors raised while reading configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for the sidecar mutator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutatorConfig {
    /// DaemonSets carrying any of these label keys are never injected
    pub ignore_label_keys: BTreeSet<String>,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            ignore_label_keys: BTreeSet::from([DEFAULT_IGNORE_LABEL_KEY.to_string()]),
        }
    }
}

impl MutatorConfig {
    /// Build a config ignoring exactly the given label keys
    pub fn with_ignore_label_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore_label_keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// Top-level process configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub webhook_port: u16,
    pub cert_path: String,
    pub key_path: String,
    pub health_port: u16,
    pub mutator: MutatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_port: WEBHOOK_PORT,
            cert_path: WEBHOOK_CERT_PATH.to_string(),
            key_path: WEBHOOK_KEY_PATH.to_string(),
            health_port: HEALTH_PORT,
            mutator: MutatorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Unset variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let webhook_port = match lookup("WEBHOOK_PORT") {
            Some(v) => parse_port("WEBHOOK_PORT", &v)?,
            None => defaults.webhook_port,
        };
        let health_port = match lookup("HEALTH_PORT") {
            Some(v) => parse_port("HEALTH_PORT", &v)?,
            None => defaults.health_port,
        };
        let mutator = match lookup("IGNORE_LABEL_KEYS") {
            Some(v) => MutatorConfig {
                ignore_label_keys: parse_label_keys(&v),
            },
            None => defaults.mutator,
        };

        Ok(Self {
            webhook_port,
            cert_path: lookup("WEBHOOK_CERT_PATH").unwrap_or(defaults.cert_path),
            key_path: lookup("WEBHOOK_KEY_PATH").unwrap_or(defaults.key_path),
            health_port,
            mutator,
        })
    }
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Split a comma separated list of label keys, dropping blanks
fn parse_label_keys(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
