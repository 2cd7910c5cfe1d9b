//! Operator configuration read from the environment

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_HALT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_REQUEUE_SECS: u64 = 300;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Only watch this namespace; cluster-wide when unset
    pub watch_namespace: Option<String>,
    /// Identity used for leader election
    pub pod_name: String,
    /// Namespace holding the leader election lease
    pub pod_namespace: String,
    pub health_port: u16,
    /// Upper bound on waiting for a halted StatefulSet to stop
    pub halt_timeout: Duration,
    /// Resync interval for ready databases
    pub requeue_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            pod_name: "xtradb-operator".to_string(),
            pod_namespace: "default".to_string(),
            health_port: DEFAULT_HEALTH_PORT,
            halt_timeout: Duration::from_secs(DEFAULT_HALT_TIMEOUT_SECS),
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_SECS),
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let pod_name = non_empty("POD_NAME")
            .or_else(|| {
                hostname::get()
                    .ok()
                    .map(|h| h.to_string_lossy().to_string())
            })
            .unwrap_or(defaults.pod_name);

        Ok(Self {
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            pod_name,
            pod_namespace: non_empty("POD_NAMESPACE").unwrap_or(defaults.pod_namespace),
            health_port: parse(&lookup, "HEALTH_PORT")?.unwrap_or(defaults.health_port),
            halt_timeout: parse::<u64, _>(&lookup, "HALT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.halt_timeout),
            requeue_interval: parse::<u64, _>(&lookup, "REQUEUE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.requeue_interval),
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
                value,
            }),
    }
}
