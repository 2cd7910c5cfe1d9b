//! Error types for the XtraDBCluster controller

use std::time::Duration;

use thiserror::Error;

use crate::controller::ownership::DependentClass;
use crate::crd::DatabasePhase;

/// Error variants are named with the `Error` suffix where they wrap a
/// lower-level failure (e.g., `KubeError`, `ValidationError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The spec asks for something its own policy forbids
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Illegal phase transition from {from:?} to {to}")]
    InvalidTransition {
        from: Option<DatabasePhase>,
        to: DatabasePhase,
    },

    #[error("failed to ensure {step}: {source}")]
    Ensure {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to update ownership of {class}: {source}")]
    Ownership {
        class: DependentClass,
        #[source]
        source: Box<Error>,
    },

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Watch failed while waiting: {0}")]
    WaitError(#[from] kube::runtime::wait::Error),

    #[error("Status update conflicted {0} times in a row")]
    StatusConflict(u32),
}

impl Error {
    /// Wrap an error with the name of the ensure step that produced it
    pub fn ensure(step: &'static str) -> impl FnOnce(Error) -> Error {
        move |source| Error::Ensure {
            step,
            source: Box::new(source),
        }
    }

    /// Wrap an error with the dependent class whose ownership failed to change
    pub fn ownership(class: DependentClass) -> impl FnOnce(Error) -> Error {
        move |source| Error::Ownership {
            class,
            source: Box::new(source),
        }
    }

    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 404),
            Error::Ensure { source, .. } | Error::Ownership { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // Kubernetes API errors are often retryable
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            Error::Ensure { source, .. } | Error::Ownership { source, .. } => {
                source.is_retryable()
            }
            Error::Timeout(_) => true,
            Error::WaitError(_) => true,
            Error::StatusConflict(_) => true,
            // Spec problems need a spec edit
            Error::ValidationError(_) => false,
            Error::PolicyViolation(_) => false,
            Error::InvalidTransition { .. } => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors wait for a spec edit; requeue slowly
            self.max_delay
        }
    }
}
