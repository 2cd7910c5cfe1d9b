use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kube::Client;

use crate::config::OperatorConfig;
use crate::controller::client::{KubeClient, KubeClientImpl};
use crate::controller::error::BackoffConfig;
use crate::controller::events::{EventPublisher, KubeEventPublisher};
use crate::health::HealthState;
use crate::resources::common::FIELD_MANAGER;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes API operations
    pub kube: Arc<dyn KubeClient>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    pub config: OperatorConfig,
    pub backoff: BackoffConfig,
    /// Metrics and readiness, absent in tests
    pub health: Option<Arc<HealthState>>,
    /// Consecutive failed reconciles per `namespace/name`
    retries: Arc<Mutex<HashMap<String, u32>>>,
}

impl Context {
    pub fn new(client: Client, config: OperatorConfig, health: Option<Arc<HealthState>>) -> Self {
        Self::with_clients(
            Arc::new(KubeClientImpl::new(client.clone())),
            Arc::new(KubeEventPublisher::new(client, FIELD_MANAGER)),
            config,
            health,
        )
    }

    /// Build a context around arbitrary client implementations
    pub fn with_clients(
        kube: Arc<dyn KubeClient>,
        events: Arc<dyn EventPublisher>,
        config: OperatorConfig,
        health: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            kube,
            events,
            config,
            backoff: BackoffConfig::default(),
            health,
            retries: Arc::default(),
        }
    }

    /// Count a failure and return how many preceded it
    pub fn next_attempt(&self, key: &str) -> u32 {
        match self.retries.lock() {
            Ok(mut retries) => {
                let attempt = retries.entry(key.to_string()).or_insert(0);
                let previous = *attempt;
                *attempt = attempt.saturating_add(1);
                previous
            }
            Err(_) => 0,
        }
    }

    /// Forget failures after a successful reconcile
    pub fn reset_attempts(&self, key: &str) {
        if let Ok(mut retries) = self.retries.lock() {
            retries.remove(key);
        }
    }
}
