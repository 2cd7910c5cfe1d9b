//! Events attached to XtraDBCluster objects. Publishing never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// `reason` and `action` come from [`reasons`] and [`actions`]
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok()),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Dropped event");
        }
    }
}

pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown under REASON in `kubectl get events`
pub mod reasons {
    /// Dependents were created or patched
    pub const SUCCESSFUL: &str = "Successful";
    /// The resource failed validation
    pub const INVALID: &str = "Invalid";
    /// A best-effort object could not be created
    pub const FAILED_TO_CREATE: &str = "FailedToCreate";
    /// A best-effort object could not be deleted
    pub const FAILED_TO_DELETE: &str = "FailedToDelete";
    /// The workload was scaled to zero
    pub const HALTED: &str = "Halted";
    /// Deletion started
    pub const TERMINATING: &str = "Terminating";
}

/// Event actions, shown under ACTION in `kubectl get events`
pub mod actions {
    pub const CREATE: &str = "Create";
    pub const HALT: &str = "Halt";
    pub const TERMINATE: &str = "Terminate";
    pub const MONITOR: &str = "Monitor";
}
