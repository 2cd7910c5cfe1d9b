pub mod client;
pub mod context;
pub mod ensure;
pub mod error;
pub mod events;
pub mod ownership;
pub mod reconciler;
pub mod restore_gate;
pub mod state_machine;
pub mod status;
pub mod validation;

pub use client::{Dependent, KubeClient, KubeClientImpl, ObjectKind};
pub use context::Context;
pub use ensure::{ProvisionReport, Verb};
pub use error::{BackoffConfig, Error, Result};
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use ownership::{DependentClass, OwnershipAction, ownership_action};
pub use reconciler::{FINALIZER, Outcome, error_policy, reconcile};
pub use restore_gate::{GateDecision, restore_gate};
pub use state_machine::{PhaseEvent, Transition, check_transition, is_legal};
pub use status::{ConditionBuilder, StatusUpdate};
pub use validation::{MAX_REPLICAS, MIN_CLUSTER_REPLICAS, MIN_REPLICAS, validate_spec};
