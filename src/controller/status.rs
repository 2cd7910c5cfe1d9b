//! Status and conditions management for XtraDBCluster resources
//!
//! The controller owns `.status` exclusively. Changes are described as a
//! [`StatusUpdate`] and merged into the freshest copy of the status by the
//! client, so the merge here is pure and can be retried after a conflict.

use chrono::Utc;

use crate::controller::error::Result;
use crate::controller::state_machine::check_transition;
use crate::crd::{Condition, DatabasePhase, XtraDBClusterStatus};

/// Condition types written by the controller or by external tooling
pub mod condition_types {
    /// Dependents were provisioned at least once
    pub const DATABASE_PROVISIONED: &str = "DatabaseProvisioned";
    /// External restore tooling finished loading the initial data
    pub const DATABASE_DATA_RESTORED: &str = "DatabaseDataRestored";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            conditions: Vec::new(),
            generation,
        }
    }

    /// Create from existing conditions
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            // lastTransitionTime only moves when the status flips
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = Utc::now().to_rfc3339();
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: Utc::now().to_rfc3339(),
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the DatabaseProvisioned condition
    pub fn provisioned(self, is_provisioned: bool, reason: &str, message: &str) -> Self {
        let status = if is_provisioned {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(condition_types::DATABASE_PROVISIONED, status, reason, message)
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ConditionChange {
    type_: String,
    status: String,
    reason: String,
    message: String,
}

/// A change to the status subresource
///
/// `observedGeneration` can only be carried together with a phase, and is
/// merged as `max(old, new)` so it never regresses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    phase: Option<DatabasePhase>,
    observed_generation: Option<i64>,
    conditions: Vec<ConditionChange>,
}

impl StatusUpdate {
    /// Write a phase without touching observedGeneration
    pub fn phase(phase: DatabasePhase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    /// Write a phase together with the generation it was computed from
    pub fn phase_with_generation(phase: DatabasePhase, generation: Option<i64>) -> Self {
        Self {
            phase: Some(phase),
            observed_generation: generation,
            conditions: Vec::new(),
        }
    }

    /// Also set a condition
    pub fn with_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        self.conditions.push(ConditionChange {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
        });
        self
    }

    pub fn target_phase(&self) -> Option<DatabasePhase> {
        self.phase
    }

    /// Merge this update into `status`.
    ///
    /// Returns `Ok(false)` when nothing would change, so callers can skip the
    /// write. Illegal phase transitions are rejected.
    pub fn apply_to(&self, status: &mut XtraDBClusterStatus) -> Result<bool> {
        let before = status.clone();

        if let Some(phase) = self.phase {
            check_transition(status.phase, phase)?;
            status.phase = Some(phase);

            if let Some(generation) = self.observed_generation {
                status.observed_generation = Some(
                    status
                        .observed_generation
                        .map_or(generation, |old| old.max(generation)),
                );
            }
        }

        if !self.conditions.is_empty() {
            let generation = status.observed_generation;
            let mut builder =
                ConditionBuilder::from_existing(std::mem::take(&mut status.conditions), generation);
            for change in &self.conditions {
                let unchanged = find_condition(&builder.conditions, &change.type_).is_some_and(|c| {
                    c.status == change.status && c.reason == change.reason && c.message == change.message
                });
                if !unchanged {
                    builder = builder.set_condition(
                        &change.type_,
                        &change.status,
                        &change.reason,
                        &change.message,
                    );
                }
            }
            status.conditions = builder.build();
        }

        Ok(*status != before)
    }
}
