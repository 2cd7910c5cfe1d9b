//! Gate that holds provisioning until an external restore finishes
//!
//! The controller never restores data itself. An external tool populates the
//! volumes and reports completion through the `DatabaseDataRestored`
//! condition. Once `DatabaseProvisioned` is present the gate stays open for
//! the lifetime of the resource.

use crate::controller::status::{condition_status, condition_types, find_condition};
use crate::crd::Condition;

/// Outcome of evaluating the restore gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Wait,
}

/// Decide whether provisioning may continue.
///
/// Waits iff `DatabaseProvisioned` is absent and `DatabaseDataRestored` is
/// not `True`.
pub fn restore_gate(conditions: &[Condition]) -> GateDecision {
    let provisioned = find_condition(conditions, condition_types::DATABASE_PROVISIONED).is_some();
    let restored = find_condition(conditions, condition_types::DATABASE_DATA_RESTORED)
        .is_some_and(|c| c.status == condition_status::TRUE);

    if !provisioned && !restored {
        GateDecision::Wait
    } else {
        GateDecision::Proceed
    }
}
