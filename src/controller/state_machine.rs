//! Finite state machine for the XtraDBCluster phase
//!
//! Phases only move along the transitions listed here. Re-writing the
//! current phase (for example to record a newer generation) is always
//! allowed; Terminating is terminal.

use std::fmt;

use crate::controller::error::{Error, Result};
use crate::crd::DatabasePhase;
use crate::crd::DatabasePhase::{Halted, Provisioning, Ready, Terminating};

/// Events that trigger phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseEvent {
    /// First reconcile of a new resource
    ProvisioningStarted,
    /// All dependents exist and the restore gate is open
    ProvisioningCompleted,
    /// `spec.halted` was set
    HaltRequested,
    /// `spec.halted` was cleared on a halted resource
    ResumeRequested,
    /// Deletion timestamp has been set on the resource
    DeletionRequested,
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseEvent::ProvisioningStarted => write!(f, "ProvisioningStarted"),
            PhaseEvent::ProvisioningCompleted => write!(f, "ProvisioningCompleted"),
            PhaseEvent::HaltRequested => write!(f, "HaltRequested"),
            PhaseEvent::ResumeRequested => write!(f, "ResumeRequested"),
            PhaseEvent::DeletionRequested => write!(f, "DeletionRequested"),
        }
    }
}

/// A single edge in the transition table. `from == None` is the unset phase.
#[derive(Debug)]
pub struct Transition {
    pub from: Option<DatabasePhase>,
    pub to: DatabasePhase,
    pub event: PhaseEvent,
}

impl Transition {
    const fn new(from: Option<DatabasePhase>, to: DatabasePhase, event: PhaseEvent) -> Self {
        Self { from, to, event }
    }
}

const TRANSITIONS: &[Transition] = &[
    Transition::new(None, Provisioning, PhaseEvent::ProvisioningStarted),
    Transition::new(Some(Provisioning), Ready, PhaseEvent::ProvisioningCompleted),
    Transition::new(Some(Provisioning), Halted, PhaseEvent::HaltRequested),
    Transition::new(Some(Ready), Halted, PhaseEvent::HaltRequested),
    Transition::new(Some(Halted), Provisioning, PhaseEvent::ResumeRequested),
    Transition::new(None, Terminating, PhaseEvent::DeletionRequested),
    Transition::new(Some(Provisioning), Terminating, PhaseEvent::DeletionRequested),
    Transition::new(Some(Ready), Terminating, PhaseEvent::DeletionRequested),
    Transition::new(Some(Halted), Terminating, PhaseEvent::DeletionRequested),
];

/// The edge matching `from -> to`, if one exists
pub fn find_transition(from: Option<DatabasePhase>, to: DatabasePhase) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

/// Whether `from -> to` is a legal phase write
pub fn is_legal(from: Option<DatabasePhase>, to: DatabasePhase) -> bool {
    from == Some(to) || find_transition(from, to).is_some()
}

/// Reject illegal phase writes before they reach the API server
pub fn check_transition(from: Option<DatabasePhase>, to: DatabasePhase) -> Result<()> {
    if is_legal(from, to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

/// Events accepted in a given phase
pub fn valid_events(from: Option<DatabasePhase>) -> Vec<PhaseEvent> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == from)
        .map(|t| t.event)
        .collect()
}
