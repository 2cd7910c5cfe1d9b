//! Additional unit tests for phase transitions

use xtradb_operator::controller::Error;
use xtradb_operator::controller::state_machine::{
    PhaseEvent, check_transition, find_transition, is_legal, valid_events,
};
use xtradb_operator::crd::DatabasePhase::{self, Halted, Provisioning, Ready, Terminating};

const ALL: [DatabasePhase; 4] = [Provisioning, Ready, Halted, Terminating];

mod transition_table_tests {
    use super::*;

    #[test]
    fn test_terminating_is_terminal() {
        for to in [Provisioning, Ready, Halted] {
            assert!(!is_legal(Some(Terminating), to), "Terminating -> {to}");
        }
        assert!(valid_events(Some(Terminating)).is_empty());
    }

    #[test]
    fn test_deletion_is_accepted_from_every_live_phase() {
        for from in [None, Some(Provisioning), Some(Ready), Some(Halted)] {
            let t = find_transition(from, Terminating).unwrap();
            assert_eq!(t.event, PhaseEvent::DeletionRequested);
        }
    }

    #[test]
    fn test_rewriting_current_phase_is_legal() {
        for phase in ALL {
            assert!(is_legal(Some(phase), phase));
        }
    }

    #[test]
    fn test_ready_requires_provisioning_first() {
        assert!(!is_legal(None, Ready));
        assert!(!is_legal(Some(Halted), Ready));
        assert!(is_legal(Some(Provisioning), Ready));
    }

    #[test]
    fn test_halt_cannot_skip_provisioning() {
        assert!(!is_legal(None, Halted));
        assert!(is_legal(Some(Provisioning), Halted));
        assert!(is_legal(Some(Ready), Halted));
    }

    #[test]
    fn test_resume_goes_through_provisioning() {
        let t = find_transition(Some(Halted), Provisioning).unwrap();
        assert_eq!(t.event, PhaseEvent::ResumeRequested);
    }
}

mod check_transition_tests {
    use super::*;

    #[test]
    fn test_illegal_transition_error() {
        let err = check_transition(Some(Terminating), Ready).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Some(Terminating),
                to: Ready
            }
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_valid_events_from_unset() {
        let events = valid_events(None);
        assert!(events.contains(&PhaseEvent::ProvisioningStarted));
        assert!(events.contains(&PhaseEvent::DeletionRequested));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(PhaseEvent::HaltRequested.to_string(), "HaltRequested");
    }
}
