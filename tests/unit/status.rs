//! Unit tests for status updates and conditions

use xtradb_operator::controller::Error;
use xtradb_operator::controller::status::{
    ConditionBuilder, StatusUpdate, condition_status, condition_types, find_condition,
};
use xtradb_operator::crd::{DatabasePhase, XtraDBClusterStatus};

use crate::common::*;

fn status(phase: DatabasePhase, generation: i64) -> XtraDBClusterStatus {
    XtraDBClusterStatus {
        phase: Some(phase),
        observed_generation: Some(generation),
        conditions: Vec::new(),
    }
}

mod status_update_tests {
    use super::*;

    #[test]
    fn test_observed_generation_never_regresses() {
        let mut current = status(DatabasePhase::Ready, 5);

        let changed = StatusUpdate::phase_with_generation(DatabasePhase::Ready, Some(3))
            .apply_to(&mut current)
            .unwrap();

        assert!(!changed);
        assert_eq!(current.observed_generation, Some(5));
    }

    #[test]
    fn test_generation_advances_with_phase() {
        let mut current = status(DatabasePhase::Ready, 1);

        StatusUpdate::phase_with_generation(DatabasePhase::Halted, Some(2))
            .apply_to(&mut current)
            .unwrap();

        assert_eq!(current.phase, Some(DatabasePhase::Halted));
        assert_eq!(current.observed_generation, Some(2));
    }

    #[test]
    fn test_phase_only_update_keeps_generation() {
        let mut current = status(DatabasePhase::Ready, 4);

        StatusUpdate::phase(DatabasePhase::Terminating)
            .apply_to(&mut current)
            .unwrap();

        assert_eq!(current.observed_generation, Some(4));
    }

    #[test]
    fn test_illegal_transition_leaves_status_alone() {
        let mut current = status(DatabasePhase::Terminating, 2);
        let before = current.clone();

        let err = StatusUpdate::phase(DatabasePhase::Provisioning)
            .apply_to(&mut current)
            .unwrap_err();

        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(current, before);
    }

    #[test]
    fn test_external_conditions_are_preserved() {
        let mut current = status(DatabasePhase::Provisioning, 1);
        current
            .conditions
            .push(data_restored(condition_status::TRUE));

        StatusUpdate::phase_with_generation(DatabasePhase::Ready, Some(1))
            .with_condition(
                condition_types::DATABASE_PROVISIONED,
                condition_status::TRUE,
                "Provisioned",
                "done",
            )
            .apply_to(&mut current)
            .unwrap();

        assert_eq!(current.conditions.len(), 2);
        assert!(
            find_condition(&current.conditions, condition_types::DATABASE_DATA_RESTORED).is_some()
        );
    }

    #[test]
    fn test_identical_condition_is_not_a_change() {
        let update = StatusUpdate::phase_with_generation(DatabasePhase::Ready, Some(1))
            .with_condition(
                condition_types::DATABASE_PROVISIONED,
                condition_status::TRUE,
                "Provisioned",
                "done",
            );
        let mut current = status(DatabasePhase::Provisioning, 1);

        assert!(update.apply_to(&mut current).unwrap());
        assert!(!update.apply_to(&mut current).unwrap());
    }

    #[test]
    fn test_target_phase() {
        assert_eq!(
            StatusUpdate::phase(DatabasePhase::Halted).target_phase(),
            Some(DatabasePhase::Halted)
        );
        assert_eq!(StatusUpdate::default().target_phase(), None);
    }
}

mod condition_builder_tests {
    use super::*;

    #[test]
    fn test_status_flip_moves_transition_time() {
        let conditions = vec![data_restored(condition_status::FALSE)];
        let before = conditions[0].last_transition_time.clone();

        let conditions = ConditionBuilder::from_existing(conditions, Some(1))
            .set_condition(
                condition_types::DATABASE_DATA_RESTORED,
                condition_status::TRUE,
                "Restored",
                "",
            )
            .build();

        assert_ne!(conditions[0].last_transition_time, before);
        assert_eq!(conditions[0].status, condition_status::TRUE);
    }

    #[test]
    fn test_provisioned_false() {
        let conditions = ConditionBuilder::new(None)
            .provisioned(false, "Pending", "waiting")
            .build();
        assert_eq!(conditions[0].status, condition_status::FALSE);
        assert_eq!(conditions[0].type_, condition_types::DATABASE_PROVISIONED);
    }
}
