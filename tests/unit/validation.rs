//! Unit tests for spec validation

use xtradb_operator::controller::Error;
use xtradb_operator::controller::validation::{
    MAX_REPLICAS, MIN_CLUSTER_REPLICAS, MIN_REPLICAS, validate, validate_spec,
};
use xtradb_operator::crd::MonitorAgent;

use crate::common::*;

fn message(err: Error) -> String {
    match err {
        Error::ValidationError(msg) => msg,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

mod replica_tests {
    use super::*;

    #[test]
    fn test_standalone_and_cluster_sizes() {
        for replicas in [MIN_REPLICAS, MIN_CLUSTER_REPLICAS, 5, MAX_REPLICAS] {
            let db = create_test_db("orders", "shop", replicas);
            assert!(validate_spec(&db).is_ok(), "{replicas} replicas rejected");
        }
    }

    #[test]
    fn test_two_members_lose_quorum() {
        let db = create_test_db("orders", "shop", 2);
        assert!(message(validate_spec(&db).unwrap_err()).contains("quorum"));
    }

    #[test]
    fn test_out_of_range() {
        for replicas in [0, -1, MAX_REPLICAS + 1] {
            let db = create_test_db("orders", "shop", replicas);
            assert!(validate_spec(&db).is_err(), "{replicas} replicas accepted");
        }
    }
}

mod spec_tests {
    use super::*;

    #[test]
    fn test_empty_version() {
        let db = XtraDBClusterBuilder::new("orders", "shop")
            .with_version("  ")
            .build();
        assert!(message(validate_spec(&db).unwrap_err()).contains("version"));
    }

    #[test]
    fn test_storage_sizes() {
        for size in ["512Mi", "10Gi", "1Ti"] {
            let db = XtraDBClusterBuilder::new("orders", "shop")
                .with_storage(size)
                .build();
            assert!(validate_spec(&db).is_ok(), "{size} rejected");
        }
        for size in ["10GB", "0Gi", "Gi", "ten Gi"] {
            let db = XtraDBClusterBuilder::new("orders", "shop")
                .with_storage(size)
                .build();
            assert!(validate_spec(&db).is_err(), "{size} accepted");
        }
    }

    #[test]
    fn test_exporter_port_cannot_clash_with_database() {
        let mut db = XtraDBClusterBuilder::new("orders", "shop")
            .with_monitor(MonitorAgent::PrometheusBuiltin)
            .build();
        db.spec.monitor.as_mut().unwrap().port = 3306;
        assert!(validate_spec(&db).is_err());
    }

    #[test]
    fn test_scrape_interval() {
        for (interval, ok) in [("30s", true), ("1m", true), ("0s", false), ("30", false), ("1h", false)] {
            let mut db = XtraDBClusterBuilder::new("orders", "shop")
                .with_monitor(MonitorAgent::PrometheusOperator)
                .build();
            db.spec.monitor.as_mut().unwrap().interval = Some(interval.to_string());
            assert_eq!(validate_spec(&db).is_ok(), ok, "interval {interval}");
        }
    }
}

mod reference_tests {
    use std::collections::BTreeMap;

    use xtradb_operator::controller::client::ObjectKind;

    use super::*;

    #[tokio::test]
    async fn test_external_secret_must_exist() {
        let db = XtraDBClusterBuilder::new("orders", "shop")
            .with_external_secret("vault-creds")
            .build();
        let h = Harness::new(&db);

        let err = validate(&db, &h.ctx, "shop").await.unwrap_err();
        assert!(message(err).contains("vault-creds"));

        h.kube
            .seed(ObjectKind::Secret, "vault-creds", BTreeMap::new());
        validate(&db, &h.ctx, "shop").await.unwrap();
    }

    #[tokio::test]
    async fn test_generated_secret_need_not_exist() {
        let db = create_test_db("orders", "shop", 1);
        let h = Harness::new(&db);
        validate(&db, &h.ctx, "shop").await.unwrap();
    }
}
