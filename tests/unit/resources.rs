//! Unit tests for resource generators
//!
//! Checks that hold across generators: names, labels, selectors and which
//! objects carry an owner reference.

use kube::ResourceExt;
use xtradb_operator::crd::MonitorAgent;
use xtradb_operator::resources::common::{
    LABEL_COMPONENT, LABEL_INSTANCE, offshoot_selector_string, offshoot_selectors,
};
use xtradb_operator::resources::{binding, monitor, rbac, secret, service, statefulset};

use crate::common::*;

mod ownership_tests {
    use super::*;

    #[test]
    fn test_workload_objects_are_owned() {
        let db = create_test_db("orders", "shop", 3);

        let owned = [
            service::generate_governing_service(&db).metadata,
            service::generate_primary_service(&db).metadata,
            statefulset::generate_statefulset(&db).metadata,
            rbac::generate_service_account(&db).metadata,
            rbac::generate_role(&db).metadata,
            rbac::generate_role_binding(&db).metadata,
            binding::generate_app_binding(&db).unwrap().metadata,
        ];
        for meta in owned {
            let refs = meta.owner_references.unwrap_or_default();
            assert_eq!(refs.len(), 1, "{:?} is not owned", meta.name);
            assert_eq!(refs[0].uid, TEST_UID);
            assert_eq!(refs[0].kind, "XtraDBCluster");
            assert_eq!(refs[0].controller, Some(true));
        }
    }

    #[test]
    fn test_auth_secret_is_not_owned() {
        let db = create_test_db("orders", "shop", 1);
        let secret = secret::generate_auth_secret(&db);

        assert_eq!(secret.name_any(), "orders-auth");
        assert!(secret.metadata.owner_references.is_none());
    }
}

mod label_tests {
    use super::*;

    #[test]
    fn test_all_objects_carry_offshoot_labels() {
        let db = XtraDBClusterBuilder::new("orders", "shop")
            .with_monitor(MonitorAgent::PrometheusOperator)
            .build();
        let monitor_spec = db.spec.monitor.clone().unwrap();
        let selectors = offshoot_selectors("orders");

        let labelled = [
            service::generate_governing_service(&db).metadata,
            service::generate_primary_service(&db).metadata,
            service::generate_stats_service(&db, &monitor_spec).metadata,
            statefulset::generate_statefulset(&db).metadata,
            secret::generate_auth_secret(&db).metadata,
            monitor::generate_service_monitor(&db, &monitor_spec)
                .unwrap()
                .metadata,
        ];
        for meta in labelled {
            let labels = meta.labels.unwrap_or_default();
            for (k, v) in &selectors {
                assert_eq!(labels.get(k), Some(v), "{:?} misses {}", meta.name, k);
            }
        }
    }

    #[test]
    fn test_selector_string_matches_labels() {
        let selector = offshoot_selector_string("orders");
        for (k, v) in offshoot_selectors("orders") {
            assert!(selector.contains(&format!("{}={}", k, v)));
        }
    }

    #[test]
    fn test_service_monitor_keeps_user_labels() {
        let db = XtraDBClusterBuilder::new("orders", "shop")
            .with_monitor(MonitorAgent::PrometheusOperator)
            .build();
        let sm = monitor::generate_service_monitor(&db, db.spec.monitor.as_ref().unwrap()).unwrap();

        let labels = sm.metadata.labels.unwrap();
        assert_eq!(labels.get("release"), Some(&"prometheus".to_string()));
        assert_eq!(labels.get(LABEL_COMPONENT), Some(&"stats".to_string()));
    }
}

mod selector_tests {
    use super::*;

    #[test]
    fn test_services_select_statefulset_pods() {
        let db = create_test_db("orders", "shop", 3);
        let sts = statefulset::generate_statefulset(&db);
        let pod_labels = sts
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .labels
            .unwrap();

        for svc in [
            service::generate_governing_service(&db),
            service::generate_primary_service(&db),
        ] {
            let selector = svc.spec.unwrap().selector.unwrap();
            for (k, v) in selector {
                assert_eq!(pod_labels.get(&k), Some(&v));
            }
        }
    }

    #[test]
    fn test_governing_service_is_headless() {
        let db = create_test_db("orders", "shop", 3);
        let svc = service::generate_governing_service(&db);

        assert_eq!(svc.name_any(), "orders-pods");
        assert_eq!(svc.spec.unwrap().cluster_ip.as_deref(), Some("None"));
    }

    #[test]
    fn test_peers_resolve_through_governing_service() {
        let db = create_test_db("orders", "shop", 3);
        assert_eq!(
            statefulset::peer_addresses(&db),
            vec![
                "orders-0.orders-pods.shop",
                "orders-1.orders-pods.shop",
                "orders-2.orders-pods.shop",
            ]
        );
    }

    #[test]
    fn test_statefulset_replicas_follow_spec() {
        let db = create_test_db("orders", "shop", 5);
        let sts = statefulset::generate_statefulset(&db);
        assert_eq!(sts.spec.unwrap().replicas, Some(5));
    }

    #[test]
    fn test_claims_are_found_by_instance_label() {
        let db = create_test_db("orders", "shop", 3);
        let sts = statefulset::generate_statefulset(&db);
        let claim = &sts.spec.unwrap().volume_claim_templates.unwrap()[0];

        assert_eq!(
            claim.metadata.labels.as_ref().unwrap().get(LABEL_INSTANCE),
            Some(&"orders".to_string())
        );
    }
}
