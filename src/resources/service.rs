//! Service generation for XtraDB clusters
//!
//! Three services are managed:
//! - the governing (headless) service that gives StatefulSet members stable
//!   DNS names, which Galera uses to find its peers
//! - the primary service clients connect to
//! - the stats service exposing the metrics exporter when monitoring is on

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{MonitorAgent, MonitorSpec, XtraDBCluster};
use crate::resources::common::{
    DATABASE_PORT, component_labels, governing_service_name, offshoot_selectors, owner_reference,
    stats_service_name,
};

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Generate the headless governing service
///
/// `publishNotReadyAddresses` is set so that members can resolve each other
/// while the Galera cluster is still bootstrapping.
pub fn generate_governing_service(db: &XtraDBCluster) -> Service {
    let name = db.name_any();

    Service {
        metadata: ObjectMeta {
            name: Some(governing_service_name(db)),
            namespace: db.namespace(),
            labels: Some(component_labels(&name, "database")),
            owner_references: Some(vec![owner_reference(db)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(offshoot_selectors(&name)),
            publish_not_ready_addresses: Some(true),
            ports: Some(vec![service_port("db", DATABASE_PORT)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the primary client-facing service
pub fn generate_primary_service(db: &XtraDBCluster) -> Service {
    let name = db.name_any();

    Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: db.namespace(),
            labels: Some(component_labels(&name, "database")),
            owner_references: Some(vec![owner_reference(db)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(offshoot_selectors(&name)),
            ports: Some(vec![service_port("db", DATABASE_PORT)]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the stats service for the metrics exporter
pub fn generate_stats_service(db: &XtraDBCluster, monitor: &MonitorSpec) -> Service {
    let name = db.name_any();

    let annotations = match monitor.agent {
        MonitorAgent::PrometheusBuiltin => Some(BTreeMap::from([
            ("prometheus.io/scrape".to_string(), "true".to_string()),
            ("prometheus.io/port".to_string(), monitor.port.to_string()),
            ("prometheus.io/path".to_string(), "/metrics".to_string()),
        ])),
        MonitorAgent::PrometheusOperator => None,
    };

    Service {
        metadata: ObjectMeta {
            name: Some(stats_service_name(db)),
            namespace: db.namespace(),
            labels: Some(component_labels(&name, "stats")),
            annotations,
            owner_references: Some(vec![owner_reference(db)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(offshoot_selectors(&name)),
            ports: Some(vec![service_port("metrics", monitor.port)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
