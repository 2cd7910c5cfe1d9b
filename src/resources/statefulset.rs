//! StatefulSet generation for Percona XtraDB Cluster
//!
//! A single StatefulSet runs every member. In cluster mode each member joins
//! the Galera group through the governing service DNS names; in standalone
//! mode the single pod starts without Galera peers.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe, SecretKeySelector, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{MonitorSpec, XtraDBCluster};
use crate::resources::common::{
    DATABASE_PORT, component_labels, governing_service_name, offshoot_selectors, owner_reference,
    rbac_name,
};
use crate::resources::secret::{PASSWORD_KEY, USERNAME_KEY};

const DATABASE_IMAGE: &str = "percona/percona-xtradb-cluster";
const EXPORTER_IMAGE: &str = "prom/mysqld-exporter:v0.15.1";

/// Galera replication, incremental state transfer and state snapshot transfer
const GALERA_PORTS: [(&str, i32); 3] = [("galera", 4567), ("ist", 4568), ("sst", 4444)];

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn plain_env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// DNS names of every member behind the governing service
pub fn peer_addresses(db: &XtraDBCluster) -> Vec<String> {
    let name = db.name_any();
    let governing = governing_service_name(db);
    let ns = db.namespace().unwrap_or_default();
    (0..db.spec.replicas)
        .map(|i| format!("{}-{}.{}.{}", name, i, governing, ns))
        .collect()
}

fn database_container(db: &XtraDBCluster) -> Container {
    let secret = db.auth_secret_name();

    let mut env = vec![secret_env("MYSQL_ROOT_PASSWORD", &secret, PASSWORD_KEY)];
    let mut ports = vec![ContainerPort {
        container_port: DATABASE_PORT,
        name: Some("db".to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];

    if db.is_cluster() {
        env.push(plain_env("CLUSTER_NAME", db.name_any()));
        env.push(plain_env("CLUSTER_JOIN", peer_addresses(db).join(",")));
        ports.extend(GALERA_PORTS.iter().map(|(name, port)| ContainerPort {
            container_port: *port,
            name: Some(name.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }));
    }

    let ping = Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "bash".to_string(),
                "-c".to_string(),
                "mysqladmin ping -uroot -p\"${MYSQL_ROOT_PASSWORD}\"".to_string(),
            ]),
        }),
        initial_delay_seconds: Some(30),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    };

    Container {
        name: "xtradb".to_string(),
        image: Some(format!("{}:{}", DATABASE_IMAGE, db.spec.version)),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(ports),
        env: Some(env),
        volume_mounts: Some(vec![VolumeMount {
            name: "data".to_string(),
            mount_path: "/var/lib/mysql".to_string(),
            ..Default::default()
        }]),
        readiness_probe: Some(ping.clone()),
        liveness_probe: Some(Probe {
            failure_threshold: Some(6),
            ..ping
        }),
        ..Default::default()
    }
}

fn exporter_container(db: &XtraDBCluster, monitor: &MonitorSpec) -> Container {
    let secret = db.auth_secret_name();

    Container {
        name: "exporter".to_string(),
        image: Some(EXPORTER_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(vec![format!("--web.listen-address=:{}", monitor.port)]),
        ports: Some(vec![ContainerPort {
            container_port: monitor.port,
            name: Some("metrics".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(vec![
            secret_env("MYSQLD_EXPORTER_USER", &secret, USERNAME_KEY),
            secret_env("MYSQLD_EXPORTER_PASSWORD", &secret, PASSWORD_KEY),
            plain_env("MYSQLD_EXPORTER_HOST", "127.0.0.1"),
        ]),
        ..Default::default()
    }
}

/// Generate the StatefulSet running the database members
///
/// The StatefulSet references the governing service, the service account
/// and the credentials secret, so those have to exist first.
pub fn generate_statefulset(db: &XtraDBCluster) -> StatefulSet {
    let name = db.name_any();
    let selector = offshoot_selectors(&name);
    let labels = component_labels(&name, "database");

    let mut containers = vec![database_container(db)];
    if let Some(monitor) = &db.spec.monitor {
        containers.push(exporter_container(db, monitor));
    }

    let pvc_template = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some("data".to_string()),
            labels: Some(selector.clone()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: db.spec.storage.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(db.spec.storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: db.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(db)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: governing_service_name(db),
            replicas: Some(db.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            // Galera members must be able to start in parallel to form quorum
            pod_management_policy: Some(if db.is_cluster() {
                "Parallel".to_string()
            } else {
                "OrderedReady".to_string()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(rbac_name(db)),
                    containers,
                    termination_grace_period_seconds: Some(30),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![pvc_template]),
            // Claim lifecycle is driven by the termination policy, never by the StatefulSet
            persistent_volume_claim_retention_policy: Some(
                StatefulSetPersistentVolumeClaimRetentionPolicy {
                    when_deleted: Some("Retain".to_string()),
                    when_scaled: Some("Retain".to_string()),
                },
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}
