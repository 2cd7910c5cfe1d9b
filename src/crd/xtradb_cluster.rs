use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// XtraDBCluster is the Schema for the xtradbclusters API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "xtradb-operator.smoketurner.com",
    version = "v1alpha1",
    kind = "XtraDBCluster",
    plural = "xtradbclusters",
    shortname = "xdb",
    namespaced,
    status = "XtraDBClusterStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Policy", "type":"string", "jsonPath":".spec.terminationPolicy"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct XtraDBClusterSpec {
    /// Percona XtraDB Cluster version (e.g., "8.0.36")
    pub version: String,

    /// Number of members
    /// - 1 = standalone server
    /// - 3+ = Galera cluster (multi-node)
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Storage configuration for the data volumes
    pub storage: StorageSpec,

    /// Scale the workload to zero while keeping storage and credentials
    #[serde(default)]
    pub halted: bool,

    /// What happens to volumes and secrets when the resource is deleted
    #[serde(default)]
    pub termination_policy: TerminationPolicy,

    /// Initialization behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<InitSpec>,

    /// Monitoring configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorSpec>,

    /// Credentials secret to use instead of a generated one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<SecretReference>,
}

fn default_replicas() -> i32 {
    1
}

/// Storage configuration for data volumes
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage class name (uses default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Size of the persistent volume (e.g., "10Gi")
    pub size: String,
}

/// Termination policy applied when the resource is deleted
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Keep volumes and secrets, only remove the workload
    #[serde(alias = "Pause")]
    Halt,
    /// Delete volumes, keep secrets
    #[default]
    Delete,
    /// Delete volumes and secrets
    WipeOut,
}

impl JsonSchema for TerminationPolicy {
    fn schema_name() -> String {
        "TerminationPolicy".to_string()
    }

    fn json_schema(_gen: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        // `Pause` is the deprecated spelling of `Halt`
        let values = ["Halt", "Delete", "WipeOut", "Pause"];
        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            enum_values: Some(values.iter().map(|v| serde_json::json!(v)).collect()),
            metadata: Some(Box::new(schemars::schema::Metadata {
                description: Some(
                    "Termination policy: 'Halt', 'Delete' or 'WipeOut' ('Pause' is read as 'Halt')"
                        .to_string(),
                ),
                ..Default::default()
            })),
            ..Default::default()
        })
    }
}

impl std::fmt::Display for TerminationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationPolicy::Halt => write!(f, "Halt"),
            TerminationPolicy::Delete => write!(f, "Delete"),
            TerminationPolicy::WipeOut => write!(f, "WipeOut"),
        }
    }
}

/// Initialization configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitSpec {
    /// Hold provisioning until an external tool restores the initial data
    /// and sets the DatabaseDataRestored condition
    #[serde(default)]
    pub wait_for_initial_restore: bool,
}

/// Monitoring agent
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum MonitorAgent {
    /// Expose a stats service and create a ServiceMonitor
    #[default]
    #[serde(rename = "prometheus.io/operator")]
    PrometheusOperator,
    /// Expose a stats service annotated for scraping
    #[serde(rename = "prometheus.io/builtin")]
    PrometheusBuiltin,
}

/// Monitoring configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    /// Agent that scrapes the exporter
    #[serde(default)]
    pub agent: MonitorAgent,

    /// Exporter port
    #[serde(default = "default_exporter_port")]
    pub port: i32,

    /// Scrape interval (e.g., "30s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Extra labels for the ServiceMonitor (used by Prometheus selectors)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_exporter_port() -> i32 {
    56790
}

/// Reference to a credentials secret
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,

    /// The secret is created and owned by the user, not the operator
    #[serde(default)]
    pub externally_managed: bool,
}

/// Status of the XtraDBCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct XtraDBClusterStatus {
    /// Current lifecycle phase; unset until first reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DatabasePhase>,

    /// Generation last acted on together with a phase change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Database lifecycle phase
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub enum DatabasePhase {
    /// Dependents are being created
    Provisioning,
    /// The database is serving
    Ready,
    /// The workload is scaled to zero, data retained
    Halted,
    /// The resource is being deleted
    Terminating,
}

impl std::fmt::Display for DatabasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabasePhase::Provisioning => write!(f, "Provisioning"),
            DatabasePhase::Ready => write!(f, "Ready"),
            DatabasePhase::Halted => write!(f, "Halted"),
            DatabasePhase::Terminating => write!(f, "Terminating"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl XtraDBCluster {
    /// Whether this resource runs as a multi-member Galera cluster
    pub fn is_cluster(&self) -> bool {
        self.spec.replicas > 1
    }

    /// Whether an initial restore was requested
    pub fn waits_for_initial_restore(&self) -> bool {
        self.spec
            .init
            .as_ref()
            .is_some_and(|init| init.wait_for_initial_restore)
    }

    /// Current phase, `None` when the status has never been written
    pub fn phase(&self) -> Option<DatabasePhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// Current conditions (empty when status is unset)
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Name of the credentials secret
    pub fn auth_secret_name(&self) -> String {
        match &self.spec.auth_secret {
            Some(reference) => reference.name.clone(),
            None => format!("{}-auth", self.metadata.name.as_deref().unwrap_or_default()),
        }
    }

    /// Secrets holding state that must outlive a `Delete` termination
    pub fn persistent_secrets(&self) -> Vec<String> {
        vec![self.auth_secret_name()]
    }
}
