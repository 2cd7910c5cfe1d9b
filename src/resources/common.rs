//! Common utilities for Kubernetes resource generation
//!
//! This module provides shared functions and constants used across
//! all resource generators so that every dependent object carries the
//! same offshoot labels and owner reference.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::XtraDBCluster;

/// API version for XtraDBCluster CRD
pub const API_VERSION: &str = "xtradb-operator.smoketurner.com/v1alpha1";

/// Kind for XtraDBCluster CRD
pub const KIND: &str = "XtraDBCluster";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "xtradb-operator";

/// Value of `app.kubernetes.io/name` on every offshoot
pub const RESOURCE_FQN: &str = "xtradbclusters.xtradb-operator.smoketurner.com";

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";

/// MySQL client port
pub const DATABASE_PORT: i32 = 3306;

/// Generate a controller owner reference for an XtraDBCluster
///
/// Dependents carrying this reference are garbage collected when the
/// cluster is deleted.
pub fn owner_reference(db: &XtraDBCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: db.name_any(),
        uid: db.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels identifying every object that belongs to one database instance
pub fn offshoot_selectors(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), RESOURCE_FQN.to_string()),
        (LABEL_INSTANCE.to_string(), name.to_string()),
        (LABEL_MANAGED_BY.to_string(), FIELD_MANAGER.to_string()),
    ])
}

/// Offshoot selectors rendered as a list label selector
pub fn offshoot_selector_string(name: &str) -> String {
    offshoot_selectors(name)
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Offshoot labels plus a component label
pub fn component_labels(name: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = offshoot_selectors(name);
    labels.insert(LABEL_COMPONENT.to_string(), component.to_string());
    labels
}

/// Name of the headless service that governs the StatefulSet
pub fn governing_service_name(db: &XtraDBCluster) -> String {
    format!("{}-pods", db.name_any())
}

/// Name of the monitoring stats service
pub fn stats_service_name(db: &XtraDBCluster) -> String {
    format!("{}-stats", db.name_any())
}

/// Name shared by the ServiceAccount, Role and RoleBinding
pub fn rbac_name(db: &XtraDBCluster) -> String {
    db.name_any()
}
