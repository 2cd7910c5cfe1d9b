//! RBAC objects for database pods
//!
//! Members only need to read pods and endpoints in their namespace to
//! discover peers, so a namespaced Role is enough.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::XtraDBCluster;
use crate::resources::common::{offshoot_selectors, owner_reference, rbac_name};

fn metadata(db: &XtraDBCluster) -> ObjectMeta {
    ObjectMeta {
        name: Some(rbac_name(db)),
        namespace: db.namespace(),
        labels: Some(offshoot_selectors(&db.name_any())),
        owner_references: Some(vec![owner_reference(db)]),
        ..Default::default()
    }
}

/// Generate the ServiceAccount the StatefulSet pods run as
pub fn generate_service_account(db: &XtraDBCluster) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(db),
        ..Default::default()
    }
}

/// Generate the Role granting read access for peer discovery
pub fn generate_role(db: &XtraDBCluster) -> Role {
    Role {
        metadata: metadata(db),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["pods".to_string(), "endpoints".to_string()]),
            verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
            ..Default::default()
        }]),
    }
}

/// Generate the RoleBinding between the ServiceAccount and the Role
pub fn generate_role_binding(db: &XtraDBCluster) -> RoleBinding {
    let name = rbac_name(db);

    RoleBinding {
        metadata: metadata(db),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name,
            namespace: db.namespace(),
            ..Default::default()
        }]),
    }
}
