//! AppBinding describing how backup and restore tooling reaches a database
//!
//! The AppBinding CRD belongs to the app catalog, not to this operator, so it
//! is handled as a `DynamicObject`.

use kube::ResourceExt;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;

use crate::controller::error::Result;
use crate::crd::XtraDBCluster;
use crate::resources::common::{DATABASE_PORT, RESOURCE_FQN, component_labels, owner_reference};

/// API resource for `appcatalog.appscode.com/v1alpha1 AppBinding`
pub fn app_binding_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("appcatalog.appscode.com", "v1alpha1", "AppBinding"),
        "appbindings",
    )
}

/// Generate the AppBinding for a database
pub fn generate_app_binding(db: &XtraDBCluster) -> Result<DynamicObject> {
    let name = db.name_any();

    let value = json!({
        "apiVersion": "appcatalog.appscode.com/v1alpha1",
        "kind": "AppBinding",
        "metadata": {
            "name": name,
            "namespace": db.namespace(),
            "labels": component_labels(&name, "database"),
            "ownerReferences": [owner_reference(db)],
        },
        "spec": {
            "type": RESOURCE_FQN,
            "version": db.spec.version,
            "clientConfig": {
                "service": {
                    "name": name,
                    "port": DATABASE_PORT,
                    "scheme": "mysql",
                },
            },
            "secret": {
                "name": db.auth_secret_name(),
            },
        },
    });

    Ok(serde_json::from_value(value)?)
}
