//! Kubernetes API seam for the XtraDBCluster controller
//!
//! Every API call the orchestrators make goes through [`KubeClient`], so the
//! orchestration logic can be driven against a mock or an in-memory fake in
//! tests while production uses [`KubeClientImpl`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::ObjectMeta;
use kube::runtime::wait::await_condition;
use kube::{Api, Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::ensure::Verb;
use crate::controller::error::{Error, Result};
use crate::controller::status::StatusUpdate;
use crate::crd::{XtraDBCluster, XtraDBClusterStatus};
use crate::resources::common::FIELD_MANAGER;

/// Attempts made by [`KubeClient::update_status`] before giving up on conflicts
pub const STATUS_UPDATE_ATTEMPTS: u32 = 5;

/// Kind of a namespaced object the controller reads or writes
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Service,
    Secret,
    StatefulSet,
    ServiceAccount,
    Role,
    RoleBinding,
    PersistentVolumeClaim,
    /// A kind whose CRD belongs to another project
    Dynamic(ApiResource),
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Service => write!(f, "Service"),
            ObjectKind::Secret => write!(f, "Secret"),
            ObjectKind::StatefulSet => write!(f, "StatefulSet"),
            ObjectKind::ServiceAccount => write!(f, "ServiceAccount"),
            ObjectKind::Role => write!(f, "Role"),
            ObjectKind::RoleBinding => write!(f, "RoleBinding"),
            ObjectKind::PersistentVolumeClaim => write!(f, "PersistentVolumeClaim"),
            ObjectKind::Dynamic(ar) => write!(f, "{}", ar.kind),
        }
    }
}

/// A generated dependent object ready to be applied
#[derive(Debug, Clone)]
pub enum Dependent {
    Service(Service),
    Secret(Secret),
    StatefulSet(StatefulSet),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    Dynamic(DynamicObject, ApiResource),
}

impl Dependent {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Dependent::Service(_) => ObjectKind::Service,
            Dependent::Secret(_) => ObjectKind::Secret,
            Dependent::StatefulSet(_) => ObjectKind::StatefulSet,
            Dependent::ServiceAccount(_) => ObjectKind::ServiceAccount,
            Dependent::Role(_) => ObjectKind::Role,
            Dependent::RoleBinding(_) => ObjectKind::RoleBinding,
            Dependent::Dynamic(_, ar) => ObjectKind::Dynamic(ar.clone()),
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Dependent::Service(o) => &o.metadata,
            Dependent::Secret(o) => &o.metadata,
            Dependent::StatefulSet(o) => &o.metadata,
            Dependent::ServiceAccount(o) => &o.metadata,
            Dependent::Role(o) => &o.metadata,
            Dependent::RoleBinding(o) => &o.metadata,
            Dependent::Dynamic(o, _) => &o.metadata,
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.metadata()
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey("metadata.name"))
    }
}

/// Trait abstracting the Kubernetes API operations used by the controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Merge `update` into the current status of an XtraDBCluster.
    ///
    /// Reads the latest object, applies the update and writes it back guarded
    /// by `resourceVersion`, retrying on conflict. Returns the status as
    /// stored; no write is made when the update changes nothing.
    async fn update_status(
        &self,
        ns: &str,
        name: &str,
        update: &StatusUpdate,
    ) -> Result<XtraDBClusterStatus>;

    /// Add a finalizer to an XtraDBCluster if it is not present
    async fn add_finalizer(&self, ns: &str, name: &str, finalizer: &str) -> Result<()>;

    /// Remove a finalizer from an XtraDBCluster
    async fn remove_finalizer(&self, ns: &str, name: &str, finalizer: &str) -> Result<()>;

    /// Server-side apply a dependent and report what happened
    async fn apply(&self, ns: &str, object: Dependent) -> Result<Verb>;

    /// Metadata of an object, `None` when it does not exist
    async fn get_metadata(&self, ns: &str, kind: &ObjectKind, name: &str)
    -> Result<Option<ObjectMeta>>;

    /// Metadata of every object matching a label selector
    async fn list_metadata(
        &self,
        ns: &str,
        kind: &ObjectKind,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>>;

    /// Delete an object; a missing object is not an error
    async fn delete(&self, ns: &str, kind: &ObjectKind, name: &str) -> Result<()>;

    /// Replace the owner references of an object
    async fn set_owner_references(
        &self,
        ns: &str,
        kind: &ObjectKind,
        name: &str,
        owner_references: Vec<OwnerReference>,
    ) -> Result<()>;

    /// Set the replica count of a StatefulSet through its scale subresource
    async fn scale_statefulset(&self, ns: &str, name: &str, replicas: i32) -> Result<()>;

    /// Wait until a StatefulSet reports zero replicas or no longer exists
    async fn wait_for_scale_down(&self, ns: &str, name: &str, timeout: Duration) -> Result<()>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Runs `$body` with `$api` bound to an `Api` for the given kind
macro_rules! with_api {
    ($client:expr, $ns:expr, $kind:expr, |$api:ident| $body:expr) => {
        match $kind {
            ObjectKind::Service => {
                let $api: Api<Service> = Api::namespaced($client, $ns);
                $body
            }
            ObjectKind::Secret => {
                let $api: Api<Secret> = Api::namespaced($client, $ns);
                $body
            }
            ObjectKind::StatefulSet => {
                let $api: Api<StatefulSet> = Api::namespaced($client, $ns);
                $body
            }
            ObjectKind::ServiceAccount => {
                let $api: Api<ServiceAccount> = Api::namespaced($client, $ns);
                $body
            }
            ObjectKind::Role => {
                let $api: Api<Role> = Api::namespaced($client, $ns);
                $body
            }
            ObjectKind::RoleBinding => {
                let $api: Api<RoleBinding> = Api::namespaced($client, $ns);
                $body
            }
            ObjectKind::PersistentVolumeClaim => {
                let $api: Api<PersistentVolumeClaim> = Api::namespaced($client, $ns);
                $body
            }
            ObjectKind::Dynamic(ar) => {
                let $api: Api<DynamicObject> = Api::namespaced_with($client, $ns, ar);
                $body
            }
        }
    };
}

/// Server-side apply through `api`, comparing resourceVersion before and after
async fn apply_with<K>(api: Api<K>, object: &K) -> Result<Verb>
where
    K: Resource + Serialize + DeserializeOwned + Clone + fmt::Debug,
{
    let name = object
        .meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;

    let before = api.get_opt(&name).await?;
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let after = api.patch(&name, &params, &Patch::Apply(object)).await?;

    let verb = Verb::classify(
        before.as_ref().and_then(|o| o.meta().resource_version.as_deref()),
        after.meta().resource_version.as_deref(),
    );
    debug!(name = %name, ?verb, "Applied resource");
    Ok(verb)
}

fn ignore_not_found(result: std::result::Result<(), kube::Error>) -> Result<()> {
    match result {
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        other => other.map_err(Error::from),
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn update_status(
        &self,
        ns: &str,
        name: &str,
        update: &StatusUpdate,
    ) -> Result<XtraDBClusterStatus> {
        let api: Api<XtraDBCluster> = Api::namespaced(self.client.clone(), ns);

        for attempt in 1..=STATUS_UPDATE_ATTEMPTS {
            let current = api.get_status(name).await?;
            let mut status = current.status.clone().unwrap_or_default();
            if !update.apply_to(&mut status)? {
                return Ok(status);
            }

            // resourceVersion makes the API server reject stale writes with 409
            let patch = serde_json::json!({
                "metadata": { "resourceVersion": current.resource_version() },
                "status": &status,
            });

            match api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(updated) => return Ok(updated.status.unwrap_or(status)),
                Err(kube::Error::Api(ae)) if ae.code == 409 => {
                    debug!(attempt, "Status update conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::StatusConflict(STATUS_UPDATE_ATTEMPTS))
    }

    async fn add_finalizer(&self, ns: &str, name: &str, finalizer: &str) -> Result<()> {
        let api: Api<XtraDBCluster> = Api::namespaced(self.client.clone(), ns);

        let db = api.get(name).await?;
        let mut finalizers = db.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": db.metadata.resource_version,
                "finalizers": finalizers
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        Ok(())
    }

    async fn remove_finalizer(&self, ns: &str, name: &str, finalizer: &str) -> Result<()> {
        let api: Api<XtraDBCluster> = Api::namespaced(self.client.clone(), ns);

        let Some(db) = api.get_opt(name).await? else {
            return Ok(());
        };
        let finalizers: Vec<String> = db
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": db.metadata.resource_version,
                "finalizers": finalizers
            }
        });
        ignore_not_found(
            api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map(|_| ()),
        )
    }

    async fn apply(&self, ns: &str, object: Dependent) -> Result<Verb> {
        let client = self.client.clone();
        match &object {
            Dependent::Service(o) => apply_with(Api::namespaced(client, ns), o).await,
            Dependent::Secret(o) => apply_with(Api::namespaced(client, ns), o).await,
            Dependent::StatefulSet(o) => apply_with(Api::namespaced(client, ns), o).await,
            Dependent::ServiceAccount(o) => apply_with(Api::namespaced(client, ns), o).await,
            Dependent::Role(o) => apply_with(Api::namespaced(client, ns), o).await,
            Dependent::RoleBinding(o) => apply_with(Api::namespaced(client, ns), o).await,
            Dependent::Dynamic(o, ar) => {
                apply_with(Api::namespaced_with(client, ns, ar), o).await
            }
        }
    }

    async fn get_metadata(
        &self,
        ns: &str,
        kind: &ObjectKind,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        with_api!(self.client.clone(), ns, kind, |api| {
            Ok(api.get_opt(name).await?.map(|o| o.meta().clone()))
        })
    }

    async fn list_metadata(
        &self,
        ns: &str,
        kind: &ObjectKind,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>> {
        let params = ListParams::default().labels(selector);
        with_api!(self.client.clone(), ns, kind, |api| {
            Ok(api
                .list_metadata(&params)
                .await?
                .items
                .into_iter()
                .map(|o| o.metadata)
                .collect())
        })
    }

    async fn delete(&self, ns: &str, kind: &ObjectKind, name: &str) -> Result<()> {
        let params = DeleteParams::background();
        with_api!(self.client.clone(), ns, kind, |api| {
            let result = api.delete(name, &params).await.map(|_| ());
            if result.is_ok() {
                debug!(kind = %kind, name, "Deleted object");
            }
            ignore_not_found(result)
        })
    }

    async fn set_owner_references(
        &self,
        ns: &str,
        kind: &ObjectKind,
        name: &str,
        owner_references: Vec<OwnerReference>,
    ) -> Result<()> {
        // Merge patches replace lists wholesale
        let patch = serde_json::json!({
            "metadata": { "ownerReferences": owner_references }
        });
        with_api!(self.client.clone(), ns, kind, |api| {
            api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            Ok(())
        })
    }

    async fn scale_statefulset(&self, ns: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });

        ignore_not_found(
            api.patch_scale(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map(|_| ()),
        )
    }

    async fn wait_for_scale_down(&self, ns: &str, name: &str, timeout: Duration) -> Result<()> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);

        let stopped = |sts: Option<&StatefulSet>| {
            sts.is_none_or(|sts| sts.status.as_ref().is_none_or(|s| s.replicas == 0))
        };

        match tokio::time::timeout(timeout, await_condition(api, name, stopped)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(Error::Timeout(format!(
                "StatefulSet {} to scale down after {:?}",
                name, timeout
            ))),
        }
    }
}
