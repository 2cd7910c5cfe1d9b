//! Owner references on storage and credentials according to the termination policy
//!
//! A dependent that carries an owner reference to the XtraDBCluster is
//! garbage collected with it; one without is retained. The policy decides,
//! per class of dependent, which of the two states to converge to:
//!
//! | policy  | storage | secrets |
//! |---------|---------|---------|
//! | WipeOut | Destroy | Destroy |
//! | Delete  | Attach  | Detach  |
//! | Halt    | Detach  | Detach  |

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::core::ObjectMeta;
use tracing::{debug, info};

use crate::controller::client::ObjectKind;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::crd::{TerminationPolicy, XtraDBCluster};
use crate::resources::common::{offshoot_selector_string, owner_reference};

/// Class of dependent whose lifetime depends on the termination policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentClass {
    /// PersistentVolumeClaims selected by the offshoot labels
    Storage,
    /// Credentials secrets, by name
    Secrets,
}

impl DependentClass {
    pub const ALL: [DependentClass; 2] = [DependentClass::Storage, DependentClass::Secrets];

    pub fn kind(self) -> ObjectKind {
        match self {
            DependentClass::Storage => ObjectKind::PersistentVolumeClaim,
            DependentClass::Secrets => ObjectKind::Secret,
        }
    }
}

impl fmt::Display for DependentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependentClass::Storage => write!(f, "storage"),
            DependentClass::Secrets => write!(f, "secrets"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipAction {
    /// Ensure an owner reference, so the dependent cascades
    Attach,
    /// Strip owner references, so the dependent is retained
    Detach,
    /// Delete now, and attach whatever is still there
    Destroy,
}

/// Decide what happens to a class of dependents under a policy
pub fn ownership_action(policy: TerminationPolicy, class: DependentClass) -> OwnershipAction {
    match (policy, class) {
        (TerminationPolicy::WipeOut, _) => OwnershipAction::Destroy,
        (TerminationPolicy::Delete, DependentClass::Storage) => OwnershipAction::Attach,
        (TerminationPolicy::Delete, DependentClass::Secrets) => OwnershipAction::Detach,
        (TerminationPolicy::Halt, _) => OwnershipAction::Detach,
    }
}

/// Owner references with `owner` added, `None` if its UID is already present
pub fn with_owner(refs: &[OwnerReference], owner: &OwnerReference) -> Option<Vec<OwnerReference>> {
    if refs.iter().any(|r| r.uid == owner.uid) {
        return None;
    }
    let mut updated = refs.to_vec();
    updated.push(owner.clone());
    Some(updated)
}

/// Owner references without `uid`, `None` if there was nothing to remove
pub fn without_owner(refs: &[OwnerReference], uid: &str) -> Option<Vec<OwnerReference>> {
    if !refs.iter().any(|r| r.uid == uid) {
        return None;
    }
    Some(refs.iter().filter(|r| r.uid != uid).cloned().collect())
}

/// Current objects of a class that belong to `db`.
///
/// Secrets are looked up by name so that an unlabelled auth secret is found.
/// A destroy also sweeps every secret carrying the offshoot labels.
async fn dependents(
    db: &XtraDBCluster,
    ctx: &Context,
    ns: &str,
    class: DependentClass,
    action: OwnershipAction,
) -> Result<Vec<ObjectMeta>> {
    let kind = class.kind();
    let selector = offshoot_selector_string(&db.name_any());
    match class {
        DependentClass::Storage => ctx.kube.list_metadata(ns, &kind, &selector).await,
        DependentClass::Secrets => {
            let mut found = Vec::new();
            for name in db.persistent_secrets() {
                if let Some(meta) = ctx.kube.get_metadata(ns, &kind, &name).await? {
                    found.push(meta);
                }
            }
            if action == OwnershipAction::Destroy {
                for meta in ctx.kube.list_metadata(ns, &kind, &selector).await? {
                    if !found.iter().any(|f| f.name == meta.name) {
                        found.push(meta);
                    }
                }
            }
            Ok(found)
        }
    }
}

async fn attach(
    ctx: &Context,
    ns: &str,
    kind: &ObjectKind,
    objects: &[ObjectMeta],
    owner: &OwnerReference,
) -> Result<()> {
    for meta in objects {
        let name = meta.name.as_deref().ok_or(Error::MissingObjectKey("metadata.name"))?;
        let current = meta.owner_references.as_deref().unwrap_or_default();
        if let Some(refs) = with_owner(current, owner) {
            ctx.kube.set_owner_references(ns, kind, name, refs).await?;
            debug!(%kind, name, "Attached owner reference");
        }
    }
    Ok(())
}

async fn detach(
    ctx: &Context,
    ns: &str,
    kind: &ObjectKind,
    objects: &[ObjectMeta],
    uid: &str,
) -> Result<()> {
    for meta in objects {
        let name = meta.name.as_deref().ok_or(Error::MissingObjectKey("metadata.name"))?;
        let current = meta.owner_references.as_deref().unwrap_or_default();
        if let Some(refs) = without_owner(current, uid) {
            ctx.kube.set_owner_references(ns, kind, name, refs).await?;
            debug!(%kind, name, "Detached owner reference");
        }
    }
    Ok(())
}

async fn apply_action(
    db: &XtraDBCluster,
    ctx: &Context,
    ns: &str,
    class: DependentClass,
    action: OwnershipAction,
    owner: &OwnerReference,
) -> Result<()> {
    let kind = class.kind();
    let objects = dependents(db, ctx, ns, class, action).await?;

    match action {
        OwnershipAction::Attach => attach(ctx, ns, &kind, &objects, owner).await,
        OwnershipAction::Detach => detach(ctx, ns, &kind, &objects, &owner.uid).await,
        OwnershipAction::Destroy => {
            for meta in &objects {
                if let Some(name) = meta.name.as_deref() {
                    ctx.kube.delete(ns, &kind, name).await?;
                }
            }
            // Objects held by their own finalizers survive the delete call
            let remaining = dependents(db, ctx, ns, class, action).await?;
            attach(ctx, ns, &kind, &remaining, owner).await
        }
    }
}

/// Converge owner references on storage and secrets to the termination policy
pub async fn apply_termination_ownership(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<()> {
    if db.metadata.uid.is_none() {
        return Err(Error::MissingObjectKey("metadata.uid"));
    }
    let owner = owner_reference(db);
    let policy = db.spec.termination_policy;

    for class in DependentClass::ALL {
        let action = ownership_action(policy, class);
        info!(%policy, %class, ?action, "Applying termination ownership");
        apply_action(db, ctx, ns, class, action, &owner)
            .await
            .map_err(Error::ownership(class))?;
    }

    Ok(())
}
