//! Idempotent create-or-patch of every dependent object
//!
//! Each step applies one generated object and reports a [`Verb`]. Step
//! failures are wrapped with the step name so the reconcile error says which
//! dependent could not be written.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::client::{Dependent, ObjectKind};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::crd::{MonitorAgent, XtraDBCluster};
use crate::resources::{binding, common, monitor, rbac, secret, service, statefulset};

/// What an apply did to the live object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Unchanged,
    Created,
    Patched,
}

impl Verb {
    /// Classify an apply from the resourceVersion before (if the object
    /// existed) and after.
    pub fn classify(before: Option<&str>, after: Option<&str>) -> Self {
        match before {
            None => Verb::Created,
            Some(before) if Some(before) == after => Verb::Unchanged,
            Some(_) => Verb::Patched,
        }
    }
}

/// Verbs of the steps that decide the provisioning event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionReport {
    pub governing_service: Verb,
    pub rbac: Verb,
    pub primary_service: Verb,
    pub auth_secret: Verb,
    pub statefulset: Verb,
}

impl ProvisionReport {
    /// Note for the single `Successful` event, `None` when nothing changed
    pub fn event_message(&self) -> Option<&'static str> {
        match combine(&[
            self.governing_service,
            self.rbac,
            self.primary_service,
            self.auth_secret,
            self.statefulset,
        ]) {
            Verb::Created => Some("Successfully created XtraDBCluster"),
            Verb::Patched => Some("Successfully patched XtraDBCluster"),
            Verb::Unchanged => None,
        }
    }
}

/// Combine the verbs of several applies that form one logical step
fn combine(verbs: &[Verb]) -> Verb {
    if verbs.contains(&Verb::Created) {
        Verb::Created
    } else if verbs.contains(&Verb::Patched) {
        Verb::Patched
    } else {
        Verb::Unchanged
    }
}

async fn apply(ctx: &Context, ns: &str, step: &'static str, object: Dependent) -> Result<Verb> {
    let kind = object.kind();
    let verb = ctx.kube.apply(ns, object).await.map_err(Error::ensure(step))?;
    debug!(step, %kind, ?verb, "Ensured dependent");
    Ok(verb)
}

pub async fn ensure_governing_service(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Verb> {
    let svc = service::generate_governing_service(db);
    apply(ctx, ns, "governing service", Dependent::Service(svc)).await
}

/// ServiceAccount, Role and RoleBinding for the database pods
pub async fn ensure_rbac(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Verb> {
    let sa = apply(
        ctx,
        ns,
        "service account",
        Dependent::ServiceAccount(rbac::generate_service_account(db)),
    )
    .await?;
    let role = apply(ctx, ns, "role", Dependent::Role(rbac::generate_role(db))).await?;
    let binding = apply(
        ctx,
        ns,
        "role binding",
        Dependent::RoleBinding(rbac::generate_role_binding(db)),
    )
    .await?;
    Ok(combine(&[sa, role, binding]))
}

pub async fn ensure_primary_service(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Verb> {
    let svc = service::generate_primary_service(db);
    apply(ctx, ns, "primary service", Dependent::Service(svc)).await
}

/// Create the credentials secret unless it already exists.
///
/// An existing secret is never regenerated, and an externally managed one is
/// never created.
pub async fn ensure_auth_secret(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Verb> {
    let name = db.auth_secret_name();
    let existing = ctx
        .kube
        .get_metadata(ns, &ObjectKind::Secret, &name)
        .await
        .map_err(Error::ensure("auth secret"))?;

    if existing.is_some() {
        return Ok(Verb::Unchanged);
    }
    if db
        .spec
        .auth_secret
        .as_ref()
        .is_some_and(|s| s.externally_managed)
    {
        return Err(Error::ensure("auth secret")(Error::ValidationError(format!(
            "externally managed secret {} does not exist",
            name
        ))));
    }

    info!(secret = %name, "Creating credentials secret");
    let secret = secret::generate_auth_secret(db);
    apply(ctx, ns, "auth secret", Dependent::Secret(secret)).await
}

pub async fn ensure_statefulset(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Verb> {
    let sts = statefulset::generate_statefulset(db);
    apply(ctx, ns, "statefulset", Dependent::StatefulSet(sts)).await
}

pub async fn ensure_app_binding(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Verb> {
    let app_binding = binding::generate_app_binding(db).map_err(Error::ensure("app binding"))?;
    apply(
        ctx,
        ns,
        "app binding",
        Dependent::Dynamic(app_binding, binding::app_binding_resource()),
    )
    .await
}

/// Ensure dependents in order: governing service, RBAC, primary service,
/// credentials secret, StatefulSet. Stops at the first failure.
pub async fn ensure_dependents(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<ProvisionReport> {
    let governing_service = ensure_governing_service(db, ctx, ns).await?;
    let rbac = ensure_rbac(db, ctx, ns).await?;
    let primary_service = ensure_primary_service(db, ctx, ns).await?;
    let auth_secret = ensure_auth_secret(db, ctx, ns).await?;
    let statefulset = ensure_statefulset(db, ctx, ns).await?;

    Ok(ProvisionReport {
        governing_service,
        rbac,
        primary_service,
        auth_secret,
        statefulset,
    })
}

/// Ensure the stats service and, for the Prometheus Operator agent, the
/// ServiceMonitor. Removes both when monitoring is not configured.
pub async fn ensure_monitoring(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Verb> {
    let Some(spec) = &db.spec.monitor else {
        delete_monitoring(db, ctx, ns).await?;
        return Ok(Verb::Unchanged);
    };

    let stats = apply(
        ctx,
        ns,
        "stats service",
        Dependent::Service(service::generate_stats_service(db, spec)),
    )
    .await?;

    let service_monitor = match spec.agent {
        MonitorAgent::PrometheusOperator => {
            let sm = monitor::generate_service_monitor(db, spec)
                .map_err(Error::ensure("service monitor"))?;
            apply(
                ctx,
                ns,
                "service monitor",
                Dependent::Dynamic(sm, monitor::service_monitor_resource()),
            )
            .await?
        }
        MonitorAgent::PrometheusBuiltin => {
            delete_service_monitor(db, ctx, ns).await?;
            Verb::Unchanged
        }
    };

    Ok(combine(&[stats, service_monitor]))
}

async fn delete_service_monitor(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<()> {
    ctx.kube
        .delete(
            ns,
            &ObjectKind::Dynamic(monitor::service_monitor_resource()),
            &common::stats_service_name(db),
        )
        .await
        .map_err(Error::ensure("service monitor"))
}

/// Delete the stats service and ServiceMonitor; missing objects are fine
pub async fn delete_monitoring(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<()> {
    delete_service_monitor(db, ctx, ns).await?;
    ctx.kube
        .delete(ns, &ObjectKind::Service, &common::stats_service_name(db))
        .await
        .map_err(Error::ensure("stats service"))?;
    debug!(name = %db.name_any(), "Monitoring objects removed");
    Ok(())
}
