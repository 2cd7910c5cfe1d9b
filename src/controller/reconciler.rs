//! Reconciliation logic for XtraDBCluster resources
//!
//! `reconcile` dispatches to one of three orchestrators:
//! - `terminate` when the resource is being deleted
//! - `halt` when `spec.halted` is set
//! - `create` otherwise
//!
//! Every orchestrator is safe to run repeatedly. Each side effect converges
//! on its own, so a reconcile that fails half way resumes on the next run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::events::{actions, reasons};
use crate::controller::restore_gate::{GateDecision, restore_gate};
use crate::controller::status::{StatusUpdate, condition_status, condition_types};
use crate::controller::{ensure, ownership, validation};
use crate::crd::{Condition, DatabasePhase, TerminationPolicy, XtraDBCluster};

/// Finalizer held until termination ownership has been applied
pub const FINALIZER: &str = "xtradb-operator.smoketurner.com/finalizer";

/// How often a database waiting for its initial restore is re-checked
const RESTORE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Result of the create orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The spec failed validation; nothing was changed
    Invalid,
    /// Provisioning is held by the restore gate
    AwaitingRestore,
    /// All dependents exist and the phase is Ready
    Ready,
}

fn object_key(db: &XtraDBCluster) -> String {
    format!("{}/{}", db.namespace().unwrap_or_default(), db.name_any())
}

/// Main reconciliation function
#[instrument(skip(db, ctx), fields(name = %db.name_any(), namespace = %db.namespace().unwrap_or_default()))]
pub async fn reconcile(db: Arc<XtraDBCluster>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = db
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = db.name_any();

    debug!("Reconciling XtraDBCluster");
    let result = dispatch(&db, &ctx, &ns).await;

    match &result {
        Ok(_) => {
            ctx.reset_attempts(&object_key(&db));
            if let Some(health) = &ctx.health {
                health
                    .metrics
                    .record_reconcile(&ns, &name, start.elapsed().as_secs_f64());
                health.touch();
            }
        }
        Err(e) => {
            error!(error = %e, "Reconciliation failed");
            if let Some(health) = &ctx.health {
                health.metrics.record_error(&ns, &name);
            }
        }
    }

    result
}

async fn dispatch(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Action> {
    let name = db.name_any();

    if db.metadata.deletion_timestamp.is_some() {
        if has_finalizer(db) {
            terminate(db, ctx, ns).await?;
            ctx.kube.remove_finalizer(ns, &name, FINALIZER).await?;
            info!("Removed finalizer");
        }
        if let Some(health) = &ctx.health {
            health.metrics.forget(ns, &name);
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer(db) {
        ctx.kube.add_finalizer(ns, &name, FINALIZER).await?;
        info!("Added finalizer");
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    if db.spec.halted {
        if let Err(e) = halt(db, ctx, ns).await {
            if let Error::PolicyViolation(msg) = &e {
                publish(db, ctx, EventType::Warning, reasons::INVALID, actions::HALT, msg.clone())
                    .await;
            }
            return Err(e);
        }
        return Ok(Action::await_change());
    }

    match create(db, ctx, ns).await? {
        Outcome::Invalid => Ok(Action::await_change()),
        Outcome::AwaitingRestore => Ok(Action::requeue(RESTORE_POLL_INTERVAL)),
        Outcome::Ready => Ok(Action::requeue(ctx.config.requeue_interval)),
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(db: Arc<XtraDBCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let attempt = ctx.next_attempt(&object_key(&db));
    let delay = ctx.backoff.delay_for_error(error, attempt);

    if error.is_retryable() {
        warn!(
            name = %db.name_any(),
            attempt,
            "Retryable error: {}, requeuing in {:?}",
            error,
            delay
        );
    } else {
        error!(
            name = %db.name_any(),
            "Non-retryable error: {}, requeuing in {:?}",
            error,
            delay
        );
    }

    Action::requeue(delay)
}

async fn publish(
    db: &XtraDBCluster,
    ctx: &Context,
    type_: EventType,
    reason: &str,
    action: &str,
    note: impl Into<String>,
) {
    ctx.events
        .publish(&db.object_ref(&()), type_, reason, action, Some(note.into()))
        .await;
}

fn record_phase(ctx: &Context, ns: &str, name: &str, phase: DatabasePhase) {
    if let Some(health) = &ctx.health {
        health.metrics.set_phase(ns, name, phase);
    }
}

/// Provision the database and its dependents.
///
/// Validation failures are reported as a Warning event and return
/// `Outcome::Invalid` without touching anything.
pub async fn create(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<Outcome> {
    let name = db.name_any();

    if let Err(e) = validation::validate(db, ctx, ns).await {
        return match e {
            Error::ValidationError(msg) => {
                warn!(reason = %msg, "XtraDBCluster is invalid");
                publish(db, ctx, EventType::Warning, reasons::INVALID, actions::CREATE, msg).await;
                Ok(Outcome::Invalid)
            }
            other => Err(other),
        };
    }

    let mut conditions: Vec<Condition> = db.conditions().to_vec();

    // Unset on first sight; Halted when spec.halted was cleared
    if matches!(db.phase(), None | Some(DatabasePhase::Halted)) {
        let status = ctx
            .kube
            .update_status(ns, &name, &StatusUpdate::phase(DatabasePhase::Provisioning))
            .await?;
        conditions = status.conditions;
        record_phase(ctx, ns, &name, DatabasePhase::Provisioning);
        info!("Provisioning XtraDBCluster");
    }

    let restore_requested = db.waits_for_initial_restore();

    // A cluster must not start members before the data is restored
    if restore_requested && db.is_cluster() && restore_gate(&conditions) == GateDecision::Wait {
        info!("Waiting for initial data restore before creating the StatefulSet");
        record_restore_wait(ctx, ns, &name);
        return Ok(Outcome::AwaitingRestore);
    }

    let report = ensure::ensure_dependents(db, ctx, ns).await?;
    if let Some(note) = report.event_message() {
        publish(db, ctx, EventType::Normal, reasons::SUCCESSFUL, actions::CREATE, note).await;
    }

    ensure::ensure_app_binding(db, ctx, ns).await?;

    // A standalone server runs the restore itself, so it only waits to be marked Ready
    if restore_requested && !db.is_cluster() && restore_gate(&conditions) == GateDecision::Wait {
        info!("Waiting for initial data restore before marking the database ready");
        record_restore_wait(ctx, ns, &name);
        return Ok(Outcome::AwaitingRestore);
    }

    let update = StatusUpdate::phase_with_generation(DatabasePhase::Ready, db.metadata.generation)
        .with_condition(
            condition_types::DATABASE_PROVISIONED,
            condition_status::TRUE,
            "Provisioned",
            "All dependents have been created",
        );
    ctx.kube.update_status(ns, &name, &update).await?;
    record_phase(ctx, ns, &name, DatabasePhase::Ready);

    if let Err(e) = ensure::ensure_monitoring(db, ctx, ns).await {
        let reason = if db.spec.monitor.is_some() {
            reasons::FAILED_TO_CREATE
        } else {
            reasons::FAILED_TO_DELETE
        };
        warn!(error = %e, "Failed to reconcile monitoring");
        publish(
            db,
            ctx,
            EventType::Warning,
            reason,
            actions::MONITOR,
            format!("Failed to reconcile monitoring: {}", e),
        )
        .await;
    }

    Ok(Outcome::Ready)
}

fn record_restore_wait(ctx: &Context, ns: &str, name: &str) {
    if let Some(health) = &ctx.health {
        health.metrics.record_restore_wait(ns, name);
    }
}

/// Scale the database to zero while keeping storage and credentials.
///
/// Only allowed when the termination policy is `Halt`.
pub async fn halt(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<()> {
    if db.spec.termination_policy != TerminationPolicy::Halt {
        return Err(Error::PolicyViolation(
            "can't halt db. 'spec.terminationPolicy' is not 'Halt'".to_string(),
        ));
    }

    let name = db.name_any();
    let generation = db.metadata.generation;
    let observed = db.status.as_ref().and_then(|s| s.observed_generation);

    if db.phase() == Some(DatabasePhase::Halted) && observed == generation {
        debug!("Already halted");
        return Ok(());
    }

    if db.phase().is_none() {
        ctx.kube
            .update_status(ns, &name, &StatusUpdate::phase(DatabasePhase::Provisioning))
            .await?;
    }

    info!("Halting XtraDBCluster");
    ctx.kube.scale_statefulset(ns, &name, 0).await?;
    ctx.kube
        .wait_for_scale_down(ns, &name, ctx.config.halt_timeout)
        .await?;

    ctx.kube
        .update_status(
            ns,
            &name,
            &StatusUpdate::phase_with_generation(DatabasePhase::Halted, generation),
        )
        .await?;
    record_phase(ctx, ns, &name, DatabasePhase::Halted);

    publish(
        db,
        ctx,
        EventType::Normal,
        reasons::HALTED,
        actions::HALT,
        "Successfully halted XtraDBCluster",
    )
    .await;

    Ok(())
}

/// Apply the termination policy before the resource goes away
pub async fn terminate(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<()> {
    let name = db.name_any();
    let policy = db.spec.termination_policy;

    if db.phase() != Some(DatabasePhase::Terminating) {
        match ctx
            .kube
            .update_status(ns, &name, &StatusUpdate::phase(DatabasePhase::Terminating))
            .await
        {
            Ok(_) => record_phase(ctx, ns, &name, DatabasePhase::Terminating),
            Err(e) => warn!(error = %e, "Failed to mark XtraDBCluster as terminating"),
        }
        publish(
            db,
            ctx,
            EventType::Normal,
            reasons::TERMINATING,
            actions::TERMINATE,
            format!("Terminating with policy {}", policy),
        )
        .await;
    }

    info!(%policy, "Applying termination policy");
    ownership::apply_termination_ownership(db, ctx, ns).await?;

    if db.spec.monitor.is_some()
        && let Err(e) = ensure::delete_monitoring(db, ctx, ns).await
    {
        warn!(error = %e, "Failed to delete monitoring objects");
        publish(
            db,
            ctx,
            EventType::Warning,
            reasons::FAILED_TO_DELETE,
            actions::TERMINATE,
            format!("Failed to delete monitoring objects: {}", e),
        )
        .await;
    }

    if let Some(health) = &ctx.health {
        health.metrics.record_termination(policy);
    }

    Ok(())
}

/// Check if the finalizer is present
fn has_finalizer(db: &XtraDBCluster) -> bool {
    db.finalizers().iter().any(|f| f == FINALIZER)
}
