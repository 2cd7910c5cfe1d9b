//! Validation of XtraDBCluster specs
//!
//! `validate_spec` checks the spec on its own; `validate` additionally checks
//! objects the spec refers to.

use crate::controller::client::ObjectKind;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::crd::XtraDBCluster;
use crate::resources::common::DATABASE_PORT;

/// Standalone server
pub const MIN_REPLICAS: i32 = 1;

/// Smallest Galera group that keeps quorum after losing one member
pub const MIN_CLUSTER_REPLICAS: i32 = 3;

/// Galera groups beyond this size spend most of their time on certification
pub const MAX_REPLICAS: i32 = 9;

/// Validate the spec without touching the API server
pub fn validate_spec(db: &XtraDBCluster) -> Result<()> {
    validate_version(db)?;
    validate_replicas(db)?;
    validate_storage(db)?;
    validate_monitor(db)?;
    Ok(())
}

/// Validate the spec and the objects it refers to
pub async fn validate(db: &XtraDBCluster, ctx: &Context, ns: &str) -> Result<()> {
    validate_spec(db)?;

    if let Some(reference) = &db.spec.auth_secret
        && reference.externally_managed
        && ctx
            .kube
            .get_metadata(ns, &ObjectKind::Secret, &reference.name)
            .await?
            .is_none()
    {
        return Err(Error::ValidationError(format!(
            "externally managed auth secret {} not found",
            reference.name
        )));
    }

    Ok(())
}

fn validate_version(db: &XtraDBCluster) -> Result<()> {
    if db.spec.version.trim().is_empty() {
        return Err(Error::ValidationError("version must not be empty".to_string()));
    }
    Ok(())
}

fn validate_replicas(db: &XtraDBCluster) -> Result<()> {
    let replicas = db.spec.replicas;

    if replicas < MIN_REPLICAS {
        return Err(Error::ValidationError(format!(
            "replica count {} is below minimum {}",
            replicas, MIN_REPLICAS
        )));
    }

    if replicas > MAX_REPLICAS {
        return Err(Error::ValidationError(format!(
            "replica count {} exceeds maximum {}",
            replicas, MAX_REPLICAS
        )));
    }

    if replicas > MIN_REPLICAS && replicas < MIN_CLUSTER_REPLICAS {
        return Err(Error::ValidationError(format!(
            "a cluster needs at least {} members to keep quorum, got {}",
            MIN_CLUSTER_REPLICAS, replicas
        )));
    }

    Ok(())
}

fn validate_storage(db: &XtraDBCluster) -> Result<()> {
    let size = &db.spec.storage.size;

    // Validate size format (e.g., "10Gi", "100Gi")
    if !size.ends_with("Gi") && !size.ends_with("Mi") && !size.ends_with("Ti") {
        return Err(Error::ValidationError(format!(
            "storage size must end with Gi, Mi, or Ti: {}",
            size
        )));
    }

    let num_str = size.trim_end_matches(char::is_alphabetic);
    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::ValidationError(format!("invalid storage size number: {}", size)))?;
    if num == 0 {
        return Err(Error::ValidationError("storage size must be positive".to_string()));
    }

    Ok(())
}

fn validate_monitor(db: &XtraDBCluster) -> Result<()> {
    let Some(monitor) = &db.spec.monitor else {
        return Ok(());
    };

    if !(1..=65535).contains(&monitor.port) || monitor.port == DATABASE_PORT {
        return Err(Error::ValidationError(format!(
            "invalid exporter port {}",
            monitor.port
        )));
    }

    if let Some(interval) = &monitor.interval {
        let unit_ok = interval.ends_with('s') || interval.ends_with('m');
        let value_ok = interval
            .trim_end_matches(['s', 'm'])
            .parse::<u32>()
            .is_ok_and(|v| v > 0);
        if !unit_ok || !value_ok {
            return Err(Error::ValidationError(format!(
                "invalid scrape interval {}",
                interval
            )));
        }
    }

    Ok(())
}
