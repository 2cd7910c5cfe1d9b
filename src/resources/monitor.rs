//! Prometheus Operator ServiceMonitor for the metrics exporter

use kube::ResourceExt;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;

use crate::controller::error::Result;
use crate::crd::{MonitorSpec, XtraDBCluster};
use crate::resources::common::{
    LABEL_COMPONENT, component_labels, offshoot_selectors, owner_reference, stats_service_name,
};

/// API resource for `monitoring.coreos.com/v1 ServiceMonitor`
pub fn service_monitor_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("monitoring.coreos.com", "v1", "ServiceMonitor"),
        "servicemonitors",
    )
}

/// Generate a ServiceMonitor scraping the stats service
pub fn generate_service_monitor(db: &XtraDBCluster, monitor: &MonitorSpec) -> Result<DynamicObject> {
    let name = db.name_any();
    let mut labels = component_labels(&name, "stats");
    labels.extend(monitor.labels.clone());

    let mut selector = offshoot_selectors(&name);
    selector.insert(LABEL_COMPONENT.to_string(), "stats".to_string());

    let value = json!({
        "apiVersion": "monitoring.coreos.com/v1",
        "kind": "ServiceMonitor",
        "metadata": {
            "name": stats_service_name(db),
            "namespace": db.namespace(),
            "labels": labels,
            "ownerReferences": [owner_reference(db)],
        },
        "spec": {
            "selector": { "matchLabels": selector },
            "namespaceSelector": { "matchNames": [db.namespace()] },
            "endpoints": [{
                "port": "metrics",
                "path": "/metrics",
                "interval": monitor.interval.clone().unwrap_or_else(|| "30s".to_string()),
            }],
        },
    });

    Ok(serde_json::from_value(value)?)
}
