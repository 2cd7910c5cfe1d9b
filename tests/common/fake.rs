//! In-memory API server for orchestration tests
//!
//! [`FakeKube`] implements [`KubeClient`] over a map of objects keyed by kind
//! and name. Applies bump `resourceVersion` only when the object body
//! changes, so verbs behave like server-side apply. Status writes go through
//! `StatusUpdate::apply_to`, so illegal transitions fail here as they would
//! in production.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::core::ObjectMeta;
use kube::runtime::events::EventType;
use serde_json::Value;
use xtradb_operator::config::OperatorConfig;
use xtradb_operator::controller::client::{Dependent, KubeClient, ObjectKind};
use xtradb_operator::controller::ensure::Verb;
use xtradb_operator::controller::events::EventPublisher;
use xtradb_operator::controller::status::StatusUpdate;
use xtradb_operator::controller::{Context, Error, Result};
use xtradb_operator::crd::{DatabasePhase, XtraDBCluster, XtraDBClusterStatus};
use xtradb_operator::health::HealthState;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub body: Value,
}

#[derive(Default)]
struct State {
    db: Option<XtraDBCluster>,
    objects: BTreeMap<(String, String), StoredObject>,
    next_rv: u64,
    phase_history: Vec<DatabasePhase>,
    status_writes: usize,
    calls: Vec<String>,
    fail_apply: HashSet<(String, String)>,
    scale_down_hangs: bool,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }
}

pub fn api_error(code: u16, message: &str) -> Error {
    Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Injected".to_string(),
        code,
    }))
}

fn key(kind: &ObjectKind, name: &str) -> (String, String) {
    (kind.to_string(), name.to_string())
}

fn matches_selector(meta: &ObjectMeta, selector: &str) -> bool {
    let labels = meta.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|actual| actual == v),
            None => labels.contains_key(term),
        })
}

fn split(object: Dependent) -> Result<(ObjectMeta, Value)> {
    let mut body = match &object {
        Dependent::Service(o) => serde_json::to_value(o)?,
        Dependent::Secret(o) => serde_json::to_value(o)?,
        Dependent::StatefulSet(o) => serde_json::to_value(o)?,
        Dependent::ServiceAccount(o) => serde_json::to_value(o)?,
        Dependent::Role(o) => serde_json::to_value(o)?,
        Dependent::RoleBinding(o) => serde_json::to_value(o)?,
        Dependent::Dynamic(o, _) => serde_json::to_value(o)?,
    };
    if let Some(map) = body.as_object_mut() {
        map.remove("metadata");
    }
    Ok((object.metadata().clone(), body))
}

/// In-memory implementation of [`KubeClient`] for a single XtraDBCluster
#[derive(Default)]
pub struct FakeKube {
    state: Mutex<State>,
}

impl FakeKube {
    pub fn new(db: &XtraDBCluster) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().db = Some(db.clone());
        fake
    }

    /// The stored XtraDBCluster, as the next watch event would deliver it
    pub fn current(&self) -> XtraDBCluster {
        self.state.lock().unwrap().db.clone().unwrap()
    }

    /// Replace the stored spec, bumping `metadata.generation`
    pub fn edit(&self, f: impl FnOnce(&mut XtraDBCluster)) {
        let mut state = self.state.lock().unwrap();
        let db = state.db.as_mut().unwrap();
        f(db);
        db.metadata.generation = Some(db.metadata.generation.unwrap_or(0) + 1);
    }

    /// Mutate the stored status as an external tool would
    pub fn set_status(&self, f: impl FnOnce(&mut XtraDBClusterStatus)) {
        let mut state = self.state.lock().unwrap();
        let db = state.db.as_mut().unwrap();
        f(db.status.get_or_insert_with(Default::default));
    }

    /// Mark the stored XtraDBCluster as being deleted
    pub fn request_deletion(&self) {
        let mut state = self.state.lock().unwrap();
        let db = state.db.as_mut().unwrap();
        db.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    }

    pub fn seed(&self, kind: ObjectKind, name: &str, labels: BTreeMap<String, String>) {
        self.seed_with(kind, name, labels, Vec::new(), Vec::new());
    }

    /// Seed an object, optionally held by finalizers of its own
    pub fn seed_with(
        &self,
        kind: ObjectKind,
        name: &str,
        labels: BTreeMap<String, String>,
        owner_references: Vec<OwnerReference>,
        finalizers: Vec<String>,
    ) {
        let mut state = self.state.lock().unwrap();
        let rv = state.bump();
        let meta = ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            owner_references: (!owner_references.is_empty()).then_some(owner_references),
            finalizers: (!finalizers.is_empty()).then_some(finalizers),
            resource_version: Some(rv),
            ..Default::default()
        };
        state.objects.insert(
            key(&kind, name),
            StoredObject {
                meta,
                body: Value::Null,
            },
        );
    }

    pub fn object(&self, kind: &ObjectKind, name: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(&key(kind, name)).cloned()
    }

    pub fn exists(&self, kind: &ObjectKind, name: &str) -> bool {
        self.object(kind, name).is_some()
    }

    pub fn owner_uids(&self, kind: &ObjectKind, name: &str) -> Vec<String> {
        self.object(kind, name)
            .and_then(|o| o.meta.owner_references)
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.uid)
            .collect()
    }

    /// Names of stored objects of a kind
    pub fn names(&self, kind: &ObjectKind) -> Vec<String> {
        let kind = kind.to_string();
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Every phase written, in order
    pub fn phase_history(&self) -> Vec<DatabasePhase> {
        self.state.lock().unwrap().phase_history.clone()
    }

    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }

    /// Every mutating call, as `verb kind/name`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Make applies of one object fail with a 500
    pub fn fail_apply(&self, kind: ObjectKind, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_apply
            .insert(key(&kind, name));
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().fail_apply.clear();
    }

    /// StatefulSets never report zero replicas
    pub fn hang_scale_down(&self) {
        self.state.lock().unwrap().scale_down_hangs = true;
    }

    pub fn statefulset_replicas(&self, name: &str) -> Option<i64> {
        self.object(&ObjectKind::StatefulSet, name)
            .and_then(|o| o.body.pointer("/spec/replicas").and_then(Value::as_i64))
    }
}

#[async_trait]
impl KubeClient for FakeKube {
    async fn update_status(
        &self,
        _ns: &str,
        _name: &str,
        update: &StatusUpdate,
    ) -> Result<XtraDBClusterStatus> {
        let mut state = self.state.lock().unwrap();
        let db = state
            .db
            .as_mut()
            .ok_or_else(|| api_error(404, "xtradbcluster not found"))?;
        let mut status = db.status.clone().unwrap_or_default();
        let previous_phase = status.phase;

        if !update.apply_to(&mut status)? {
            return Ok(status);
        }
        db.status = Some(status.clone());
        state.status_writes += 1;
        if let Some(phase) = status.phase
            && previous_phase != Some(phase)
        {
            state.phase_history.push(phase);
        }
        Ok(status)
    }

    async fn add_finalizer(&self, _ns: &str, _name: &str, finalizer: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("add_finalizer {}", finalizer));
        let db = state.db.as_mut().unwrap();
        let finalizers = db.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        Ok(())
    }

    async fn remove_finalizer(&self, _ns: &str, _name: &str, finalizer: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("remove_finalizer {}", finalizer));
        let db = state.db.as_mut().unwrap();
        if let Some(finalizers) = db.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
        Ok(())
    }

    async fn apply(&self, _ns: &str, object: Dependent) -> Result<Verb> {
        let kind = object.kind();
        let name = object.name()?.to_string();
        let k = key(&kind, &name);
        let (mut meta, body) = split(object)?;

        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("apply {}/{}", kind, name));
        if state.fail_apply.contains(&k) {
            return Err(api_error(500, "injected failure"));
        }

        match state.objects.get(&k).cloned() {
            Some(existing) if existing.body == body && existing.meta.labels == meta.labels => {
                Ok(Verb::Unchanged)
            }
            existing => {
                let rv = state.bump();
                meta.resource_version = Some(rv);
                // Owner references are managed separately by ownership updates
                if let Some(existing) = &existing
                    && meta.owner_references.is_none()
                {
                    meta.owner_references = existing.meta.owner_references.clone();
                }
                let verb = if existing.is_some() {
                    Verb::Patched
                } else {
                    Verb::Created
                };
                state.objects.insert(k, StoredObject { meta, body });
                Ok(verb)
            }
        }
    }

    async fn get_metadata(
        &self,
        _ns: &str,
        kind: &ObjectKind,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        Ok(self.object(kind, name).map(|o| o.meta))
    }

    async fn list_metadata(
        &self,
        _ns: &str,
        kind: &ObjectKind,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>> {
        let kind = kind.to_string();
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|((k, _), o)| *k == kind && matches_selector(&o.meta, selector))
            .map(|(_, o)| o.meta.clone())
            .collect())
    }

    async fn delete(&self, _ns: &str, kind: &ObjectKind, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete {}/{}", kind, name));
        let k = key(kind, name);
        let held = state
            .objects
            .get(&k)
            .is_some_and(|o| o.meta.finalizers.as_ref().is_some_and(|f| !f.is_empty()));
        if held {
            if let Some(object) = state.objects.get_mut(&k) {
                object.meta.deletion_timestamp = Some(Time(chrono::Utc::now()));
            }
        } else {
            state.objects.remove(&k);
        }
        Ok(())
    }

    async fn set_owner_references(
        &self,
        _ns: &str,
        kind: &ObjectKind,
        name: &str,
        owner_references: Vec<OwnerReference>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("set_owner_references {}/{}", kind, name));
        let rv = state.bump();
        let object = state
            .objects
            .get_mut(&key(kind, name))
            .ok_or_else(|| api_error(404, "not found"))?;
        object.meta.owner_references = Some(owner_references);
        object.meta.resource_version = Some(rv);
        Ok(())
    }

    async fn scale_statefulset(&self, _ns: &str, name: &str, replicas: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("scale StatefulSet/{} {}", name, replicas));
        if let Some(object) = state
            .objects
            .get_mut(&key(&ObjectKind::StatefulSet, name))
            && let Some(spec) = object.body.get_mut("spec").and_then(Value::as_object_mut)
        {
            spec.insert("replicas".to_string(), Value::from(replicas));
        }
        Ok(())
    }

    async fn wait_for_scale_down(&self, _ns: &str, name: &str, _timeout: Duration) -> Result<()> {
        if self.state.lock().unwrap().scale_down_hangs {
            return Err(Error::Timeout(format!("StatefulSet {} to scale down", name)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// Event publisher that keeps every event for assertions
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}

/// A controller context wired to the in-memory fakes
pub struct Harness {
    pub kube: Arc<FakeKube>,
    pub events: Arc<RecordingEventPublisher>,
    pub health: Arc<HealthState>,
    pub ctx: Context,
}

impl Harness {
    pub fn new(db: &XtraDBCluster) -> Self {
        let kube = Arc::new(FakeKube::new(db));
        let events = Arc::new(RecordingEventPublisher::default());
        let health = Arc::new(HealthState::new());
        let ctx = Context::with_clients(
            kube.clone(),
            events.clone(),
            OperatorConfig::default(),
            Some(health.clone()),
        );
        Self {
            kube,
            events,
            health,
            ctx,
        }
    }

    /// The stored XtraDBCluster
    pub fn db(&self) -> XtraDBCluster {
        self.kube.current()
    }

    pub fn namespace(&self) -> String {
        self.db().metadata.namespace.unwrap_or_default()
    }
}
