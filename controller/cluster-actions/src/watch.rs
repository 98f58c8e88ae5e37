//! Cluster watchers - turn watch streams into change events
//!
//! The watch API only reports the current object. `ObjectCache` remembers the
//! last seen version of every object so applied objects can be classified as
//! creates or updates and updates carry their previous state. HPAs get a typed
//! watcher; other audited kinds are watched as `DynamicObject`.

use crate::dispatcher::Dispatcher;
use crate::error::ActionError;
use crate::event::{ChangeEvent, HpaEvent, ResourceEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{discovery, Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use tracing::{debug, info, warn};

pub struct ObjectCache<K> {
    seen: HashMap<String, K>,
}

impl<K> Default for ObjectCache<K> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }
}

fn cache_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

impl<K: Resource + Clone + PartialEq> ObjectCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Record an applied object. Returns `None` when it is identical to the
    /// cached version (resyncs and relists).
    pub fn apply(&mut self, obj: K) -> Option<ChangeEvent<K>> {
        match self.seen.insert(cache_key(&obj), obj.clone()) {
            None => Some(ChangeEvent::created(obj)),
            Some(old) if old == obj => None,
            Some(old) => Some(ChangeEvent::updated(old, obj)),
        }
    }

    pub fn delete(&mut self, obj: K) -> ChangeEvent<K> {
        self.seen.remove(&cache_key(&obj));
        ChangeEvent::deleted(obj)
    }

    /// Reconcile against a full relist: apply every listed object and emit
    /// deletes for cached objects missing from the list.
    pub fn restart(&mut self, listed: Vec<K>) -> Vec<ChangeEvent<K>> {
        let listed_keys: HashSet<String> = listed.iter().map(cache_key).collect();
        let missing: Vec<String> = self
            .seen
            .keys()
            .filter(|key| !listed_keys.contains(*key))
            .cloned()
            .collect();

        let mut events: Vec<ChangeEvent<K>> = missing
            .into_iter()
            .filter_map(|key| self.seen.remove(&key))
            .map(ChangeEvent::deleted)
            .collect();
        events.extend(listed.into_iter().filter_map(|obj| self.apply(obj)));
        events
    }
}

/// Receives the change events a watcher produces
#[async_trait]
pub trait EventHandler<K>: Send + Sync {
    async fn handle(&self, event: ChangeEvent<K>);
}

#[async_trait]
impl EventHandler<HorizontalPodAutoscaler> for Dispatcher {
    async fn handle(&self, event: HpaEvent) {
        let findings = self.handle_hpa_event(event).await;
        if !findings.is_empty() {
            debug!(count = findings.len(), "Event produced findings");
        }
    }
}

#[async_trait]
impl EventHandler<DynamicObject> for Dispatcher {
    async fn handle(&self, event: ResourceEvent) {
        self.handle_resource_event(event).await;
    }
}

/// Drive a watch stream to its end, feeding every change to `handler`.
pub async fn watch_changes<K, H>(api: Api<K>, handler: &H) -> Result<(), ActionError>
where
    K: Resource + Clone + PartialEq + DeserializeOwned + Debug + Send + 'static,
    H: EventHandler<K> + ?Sized,
{
    let mut cache = ObjectCache::new();
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(item) = stream.next().await {
        let events = match item {
            Ok(watcher::Event::Applied(obj)) => cache.apply(obj).into_iter().collect(),
            Ok(watcher::Event::Deleted(obj)) => vec![cache.delete(obj)],
            Ok(watcher::Event::Restarted(listed)) => {
                debug!(count = listed.len(), "Watch stream restarted");
                cache.restart(listed)
            }
            Err(e) => {
                warn!(error = %e, "Watch error");
                continue;
            }
        };

        for event in events {
            debug!(operation = ?event.operation, "Dispatching change event");
            handler.handle(event).await;
        }
    }

    Ok(())
}

/// Watch HPAs (in `namespace`, or cluster-wide) and dispatch every change.
pub async fn run_hpa_watcher(
    client: Client,
    namespace: Option<&str>,
    dispatcher: &Dispatcher,
) -> Result<(), ActionError> {
    let api: Api<HorizontalPodAutoscaler> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    info!(namespace = ?namespace, "Starting HPA watcher");

    watch_changes(api, dispatcher).await?;
    info!("HPA watch stream ended");
    Ok(())
}

/// Watch one arbitrary kind as `DynamicObject` and hand changes to the Git audit.
pub async fn run_resource_watcher(
    client: Client,
    gvk: &GroupVersionKind,
    namespace: Option<&str>,
    dispatcher: &Dispatcher,
) -> Result<(), ActionError> {
    let (resource, capabilities) = discovery::pinned_kind(&client, gvk).await?;
    let api: Api<DynamicObject> = match namespace {
        Some(ns) if capabilities.scope == discovery::Scope::Namespaced => {
            Api::namespaced_with(client, ns, &resource)
        }
        _ => Api::all_with(client, &resource),
    };
    info!(kind = %kind_label(&resource), namespace = ?namespace, "Starting resource watcher");

    watch_changes(api, dispatcher).await?;
    info!(kind = %kind_label(&resource), "Resource watch stream ended");
    Ok(())
}

fn kind_label(resource: &ApiResource) -> String {
    format!("{}/{}", resource.api_version, resource.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OperationType;
    use serde_json::json;

    fn deployment(name: &str, replicas: i64) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": name, "namespace": "beta" },
            "spec": { "replicas": replicas }
        }))
        .unwrap()
    }

    fn hpa(name: &str, current: i32) -> HorizontalPodAutoscaler {
        serde_json::from_value(json!({
            "apiVersion": "autoscaling/v1",
            "kind": "HorizontalPodAutoscaler",
            "metadata": { "name": name, "namespace": "beta" },
            "spec": {
                "maxReplicas": 5,
                "scaleTargetRef": { "kind": "Deployment", "name": name }
            },
            "status": { "currentReplicas": current, "desiredReplicas": current }
        }))
        .unwrap()
    }

    #[test]
    fn test_apply_classifies_create_then_update() {
        let mut cache = ObjectCache::new();

        let created = cache.apply(hpa("web", 1)).unwrap();
        assert_eq!(created.operation, OperationType::Create);
        assert!(created.old_obj.is_none());

        let updated = cache.apply(hpa("web", 2)).unwrap();
        assert_eq!(updated.operation, OperationType::Update);
        let old_status = updated.old_obj.unwrap().status.unwrap();
        assert_eq!(old_status.desired_replicas, 1);
    }

    #[test]
    fn test_apply_ignores_identical_object() {
        let mut cache = ObjectCache::new();
        cache.apply(hpa("web", 1));
        assert!(cache.apply(hpa("web", 1)).is_none());
    }

    #[test]
    fn test_delete_forgets_object() {
        let mut cache = ObjectCache::new();
        cache.apply(hpa("web", 1));

        let deleted = cache.delete(hpa("web", 1));
        assert_eq!(deleted.operation, OperationType::Delete);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_restart_emits_deletes_for_missing_objects() {
        let mut cache = ObjectCache::new();
        cache.apply(hpa("web", 1));
        cache.apply(hpa("worker", 1));

        let events = cache.restart(vec![hpa("web", 1), hpa("api", 2)]);
        let operations: Vec<OperationType> = events.iter().map(|e| e.operation).collect();

        assert_eq!(operations, vec![OperationType::Delete, OperationType::Create]);
        assert_eq!(events[0].obj.as_ref().unwrap().name_any(), "worker");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_dynamic_objects_are_classified_like_typed_ones() {
        let mut cache: ObjectCache<DynamicObject> = ObjectCache::new();

        let created = cache.apply(deployment("api", 1)).unwrap();
        assert_eq!(created.operation, OperationType::Create);
        assert!(cache.apply(deployment("api", 1)).is_none());

        let updated = cache.apply(deployment("api", 3)).unwrap();
        assert_eq!(updated.operation, OperationType::Update);
        assert_eq!(updated.old_obj.unwrap().data["spec"]["replicas"], 1);

        let events = cache.restart(Vec::new());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, OperationType::Delete);
        assert!(cache.is_empty());
    }
}
