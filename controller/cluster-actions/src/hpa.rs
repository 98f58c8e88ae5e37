//! HorizontalPodAutoscaler actions and the client they persist through
//!
//! `scale_hpa_callback` rewrites an HPA's `maxReplicas`. `alert_on_hpa_reached_limit`
//! notices when an HPA is pinned at its ceiling and attaches a callback choice
//! that runs `scale_hpa_callback` with a suggested higher ceiling.

use crate::error::ActionError;
use crate::event::{hpa_subject, HpaEvent, OperationType};
use crate::params::{HpaLimitParams, ScaleHpaParams};
use async_trait::async_trait;
use findings::{Block, CallbackChoice, Finding, FindingSeverity, FindingSource};
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

pub const SCALE_HPA_CALLBACK: &str = "scale_hpa_callback";
pub const ALERT_ON_HPA_REACHED_LIMIT: &str = "alert_on_hpa_reached_limit";

/// HPA persistence seam - the kube client in production, doubles in tests
#[async_trait]
pub trait HpaClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str)
        -> Result<HorizontalPodAutoscaler, ActionError>;

    /// Replace the stored HPA with `hpa`, returning the persisted object
    async fn replace(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, ActionError>;
}

/// HPA client backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeHpaClient {
    client: Client,
}

impl KubeHpaClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<HorizontalPodAutoscaler> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl HpaClient for KubeHpaClient {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, ActionError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn replace(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, ActionError> {
        let name = hpa.metadata.name.as_deref().ok_or(ActionError::MissingField {
            kind: "HorizontalPodAutoscaler",
            name: String::new(),
            field: "metadata.name",
        })?;
        let namespace = hpa.namespace().unwrap_or_else(|| "default".to_string());

        let replaced = self
            .api(&namespace)
            .replace(name, &PostParams::default(), hpa)
            .await?;
        Ok(replaced)
    }
}

/// Dry-run client: reads through to the API server, logs replacements instead
/// of persisting them
pub struct DryRunHpaClient<C: HpaClient> {
    inner: C,
}

impl<C: HpaClient> DryRunHpaClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: HpaClient> HpaClient for DryRunHpaClient<C> {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, ActionError> {
        self.inner.get(namespace, name).await
    }

    async fn replace(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, ActionError> {
        info!(
            name = %hpa.name_any(),
            namespace = ?hpa.namespace(),
            max_replicas = ?hpa.spec.as_ref().map(|spec| spec.max_replicas),
            "Would replace HPA (dry-run mode)"
        );
        Ok(hpa.clone())
    }
}

/// Set the HPA's `maxReplicas` to `params.max_replicas` and persist it.
///
/// Usually invoked as a callback when an HPA reaches its ceiling.
pub async fn scale_hpa_callback(
    event: &mut HpaEvent,
    params: &ScaleHpaParams,
    client: &dyn HpaClient,
) -> Result<(), ActionError> {
    let Some(hpa) = event.obj.as_ref() else {
        info!(action = SCALE_HPA_CALLBACK, "No HPA on event, skipping");
        return Ok(());
    };
    if event.operation == OperationType::Delete {
        debug!(action = SCALE_HPA_CALLBACK, name = %hpa.name_any(), "HPA deleted, skipping");
        return Ok(());
    }

    let mut hpa = hpa.clone();
    let name = hpa.name_any();
    let namespace = hpa.namespace().unwrap_or_default();

    hpa.spec
        .as_mut()
        .ok_or_else(|| ActionError::MissingField {
            kind: "HorizontalPodAutoscaler",
            name: name.clone(),
            field: "spec",
        })?
        .max_replicas = params.max_replicas;

    let replaced = client.replace(&hpa).await?;
    info!(
        name = %name,
        namespace = %namespace,
        max_replicas = params.max_replicas,
        "Updated HPA max replicas"
    );

    let finding = Finding::builder(format!(
        "Max replicas for HPA *{}* in namespace *{}* updated to: *{}*",
        name, namespace, params.max_replicas
    ))
    .severity(FindingSeverity::Info)
    .source(FindingSource::Prometheus)
    .aggregation_key(SCALE_HPA_CALLBACK)
    .subject(hpa_subject(&replaced))
    .build()?;

    event.obj = Some(replaced);
    event.add_finding(finding);
    Ok(())
}

/// Notify when an HPA reaches its max replicas and offer to raise the ceiling.
///
/// Fires only when the observed replica count changed since the previous event
/// and the desired count equals `maxReplicas`. Deletes never fire.
pub async fn alert_on_hpa_reached_limit(
    event: &mut HpaEvent,
    params: &HpaLimitParams,
) -> Result<(), ActionError> {
    let Some(hpa) = event.obj.as_ref() else {
        info!(action = ALERT_ON_HPA_REACHED_LIMIT, "No HPA on event, skipping");
        return Ok(());
    };
    if event.operation == OperationType::Delete {
        debug!(action = ALERT_ON_HPA_REACHED_LIMIT, name = %hpa.name_any(), "HPA deleted, skipping");
        return Ok(());
    }

    let name = hpa.name_any();
    let namespace = hpa.namespace().unwrap_or_default();
    info!(name = %name, namespace = %namespace, "Running alert_on_hpa_reached_limit");

    let (Some(spec), Some(status)) = (hpa.spec.as_ref(), hpa.status.as_ref()) else {
        debug!(name = %name, "HPA has no spec or status yet");
        return Ok(());
    };

    let previous_replicas = event
        .old_obj
        .as_ref()
        .and_then(|old| old.status.as_ref())
        .map(|old_status| old_status.current_replicas);
    if previous_replicas == Some(status.current_replicas) {
        return Ok(());
    }

    if status.desired_replicas != spec.max_replicas {
        return Ok(());
    }

    let avg_cpu = status.current_cpu_utilization_percentage.unwrap_or(0);
    let suggestion = suggested_max_replicas(spec.max_replicas, params.increase_pct);

    let finding = Finding::builder(format!(
        "HPA *{}* in namespace *{}* reached max replicas: *{}*",
        name, namespace, spec.max_replicas
    ))
    .severity(FindingSeverity::Low)
    .source(FindingSource::KubernetesApiServer)
    .aggregation_key(ALERT_ON_HPA_REACHED_LIMIT)
    .subject(hpa_subject(hpa))
    .add_enrichment(vec![
        Block::markdown(format!(
            "On average, pods scaled under this HPA are using *{} %* of the requested cpu.",
            avg_cpu
        )),
        Block::callback(vec![CallbackChoice::new(
            format!("Update HPA max replicas to: {}", suggestion),
            SCALE_HPA_CALLBACK,
            json!({ "max_replicas": suggestion }),
        )]),
    ])
    .build()?;

    info!(
        name = %name,
        namespace = %namespace,
        max_replicas = spec.max_replicas,
        suggestion = suggestion,
        "HPA reached max replicas"
    );
    event.add_finding(finding);
    Ok(())
}

/// `ceil((increase_pct + 100) * current_max / 100)`
pub fn suggested_max_replicas(current_max: i32, increase_pct: u32) -> i32 {
    let scaled = (i64::from(increase_pct) + 100) * i64::from(current_max.max(0));
    i32::try_from((scaled + 99) / 100).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_rounds_up() {
        assert_eq!(suggested_max_replicas(5, 20), 6);
        assert_eq!(suggested_max_replicas(10, 20), 12);
        assert_eq!(suggested_max_replicas(3, 10), 4);
        assert_eq!(suggested_max_replicas(4, 0), 4);
    }

    #[test]
    fn test_suggestion_saturates() {
        assert_eq!(suggested_max_replicas(i32::MAX, 100), i32::MAX);
        assert_eq!(suggested_max_replicas(-3, 20), 0);
    }
}
