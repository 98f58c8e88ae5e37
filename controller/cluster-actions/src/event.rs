//! Change events handed to actions

use findings::{Finding, FindingSubject};
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

/// Kind of change observed on a cluster object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

/// A cluster object change, plus the findings actions attached while handling it.
///
/// `obj` is optional so an event that lost its object (for example a callback
/// whose target was deleted) can still be dispatched; actions short-circuit on it.
#[derive(Debug, Clone)]
pub struct ChangeEvent<K> {
    pub operation: OperationType,
    pub obj: Option<K>,
    pub old_obj: Option<K>,
    findings: Vec<Finding>,
}

pub type HpaEvent = ChangeEvent<HorizontalPodAutoscaler>;
pub type ResourceEvent = ChangeEvent<DynamicObject>;

impl<K> ChangeEvent<K> {
    pub fn new(operation: OperationType, obj: Option<K>, old_obj: Option<K>) -> Self {
        Self {
            operation,
            obj,
            old_obj,
            findings: Vec::new(),
        }
    }

    pub fn created(obj: K) -> Self {
        Self::new(OperationType::Create, Some(obj), None)
    }

    pub fn updated(old_obj: K, obj: K) -> Self {
        Self::new(OperationType::Update, Some(obj), Some(old_obj))
    }

    pub fn deleted(obj: K) -> Self {
        Self::new(OperationType::Delete, Some(obj), None)
    }

    pub fn add_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn take_findings(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.findings)
    }
}

impl<K: Serialize> ChangeEvent<K> {
    /// Re-type the event over `DynamicObject` so kind-agnostic actions can consume it.
    pub fn to_dynamic(&self) -> Result<ResourceEvent, serde_json::Error> {
        Ok(ChangeEvent::new(
            self.operation,
            self.obj.as_ref().map(to_dynamic_object).transpose()?,
            self.old_obj.as_ref().map(to_dynamic_object).transpose()?,
        ))
    }
}

pub fn to_dynamic_object<K: Serialize>(obj: &K) -> Result<DynamicObject, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(obj)?)
}

pub fn hpa_subject(hpa: &HorizontalPodAutoscaler) -> FindingSubject {
    FindingSubject::new("HorizontalPodAutoscaler", hpa.name_any(), hpa.namespace())
}
