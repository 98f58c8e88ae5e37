//! Git audit action: mirror tracked Kubernetes objects into a Git repository
//!
//! Objects land at `{namespace}/{api|consumer}/{service}/main/patches/{name}.yaml`.
//! The `api`/`consumer` split and the service directory are derived from the
//! object name, which is expected to look like `{prefix}-{service}-{role}-...`.

use crate::diff::spec_changed;
use crate::error::ActionError;
use crate::event::{OperationType, ResourceEvent};
use crate::git::{git_safe_name, GitRepoProvider};
use crate::params::GitAuditParams;
use kube::api::DynamicObject;
use serde_json::Value;
use tracing::{debug, error, info};

pub const GIT_PUSH_CHANGES: &str = "git_push_changes";

/// Kinds without a meaningful `spec`
pub const SKIPPED_KINDS: &[&str] = &[
    "Event",
    "ClusterRole",
    "ClusterRoleBinding",
    "ServiceAccount",
    "ConfigMap",
];

const VOLATILE_METADATA: &[&str] = &["annotations", "creationTimestamp", "managedFields"];

/// What the audit action did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Skipped(SkipReason),
    Deleted,
    Created,
    Updated,
    Unchanged,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoObject,
    SkippedKind(String),
    OwnedObject,
}

/// Location of an object's snapshot inside the audit repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPath {
    pub dir: String,
    pub file_name: String,
}

impl AuditPath {
    pub fn for_object(name: &str, namespace: Option<&str>) -> Self {
        let safe_name = git_safe_name(name);
        let stem = match safe_name.split_once('-') {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => safe_name.clone(),
        };

        let role = if stem.to_lowercase().contains("api") {
            "api"
        } else {
            "consumer"
        };
        let service = stem
            .split('-')
            .filter(|segment| !segment.eq_ignore_ascii_case(role))
            .collect::<Vec<_>>()
            .join("-");

        let namespace = git_safe_name(namespace.unwrap_or("None"));
        Self {
            dir: format!(
                "{}/{}/{}/main/patches",
                namespace,
                role,
                git_safe_name(&service)
            ),
            file_name: format!("{}.yaml", stem),
        }
    }

    pub fn full_path(&self) -> String {
        format!("{}/{}", self.dir, self.file_name)
    }
}

/// Serialize `obj` to YAML without annotations, creation timestamp and managed fields.
pub fn audit_yaml(obj: &DynamicObject) -> Result<String, ActionError> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in VOLATILE_METADATA {
            metadata.remove(*field);
        }
    }
    Ok(serde_yaml::to_string(&value)?)
}

fn object_kind(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("")
}

/// Audit Kubernetes resources to Git as YAML files.
///
/// Never fails: every error is logged and reported as [`AuditOutcome::Failed`]
/// so the event counts as handled.
pub fn git_push_changes(
    event: &ResourceEvent,
    params: &GitAuditParams,
    repos: &dyn GitRepoProvider,
) -> AuditOutcome {
    match try_git_push_changes(event, params, repos) {
        Ok(outcome) => outcome,
        Err(e) => {
            let chain = std::iter::successors(
                std::error::Error::source(&e),
                |err| err.source(),
            )
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
            error!(error = %e, caused_by = ?chain, %params, "git audit error");
            AuditOutcome::Failed(e.to_string())
        }
    }
}

fn try_git_push_changes(
    event: &ResourceEvent,
    params: &GitAuditParams,
    repos: &dyn GitRepoProvider,
) -> Result<AuditOutcome, ActionError> {
    let Some(obj) = event.obj.as_ref() else {
        info!(action = GIT_PUSH_CHANGES, "No object on event, skipping");
        return Ok(AuditOutcome::Skipped(SkipReason::NoObject));
    };

    let kind = object_kind(obj);
    if SKIPPED_KINDS.contains(&kind) {
        return Ok(AuditOutcome::Skipped(SkipReason::SkippedKind(kind.to_string())));
    }

    // runtime objects are audited through their owners
    if obj
        .metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| !refs.is_empty())
    {
        return Ok(AuditOutcome::Skipped(SkipReason::OwnedObject));
    }

    let name = obj
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ActionError::MissingField {
            kind: "object",
            name: String::new(),
            field: "metadata.name",
        })?;
    let namespace = obj.metadata.namespace.as_deref();
    let namespace_label = namespace.unwrap_or("None");
    let path = AuditPath::for_object(name, namespace);

    let repo = repos.get_git_repo(&params.git_url, &params.git_key)?;
    repo.pull_rebase()?;
    debug!(git_url = %params.git_url, "Pulled upstream changes");

    match event.operation {
        OperationType::Delete => {
            repo.delete_push(
                &path.dir,
                &path.file_name,
                &format!("Delete {}", path.full_path()),
                &params.cluster_name,
            )?;
            Ok(AuditOutcome::Deleted)
        }
        OperationType::Create => {
            repo.commit_push(
                &audit_yaml(obj)?,
                &path.dir,
                &path.file_name,
                &format!(
                    "Create {} named {} on namespace {}",
                    kind, name, namespace_label
                ),
                &params.cluster_name,
            )?;
            Ok(AuditOutcome::Created)
        }
        OperationType::Update => {
            let spec = obj.data.get("spec").unwrap_or(&Value::Null);
            let old_spec = event
                .old_obj
                .as_ref()
                .map(|old| old.data.get("spec").unwrap_or(&Value::Null));

            if !spec_changed(spec, old_spec, &params.ignored_changes) {
                debug!(name = %name, "No audited spec changes");
                return Ok(AuditOutcome::Unchanged);
            }

            repo.commit_push(
                &audit_yaml(obj)?,
                &path.dir,
                &path.file_name,
                &format!(
                    "Update {} named {} on namespace {}",
                    kind, name, namespace_label
                ),
                &params.cluster_name,
            )?;
            Ok(AuditOutcome::Updated)
        }
    }
}
