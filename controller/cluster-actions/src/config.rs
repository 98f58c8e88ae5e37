//! Configuration for the cluster actions service

use crate::error::ActionError;
use clap::Args;
use kube::api::GroupVersionKind;
use std::path::PathBuf;

/// Process-level configuration shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Playbook YAML registering actions and their params
    #[arg(long, env = "PLAYBOOK_PATH", default_value = "playbook.yaml")]
    pub playbook: PathBuf,

    /// Only watch HPAs in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Directory holding audit repository clones and deploy keys
    #[arg(long, env = "REPO_WORKDIR", default_value = "/tmp/cluster-actions/repos")]
    pub repo_workdir: PathBuf,

    /// Committer email for audit commits
    #[arg(long, env = "GIT_USER_EMAIL", default_value = "cluster-audit@localhost")]
    pub git_user_email: String,

    /// Dry-run mode (log HPA replacements instead of persisting them)
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Webhook endpoint receiving findings as JSON (default: log only)
    #[arg(long, env = "FINDING_WEBHOOK")]
    pub finding_webhook: Option<String>,

    /// Finding webhook timeout in seconds
    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value_t = 10)]
    pub webhook_timeout_secs: u64,

    /// Extra kinds to mirror into Git, as `group/version/Kind` or
    /// `version/Kind` for the core group (e.g. `apps/v1/Deployment,v1/Service`)
    #[arg(long, env = "AUDIT_KINDS", value_delimiter = ',')]
    pub audit_kinds: Vec<String>,

    /// Output logs in JSON format
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    /// Webhook endpoint, ignoring blank values
    pub fn finding_webhook(&self) -> Option<&str> {
        self.finding_webhook
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }

    /// Parse `--audit-kinds`. HPAs are dropped since the HPA watcher already
    /// audits them.
    pub fn audit_gvks(&self) -> Result<Vec<GroupVersionKind>, ActionError> {
        let mut gvks = Vec::new();
        for raw in self.audit_kinds.iter().map(|kind| kind.trim()) {
            if raw.is_empty() {
                continue;
            }
            let gvk = parse_gvk(raw)?;
            if gvk.group == "autoscaling" && gvk.kind == "HorizontalPodAutoscaler" {
                continue;
            }
            gvks.push(gvk);
        }
        Ok(gvks)
    }

    /// Human-readable watch scope for startup logs
    pub fn watch_scope(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("namespace {}", ns),
            None => "all namespaces".to_string(),
        }
    }
}

/// `apps/v1/Deployment` or `v1/Service`
pub fn parse_gvk(raw: &str) -> Result<GroupVersionKind, ActionError> {
    let parts: Vec<&str> = raw.split('/').collect();
    let (group, version, kind) = match parts.as_slice() {
        [version, kind] => ("", *version, *kind),
        [group, version, kind] => (*group, *version, *kind),
        _ => return Err(ActionError::InvalidKind(raw.to_string())),
    };
    if version.is_empty() || kind.is_empty() {
        return Err(ActionError::InvalidKind(raw.to_string()));
    }
    Ok(GroupVersionKind::gvk(group, version, kind))
}
