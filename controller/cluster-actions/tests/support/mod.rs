//! Shared fixtures and test doubles
#![allow(dead_code)]

use async_trait::async_trait;
use cluster_actions::git::{CommandExecutor, CommandOutput};
use cluster_actions::{ActionError, FindingSink, GitKey, GitRepo, GitRepoProvider, HpaClient};
use findings::Finding;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use kube::api::DynamicObject;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub fn hpa(name: &str, max: i32, current: i32, desired: i32) -> HorizontalPodAutoscaler {
    serde_json::from_value(json!({
        "apiVersion": "autoscaling/v1",
        "kind": "HorizontalPodAutoscaler",
        "metadata": {
            "name": name,
            "namespace": "beta",
            "resourceVersion": "146686470"
        },
        "spec": {
            "maxReplicas": max,
            "minReplicas": 1,
            "scaleTargetRef": { "apiVersion": "apps/v1", "kind": "Deployment", "name": name },
            "targetCPUUtilizationPercentage": 80
        },
        "status": {
            "currentReplicas": current,
            "desiredReplicas": desired,
            "currentCPUUtilizationPercentage": 93
        }
    }))
    .expect("valid HPA fixture")
}

pub fn max_replicas(hpa: &HorizontalPodAutoscaler) -> i32 {
    hpa.spec.as_ref().expect("HPA has spec").max_replicas
}

pub fn dynamic(value: serde_json::Value) -> DynamicObject {
    serde_json::from_value(value).expect("valid object fixture")
}

/// Records replacements and serves a fixed HPA on get
#[derive(Default)]
pub struct RecordingHpaClient {
    pub stored: Mutex<Option<HorizontalPodAutoscaler>>,
    pub replaced: Mutex<Vec<HorizontalPodAutoscaler>>,
}

impl RecordingHpaClient {
    pub fn with_stored(hpa: HorizontalPodAutoscaler) -> Self {
        Self {
            stored: Mutex::new(Some(hpa)),
            replaced: Mutex::new(Vec::new()),
        }
    }

    pub fn replaced(&self) -> Vec<HorizontalPodAutoscaler> {
        self.replaced.lock().unwrap().clone()
    }
}

#[async_trait]
impl HpaClient for RecordingHpaClient {
    async fn get(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, ActionError> {
        self.stored
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ActionError::MissingField {
                kind: "HorizontalPodAutoscaler",
                name: name.to_string(),
                field: "stored object",
            })
    }

    async fn replace(
        &self,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler, ActionError> {
        self.replaced.lock().unwrap().push(hpa.clone());
        *self.stored.lock().unwrap() = Some(hpa.clone());
        Ok(hpa.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOp {
    PullRebase,
    Commit {
        contents: String,
        dir: String,
        file_name: String,
        message: String,
        author: String,
    },
    Delete {
        dir: String,
        file_name: String,
        message: String,
        author: String,
    },
}

/// In-memory repository recording every operation
#[derive(Default)]
pub struct MemoryGitRepo {
    pub ops: Mutex<Vec<GitOp>>,
    pub fail_pull: bool,
}

impl MemoryGitRepo {
    pub fn ops(&self) -> Vec<GitOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<GitOp> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, GitOp::PullRebase))
            .collect()
    }
}

impl GitRepo for MemoryGitRepo {
    fn pull_rebase(&self) -> Result<(), ActionError> {
        if self.fail_pull {
            return Err(ActionError::GitCommand {
                command: "pull --rebase".to_string(),
                status: 128,
                stderr: "fatal: could not read from remote repository".to_string(),
            });
        }
        self.ops.lock().unwrap().push(GitOp::PullRebase);
        Ok(())
    }

    fn commit_push(
        &self,
        contents: &str,
        dir: &str,
        file_name: &str,
        message: &str,
        author: &str,
    ) -> Result<(), ActionError> {
        self.ops.lock().unwrap().push(GitOp::Commit {
            contents: contents.to_string(),
            dir: dir.to_string(),
            file_name: file_name.to_string(),
            message: message.to_string(),
            author: author.to_string(),
        });
        Ok(())
    }

    fn delete_push(
        &self,
        dir: &str,
        file_name: &str,
        message: &str,
        author: &str,
    ) -> Result<(), ActionError> {
        self.ops.lock().unwrap().push(GitOp::Delete {
            dir: dir.to_string(),
            file_name: file_name.to_string(),
            message: message.to_string(),
            author: author.to_string(),
        });
        Ok(())
    }
}

/// Hands out the same in-memory repository for every URL
pub struct MemoryRepoProvider {
    pub repo: Arc<MemoryGitRepo>,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl MemoryRepoProvider {
    pub fn new(repo: MemoryGitRepo) -> Self {
        Self {
            repo: Arc::new(repo),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl GitRepoProvider for MemoryRepoProvider {
    fn get_git_repo(
        &self,
        git_url: &str,
        git_key: &GitKey,
    ) -> Result<Arc<dyn GitRepo>, ActionError> {
        self.requests
            .lock()
            .unwrap()
            .push((git_url.to_string(), git_key.expose().to_string()));
        let repo: Arc<dyn GitRepo> = self.repo.clone();
        Ok(repo)
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub published: Mutex<Vec<Finding>>,
}

impl CollectingSink {
    pub fn published(&self) -> Vec<Finding> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl FindingSink for CollectingSink {
    async fn publish(&self, findings: &[Finding]) -> Result<(), ActionError> {
        self.published
            .lock()
            .unwrap()
            .extend(findings.iter().cloned());
        Ok(())
    }
}

/// Records `git` invocations; `git status --porcelain` answers with `porcelain`
#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub envs: Mutex<Vec<(String, String)>>,
    pub porcelain: String,
    pub fail_subcommand: Option<String>,
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Git subcommands in call order, skipping `-c key=value` pairs
    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|args| {
                let mut iter = args.iter();
                while let Some(arg) = iter.next() {
                    if arg == "-c" {
                        iter.next();
                        continue;
                    }
                    return Some(arg.clone());
                }
                None
            })
            .collect()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(
        &self,
        _program: &str,
        args: &[&str],
        _cwd: Option<&Path>,
        envs: &[(&str, &str)],
    ) -> Result<CommandOutput, ActionError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.calls.lock().unwrap().push(args.clone());
        self.envs
            .lock()
            .unwrap()
            .extend(envs.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let subcommand = args
            .iter()
            .enumerate()
            .find(|(i, a)| a.as_str() != "-c" && (*i == 0 || args[i - 1] != "-c"))
            .map(|(_, a)| a.clone())
            .unwrap_or_default();

        if self.fail_subcommand.as_deref() == Some(subcommand.as_str()) {
            return Ok(CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: format!("error: {} failed", subcommand),
            });
        }

        let stdout = if subcommand == "status" {
            self.porcelain.clone()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            status: 0,
            stdout,
            stderr: String::new(),
        })
    }
}
