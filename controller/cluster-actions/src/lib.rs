//! Cluster Actions - Kubernetes automation callbacks
//!
//! Actions react to cluster object changes. The HPA actions raise findings
//! when an autoscaler is pinned at its ceiling and can bump `maxReplicas`;
//! the Git audit action mirrors tracked objects into a Git repository as YAML.
//! A small host (playbook, dispatcher, HPA watcher, finding sinks) runs them.

pub mod audit;
pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod git;
pub mod hpa;
pub mod params;
pub mod sink;
pub mod watch;

pub use audit::{git_push_changes, AuditOutcome, AuditPath};
pub use config::Config;
pub use dispatcher::{ConfiguredAction, Dispatcher, Playbook};
pub use error::ActionError;
pub use event::{ChangeEvent, HpaEvent, OperationType, ResourceEvent};
pub use git::{git_safe_name, GitRepo, GitRepoManager, GitRepoProvider};
pub use hpa::{
    alert_on_hpa_reached_limit, scale_hpa_callback, DryRunHpaClient, HpaClient, KubeHpaClient,
};
pub use params::{ActionParams, GitAuditParams, GitKey, HpaLimitParams, ScaleHpaParams};
pub use sink::{FindingSink, LogFindingSink, WebhookFindingSink};
