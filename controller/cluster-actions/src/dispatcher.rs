//! Playbook loading and event dispatch
//!
//! A playbook registers actions by name with their params. The dispatcher runs
//! every registered action against each event, one event at a time, then hands
//! the collected findings to the configured sink.

use crate::audit::{git_push_changes, AuditOutcome, GIT_PUSH_CHANGES};
use crate::error::ActionError;
use crate::event::{HpaEvent, OperationType, ResourceEvent};
use crate::git::GitRepoProvider;
use crate::hpa::{
    alert_on_hpa_reached_limit, scale_hpa_callback, HpaClient, ALERT_ON_HPA_REACHED_LIMIT,
    SCALE_HPA_CALLBACK,
};
use crate::params::{ActionParams, GitAuditParams, HpaLimitParams, ScaleHpaParams};
use crate::sink::FindingSink;
use findings::{CallbackChoice, Finding};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Playbook file contents
#[derive(Debug, Clone, Deserialize)]
pub struct Playbook {
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A registered action with validated params
#[derive(Debug, Clone, PartialEq)]
pub enum ConfiguredAction {
    ScaleHpa(ScaleHpaParams),
    HpaReachedLimit(HpaLimitParams),
    GitPushChanges(GitAuditParams),
}

impl ConfiguredAction {
    pub fn from_config(config: &ActionConfig) -> Result<Self, ActionError> {
        let params = config.params.clone();
        match config.name.as_str() {
            SCALE_HPA_CALLBACK => Ok(Self::ScaleHpa(ScaleHpaParams::from_value(params)?)),
            ALERT_ON_HPA_REACHED_LIMIT => {
                Ok(Self::HpaReachedLimit(HpaLimitParams::from_value(params)?))
            }
            GIT_PUSH_CHANGES => Ok(Self::GitPushChanges(GitAuditParams::from_value(params)?)),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ScaleHpa(_) => SCALE_HPA_CALLBACK,
            Self::HpaReachedLimit(_) => ALERT_ON_HPA_REACHED_LIMIT,
            Self::GitPushChanges(_) => GIT_PUSH_CHANGES,
        }
    }
}

impl Playbook {
    pub fn from_yaml(contents: &str) -> Result<Self, ActionError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ActionError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Validate every entry; the first invalid entry fails the whole playbook.
    pub fn configured_actions(&self) -> Result<Vec<ConfiguredAction>, ActionError> {
        self.actions.iter().map(ConfiguredAction::from_config).collect()
    }
}

pub struct Dispatcher {
    actions: Vec<ConfiguredAction>,
    hpa_client: Arc<dyn HpaClient>,
    repos: Arc<dyn GitRepoProvider>,
    sink: Arc<dyn FindingSink>,
}

impl Dispatcher {
    pub fn new(
        actions: Vec<ConfiguredAction>,
        hpa_client: Arc<dyn HpaClient>,
        repos: Arc<dyn GitRepoProvider>,
        sink: Arc<dyn FindingSink>,
    ) -> Self {
        Self {
            actions,
            hpa_client,
            repos,
            sink,
        }
    }

    pub fn actions(&self) -> &[ConfiguredAction] {
        &self.actions
    }

    /// Run every registered action against an HPA change event and publish
    /// the findings they attach. Action failures are logged, not propagated.
    ///
    /// Deletes only reach the Git audit; the HPA actions need a live object.
    pub async fn handle_hpa_event(&self, mut event: HpaEvent) -> Vec<Finding> {
        let deleted = event.operation == OperationType::Delete;

        for action in &self.actions {
            let result = match action {
                ConfiguredAction::ScaleHpa(_) | ConfiguredAction::HpaReachedLimit(_)
                    if deleted =>
                {
                    debug!(action = action.name(), "Skipping HPA action for deleted HPA");
                    continue;
                }
                ConfiguredAction::ScaleHpa(params) => {
                    scale_hpa_callback(&mut event, params, self.hpa_client.as_ref()).await
                }
                ConfiguredAction::HpaReachedLimit(params) => {
                    alert_on_hpa_reached_limit(&mut event, params).await
                }
                ConfiguredAction::GitPushChanges(params) => match event.to_dynamic() {
                    Ok(resource_event) => self.audit(resource_event, params.clone()).await,
                    Err(e) => Err(e.into()),
                },
            };

            if let Err(e) = result {
                error!(action = action.name(), error = %e, "Action failed");
            }
        }

        let findings = event.take_findings();
        self.publish(&findings).await;
        findings
    }

    /// Run the Git audit actions against a change to an arbitrary resource.
    /// The HPA actions do not apply to other kinds.
    pub async fn handle_resource_event(&self, event: ResourceEvent) {
        for action in &self.actions {
            let ConfiguredAction::GitPushChanges(params) = action else {
                continue;
            };
            if let Err(e) = self.audit(event.clone(), params.clone()).await {
                error!(action = action.name(), error = %e, "Action failed");
            }
        }
    }

    /// Invoke the action behind a callback choice against `hpa`.
    pub async fn run_callback(
        &self,
        choice: &CallbackChoice,
        hpa: k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler,
    ) -> Result<Vec<Finding>, ActionError> {
        info!(action = %choice.action_name, label = %choice.label, "Running callback");
        let mut event = HpaEvent::new(OperationType::Update, Some(hpa), None);

        match choice.action_name.as_str() {
            SCALE_HPA_CALLBACK => {
                let params = ScaleHpaParams::from_value(choice.action_params.clone())?;
                scale_hpa_callback(&mut event, &params, self.hpa_client.as_ref()).await?;
            }
            ALERT_ON_HPA_REACHED_LIMIT => {
                let params = HpaLimitParams::from_value(choice.action_params.clone())?;
                alert_on_hpa_reached_limit(&mut event, &params).await?;
            }
            other => return Err(ActionError::UnknownAction(other.to_string())),
        }

        let findings = event.take_findings();
        self.publish(&findings).await;
        Ok(findings)
    }

    /// Fetch the HPA by name, then run the callback against it.
    pub async fn run_callback_for(
        &self,
        namespace: &str,
        name: &str,
        choice: &CallbackChoice,
    ) -> Result<Vec<Finding>, ActionError> {
        let hpa = self.hpa_client.get(namespace, name).await?;
        self.run_callback(choice, hpa).await
    }

    async fn audit(&self, event: ResourceEvent, params: GitAuditParams) -> Result<(), ActionError> {
        let repos = self.repos.clone();

        // git shells out and blocks
        let outcome: AuditOutcome = tokio::task::spawn_blocking(move || {
            git_push_changes(&event, &params, repos.as_ref())
        })
        .await?;
        debug!(outcome = ?outcome, "Git audit finished");
        Ok(())
    }

    async fn publish(&self, findings: &[Finding]) {
        if findings.is_empty() {
            return;
        }
        if let Err(e) = self.sink.publish(findings).await {
            warn!(error = %e, count = findings.len(), "Failed to publish findings");
        }
    }
}
