use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub severity: FindingSeverity,
    pub source: FindingSource,
    pub aggregation_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<FindingSubject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub enrichments: Vec<Enrichment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Debug,
    Info,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingSource {
    None,
    KubernetesApiServer,
    Prometheus,
    Manual,
    Callback,
}

/// The Kubernetes object a finding is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FindingSubject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Enrichment {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Markdown { text: String },
    Callback { choices: Vec<CallbackChoice> },
}

/// A button-like choice that re-invokes a named action with fixed params.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackChoice {
    pub label: String,
    pub action_name: String,
    #[serde(default)]
    pub action_params: serde_json::Value,
}

impl FindingSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FindingSubject {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
            kind: kind.into(),
        }
    }
}

impl Block {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    pub fn callback(choices: Vec<CallbackChoice>) -> Self {
        Self::Callback { choices }
    }
}

impl CallbackChoice {
    pub fn new(
        label: impl Into<String>,
        action_name: impl Into<String>,
        action_params: serde_json::Value,
    ) -> Self {
        Self {
            label: label.into(),
            action_name: action_name.into(),
            action_params,
        }
    }
}

impl Finding {
    pub fn add_enrichment(&mut self, blocks: Vec<Block>) {
        self.enrichments.push(Enrichment { blocks });
    }

    /// All callback choices across every enrichment, in insertion order.
    pub fn callback_choices(&self) -> impl Iterator<Item = &CallbackChoice> {
        self.enrichments
            .iter()
            .flat_map(|enrichment| enrichment.blocks.iter())
            .filter_map(|block| match block {
                Block::Callback { choices } => Some(choices),
                Block::Markdown { .. } => None,
            })
            .flatten()
    }

    pub fn markdown_blocks(&self) -> impl Iterator<Item = &str> {
        self.enrichments
            .iter()
            .flat_map(|enrichment| enrichment.blocks.iter())
            .filter_map(|block| match block {
                Block::Markdown { text } => Some(text.as_str()),
                Block::Callback { .. } => None,
            })
    }
}
