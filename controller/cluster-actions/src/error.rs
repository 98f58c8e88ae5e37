//! Error type shared by every action, the Git repository manager and the sinks

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Failed to spawn `git {command}`: {source}")]
    GitSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` exited with status {status}: {stderr}")]
    GitCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {params}: {message}")]
    Params {
        params: &'static str,
        message: String,
    },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid audit kind `{0}`, expected group/version/Kind or version/Kind")]
    InvalidKind(String),

    #[error("{kind} {name} is missing {field}")]
    MissingField {
        kind: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("Failed to build finding: {0}")]
    Finding(#[from] findings::BuildError),

    #[error("Finding webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Finding webhook returned status {status}: {body}")]
    WebhookStatus { status: u16, body: String },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
