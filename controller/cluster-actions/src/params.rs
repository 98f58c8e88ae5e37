//! User-supplied action parameters
//!
//! Params are validated and normalized once, when they are parsed from the
//! playbook or from a callback choice, and are immutable afterwards.

use crate::error::ActionError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter record for a registered action
pub trait ActionParams: DeserializeOwned + Sized {
    const NAME: &'static str;

    fn validate(&self) -> Result<(), ActionError> {
        Ok(())
    }

    /// Parse from a JSON value; `null` is treated as an empty object.
    fn from_value(value: serde_json::Value) -> Result<Self, ActionError> {
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        let params: Self = serde_json::from_value(value).map_err(|e| ActionError::Params {
            params: Self::NAME,
            message: e.to_string(),
        })?;
        params.validate()?;
        Ok(params)
    }

    fn invalid(message: impl Into<String>) -> ActionError {
        ActionError::Params {
            params: Self::NAME,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleHpaParams {
    /// New max replicas to set on the HPA
    pub max_replicas: i32,
}

impl ActionParams for ScaleHpaParams {
    const NAME: &'static str = "ScaleHpaParams";

    fn validate(&self) -> Result<(), ActionError> {
        if self.max_replicas < 1 {
            return Err(Self::invalid(format!(
                "max_replicas must be at least 1, got {}",
                self.max_replicas
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpaLimitParams {
    /// Percentage to raise max replicas by when suggesting a new ceiling
    #[serde(default = "default_increase_pct")]
    pub increase_pct: u32,
}

fn default_increase_pct() -> u32 {
    20
}

impl Default for HpaLimitParams {
    fn default() -> Self {
        Self {
            increase_pct: default_increase_pct(),
        }
    }
}

impl ActionParams for HpaLimitParams {
    const NAME: &'static str = "HpaLimitParams";
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitAuditParams {
    /// Changes are committed under this cluster name
    pub cluster_name: String,
    pub git_url: String,
    /// Deploy key with write access, plain or base64-encoded
    pub git_key: GitKey,
    /// Diff path patterns that should not produce a commit
    #[serde(default)]
    pub ignored_changes: Vec<String>,
}

impl ActionParams for GitAuditParams {
    const NAME: &'static str = "GitAuditParams";

    fn validate(&self) -> Result<(), ActionError> {
        if self.cluster_name.trim().is_empty() {
            return Err(Self::invalid("cluster_name must not be empty"));
        }
        if self.git_url.trim().is_empty() {
            return Err(Self::invalid("git_url must not be empty"));
        }
        if self.git_key.expose().trim().is_empty() {
            return Err(Self::invalid("git_key must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for GitAuditParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster_name={} git_url={} git_key={}",
            self.cluster_name, self.git_url, self.git_key
        )
    }
}

impl fmt::Debug for GitAuditParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitAuditParams")
            .field("cluster_name", &self.cluster_name)
            .field("git_url", &self.git_url)
            .field("git_key", &self.git_key)
            .field("ignored_changes", &self.ignored_changes)
            .finish()
    }
}

/// Git deploy key. Base64 input is decoded on construction; the value is
/// never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct GitKey(String);

impl GitKey {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match decode_base64_text(&raw) {
            Some(decoded) => Self(decoded),
            None => Self(raw),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for GitKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<GitKey> for String {
    fn from(key: GitKey) -> Self {
        key.0
    }
}

impl fmt::Display for GitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*****")
    }
}

impl fmt::Debug for GitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GitKey(*****)")
    }
}

/// Returns the decoded text when `value` is canonical base64 of UTF-8 text.
pub fn decode_base64_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let bytes = BASE64.decode(trimmed).ok()?;
    if BASE64.encode(&bytes) != trimmed {
        return None;
    }
    String::from_utf8(bytes).ok()
}
