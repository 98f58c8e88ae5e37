//! Finding sinks
//!
//! The default sink logs findings. The webhook sink POSTs them as JSON to an
//! external notification pipeline; a failed delivery is reported once and not
//! retried.

use crate::error::ActionError;
use async_trait::async_trait;
use findings::Finding;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait FindingSink: Send + Sync {
    async fn publish(&self, findings: &[Finding]) -> Result<(), ActionError>;
}

/// Log-only sink (default)
pub struct LogFindingSink;

#[async_trait]
impl FindingSink for LogFindingSink {
    async fn publish(&self, findings: &[Finding]) -> Result<(), ActionError> {
        for finding in findings {
            info!(
                title = %finding.title,
                severity = %finding.severity,
                source = ?finding.source,
                aggregation_key = %finding.aggregation_key,
                subject = ?finding.subject.as_ref().map(|s| &s.name),
                callbacks = finding.callback_choices().count(),
                "Finding"
            );
            for text in finding.markdown_blocks() {
                info!(aggregation_key = %finding.aggregation_key, "{}", text);
            }
        }
        Ok(())
    }
}

/// Webhook sink - POSTs each batch of findings to an HTTP endpoint
pub struct WebhookFindingSink {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct FindingBatch<'a> {
    findings: &'a [Finding],
}

impl WebhookFindingSink {
    pub fn new(endpoint: String, timeout_secs: u64) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl FindingSink for WebhookFindingSink {
    async fn publish(&self, findings: &[Finding]) -> Result<(), ActionError> {
        if findings.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&FindingBatch { findings })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(ActionError::WebhookStatus {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            endpoint = %self.endpoint,
            count = findings.len(),
            status = %status,
            "Delivered findings to webhook"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use findings::FindingSeverity;

    #[tokio::test]
    async fn test_log_sink_accepts_findings() {
        let finding = Finding::builder("title")
            .severity(FindingSeverity::Low)
            .aggregation_key("key")
            .add_markdown("details")
            .build()
            .unwrap();

        assert!(LogFindingSink.publish(&[finding]).await.is_ok());
    }

    #[test]
    fn test_webhook_sink_creation() {
        let sink = WebhookFindingSink::new("http://localhost:8080/findings".to_string(), 10);
        assert!(sink.is_ok());
    }
}
