use crate::finding::*;
use chrono::Utc;

pub struct FindingBuilder {
    title: String,
    description: Option<String>,
    severity: FindingSeverity,
    source: FindingSource,
    aggregation_key: Option<String>,
    subject: Option<FindingSubject>,
    enrichments: Vec<Enrichment>,
}

impl FindingBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            severity: FindingSeverity::Info,
            source: FindingSource::None,
            aggregation_key: None,
            subject: None,
            enrichments: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn severity(mut self, severity: FindingSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn source(mut self, source: FindingSource) -> Self {
        self.source = source;
        self
    }

    pub fn aggregation_key(mut self, key: impl Into<String>) -> Self {
        self.aggregation_key = Some(key.into());
        self
    }

    pub fn subject(mut self, subject: FindingSubject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn add_enrichment(mut self, blocks: Vec<Block>) -> Self {
        self.enrichments.push(Enrichment { blocks });
        self
    }

    pub fn add_markdown(self, text: impl Into<String>) -> Self {
        self.add_enrichment(vec![Block::markdown(text)])
    }

    pub fn build(self) -> Result<Finding, BuildError> {
        if self.title.trim().is_empty() {
            return Err(BuildError::MissingTitle);
        }
        let aggregation_key = self
            .aggregation_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(BuildError::MissingAggregationKey)?;

        Ok(Finding {
            title: self.title,
            description: self.description,
            severity: self.severity,
            source: self.source,
            aggregation_key,
            subject: self.subject,
            enrichments: self.enrichments,
            created_at: Utc::now(),
        })
    }
}

impl Finding {
    pub fn builder(title: impl Into<String>) -> FindingBuilder {
        FindingBuilder::new(title)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Finding title must not be empty")]
    MissingTitle,
    #[error("Finding aggregation key is required")]
    MissingAggregationKey,
}
