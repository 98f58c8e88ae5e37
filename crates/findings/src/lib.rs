//! # Findings
//!
//! Structured notifications produced by cluster actions. A finding carries a
//! title, a severity, the subsystem that raised it and an aggregation key used
//! by downstream sinks to group repeats. Enrichments attach extra blocks:
//! Markdown text, or callback choices that re-run a named action.
//!
//! ```rust
//! use findings::*;
//! use serde_json::json;
//!
//! let finding = Finding::builder("HPA *web* reached max replicas: *5*")
//!     .severity(FindingSeverity::Low)
//!     .source(FindingSource::KubernetesApiServer)
//!     .aggregation_key("alert_on_hpa_reached_limit")
//!     .add_enrichment(vec![
//!         Block::markdown("Pods are using *80 %* of the requested cpu."),
//!         Block::callback(vec![CallbackChoice::new(
//!             "Update HPA max replicas to: 6",
//!             "scale_hpa_callback",
//!             json!({ "max_replicas": 6 }),
//!         )]),
//!     ])
//!     .build()
//!     .expect("valid finding");
//!
//! assert_eq!(finding.callback_choices().count(), 1);
//! ```

pub mod builder;
pub mod finding;

pub use builder::*;
pub use finding::*;
