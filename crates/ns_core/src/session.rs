use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::SummaryMetrics;
use crate::types::SummaryRequest;

/// A summary together with the configuration that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub text: String,
    pub request: SummaryRequest,
    pub generated_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub truncated: bool,
}

/// State remembered for one interactive session.
///
/// The article and its summary are only ever set and cleared together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    article_text: Option<String>,
    summary: Option<SummaryRecord>,
    updated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, article_text: String, summary: SummaryRecord) {
        self.updated_at = Some(summary.generated_at);
        self.article_text = Some(article_text);
        self.summary = Some(summary);
    }

    pub fn clear(&mut self) {
        self.article_text = None;
        self.summary = None;
        self.updated_at = Some(Utc::now());
    }

    pub fn article_text(&self) -> Option<&str> {
        self.article_text.as_deref()
    }

    pub fn summary(&self) -> Option<&SummaryRecord> {
        self.summary.as_ref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
    }

    /// The stored pair and its metrics, if a summary is present.
    pub fn view(&self) -> Option<SessionView<'_>> {
        match (&self.article_text, &self.summary) {
            (Some(article), Some(summary)) if !summary.text.is_empty() => Some(SessionView {
                article,
                summary,
                metrics: SummaryMetrics::compute(article, &summary.text),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionView<'a> {
    pub article: &'a str,
    pub summary: &'a SummaryRecord,
    pub metrics: SummaryMetrics,
}
