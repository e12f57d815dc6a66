//! Messages exchanged between the panel and the host controller.
//!
//! Both directions are adjacently tagged JSON records of the form
//! `{"type": "...", "payload": ...}` so the wire shape stays stable if the
//! panel is ever moved out of process.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::history::HistoryEntry;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_RESULTS: u32 = 20;
pub const DEFAULT_OUTPUT_DIR: &str = "papers";

/// Lower and upper bound accepted for `maxResults`.
pub const MAX_RESULTS_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// User-facing settings snapshot. Always fully populated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_results: u32,
    pub output_dir: String,
}

impl Configuration {
    /// An empty API key means the user has not configured the tool yet.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let api_key = if self.api_key.is_empty() { "<unset>" } else { "***" };
        f.debug_struct("Configuration")
            .field("api_key", &api_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_results", &self.max_results)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub keywords: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub max_results: u32,
    pub generate_summary: bool,
}

impl SearchRequest {
    /// Checks the invariants every request must hold before the tool runs,
    /// whoever built it.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.keywords.trim().is_empty() {
            return Err(ValidationError::EmptyKeywords);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ValidationError::ReversedRange);
            }
        }
        if !MAX_RESULTS_RANGE.contains(&self.max_results) {
            return Err(ValidationError::MaxResults(self.max_results.to_string()));
        }
        Ok(())
    }
}

/// One paper as written by the external tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub published: NaiveDate,
    pub arxiv_id: String,
    pub pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    /// The paper abstract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub papers: Vec<Paper>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Intents sent from the panel to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PanelMessage {
    Search(SearchRequest),
    Config,
    GetConfig,
    GetHistory,
    DeleteHistoryEntry { id: i64 },
}

/// Replies and events sent from the host to the panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum HostMessage {
    ConfigLoaded(Configuration),
    SearchComplete(SearchResult),
    SearchError { error: String },
    HistoryLoaded { entries: Vec<HistoryEntry> },
}
