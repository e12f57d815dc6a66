//! Panel state: form contents, search phase and what the host last told us.
//!
//! Rendering lives in the binary; everything here is plain data so the
//! interaction rules can be exercised without a window.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::history::HistoryEntry;
use crate::protocol::{
    Configuration, HostMessage, PanelMessage, Paper, SearchRequest, DEFAULT_MAX_RESULTS, MAX_RESULTS_RANGE,
};

/// Authors shown before collapsing the rest into "et al.".
const SHOWN_AUTHORS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Searching,
    Success,
    Error,
    /// The host is prompting for API settings; ends in a reload.
    ConfigPrompted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    pub text: String,
}

impl Status {
    fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Status {
            kind,
            text: text.into(),
        }
    }
}

/// Raw form input as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    pub keywords: String,
    pub start_date: String,
    pub end_date: String,
    pub max_results: String,
    pub generate_summary: bool,
    /// Set once the user edits max results, so config snapshots stop overwriting it.
    pub max_results_edited: bool,
}

impl Default for SearchForm {
    fn default() -> Self {
        SearchForm {
            keywords: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            max_results: DEFAULT_MAX_RESULTS.to_string(),
            generate_summary: true,
            max_results_edited: false,
        }
    }
}

impl SearchForm {
    pub fn set_max_results(&mut self, value: String) {
        self.max_results = value;
        self.max_results_edited = true;
    }

    pub fn validate(&self) -> Result<SearchRequest, ValidationError> {
        let keywords = self.keywords.trim();
        if keywords.is_empty() {
            return Err(ValidationError::EmptyKeywords);
        }

        let start_date = parse_date("start date", &self.start_date)?;
        let end_date = parse_date("end date", &self.end_date)?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(ValidationError::ReversedRange);
            }
        }

        let max_results = self
            .max_results
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| MAX_RESULTS_RANGE.contains(n))
            .ok_or_else(|| ValidationError::MaxResults(self.max_results.clone()))?;

        Ok(SearchRequest {
            keywords: keywords.to_string(),
            start_date,
            end_date,
            max_results,
            generate_summary: self.generate_summary,
        })
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

#[derive(Debug, Clone, Default)]
pub struct Panel {
    pub form: SearchForm,
    pub phase: Phase,
    pub status: Option<Status>,
    pub papers: Vec<Paper>,
    pub config: Option<Configuration>,
    pub history: Vec<HistoryEntry>,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.config.as_ref().is_some_and(Configuration::is_configured)
    }

    pub fn is_searching(&self) -> bool {
        self.phase == Phase::Searching
    }

    /// Validates the form. Returns the message to send, or `None` if nothing
    /// should reach the host.
    pub fn submit(&mut self) -> Option<PanelMessage> {
        if self.is_searching() {
            return None;
        }

        match self.form.validate() {
            Ok(request) => {
                self.phase = Phase::Searching;
                self.papers.clear();
                self.status = Some(Status::new(StatusKind::Info, "Searching papers..."));
                Some(PanelMessage::Search(request))
            }
            Err(e) => {
                self.phase = Phase::Idle;
                self.status = Some(Status::new(StatusKind::Error, e.to_string()));
                None
            }
        }
    }

    /// Asks the host for the configuration prompts. A running search keeps
    /// its phase so it can neither be restarted nor lose its result.
    pub fn request_config(&mut self) -> PanelMessage {
        if !self.is_searching() {
            self.phase = Phase::ConfigPrompted;
        }
        PanelMessage::Config
    }

    pub fn request_config_snapshot(&self) -> PanelMessage {
        PanelMessage::GetConfig
    }

    /// The host finished or abandoned the prompt flow without reloading.
    pub fn config_prompt_closed(&mut self) {
        if self.phase == Phase::ConfigPrompted {
            self.phase = Phase::Idle;
        }
    }

    pub fn on_message(&mut self, message: HostMessage) {
        match message {
            HostMessage::SearchComplete(result) => {
                self.phase = Phase::Success;
                let text = match result.message {
                    Some(message) if result.papers.is_empty() => message,
                    _ => format!("Search complete: {} papers", result.papers.len()),
                };
                self.status = Some(Status::new(StatusKind::Success, text));
                self.papers = result.papers;
            }
            HostMessage::SearchError { error } => {
                self.phase = Phase::Error;
                self.status = Some(Status::new(StatusKind::Error, format!("Search failed: {error}")));
            }
            HostMessage::ConfigLoaded(config) => {
                if !self.form.max_results_edited {
                    self.form.max_results = config.max_results.to_string();
                }
                self.config = Some(config);
            }
            HostMessage::HistoryLoaded { entries } => {
                self.history = entries;
            }
        }
    }

    /// Refills the form from a previous search.
    pub fn apply_history(&mut self, id: i64) {
        let Some(entry) = self.history.iter().find(|e| e.id == id) else {
            return;
        };
        let request = &entry.request;
        let date = |d: Option<NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();

        self.form = SearchForm {
            keywords: request.keywords.clone(),
            start_date: date(request.start_date),
            end_date: date(request.end_date),
            max_results: request.max_results.to_string(),
            generate_summary: request.generate_summary,
            max_results_edited: true,
        };
    }
}

/// First three authors, then " et al." if there are more.
pub fn format_authors(authors: &[String]) -> String {
    let shown = authors
        .iter()
        .take(SHOWN_AUTHORS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if authors.len() > SHOWN_AUTHORS {
        format!("{shown} et al.")
    } else {
        shown
    }
}
