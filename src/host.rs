//! Host side of the panel: turns panel intents into settings reads,
//! configuration prompts and tool invocations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use toml::Value;

use crate::command::ToolCommand;
use crate::config::ToolConfig;
use crate::error::InvocationError;
use crate::history::{HistoryStore, Outcome};
use crate::protocol::{Configuration, HostMessage, PanelMessage, SearchRequest, SearchResult};
use crate::results::{self, OutputSnapshot};
use crate::runner::ToolRunner;
use crate::settings::{self, keys, SettingsStore};

/// Number of history entries sent with `historyLoaded`.
pub const HISTORY_LIMIT: usize = 20;

/// Where host messages for the panel go.
pub trait PanelSink: Send + Sync {
    fn post(&self, message: HostMessage);
}

impl PanelSink for UnboundedSender<HostMessage> {
    fn post(&self, message: HostMessage) {
        if self.send(message).is_err() {
            tracing::warn!("panel is gone, dropping host message");
        }
    }
}

/// A single line of input requested from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub label: String,
    pub value: String,
    pub secret: bool,
}

impl Prompt {
    pub fn text(label: &str, value: &str) -> Self {
        Prompt {
            label: label.to_string(),
            value: value.to_string(),
            secret: false,
        }
    }

    pub fn secret(label: &str, value: &str) -> Self {
        Prompt {
            secret: true,
            ..Prompt::text(label, value)
        }
    }
}

/// Facilities of the hosting environment.
#[async_trait]
pub trait HostServices: Send + Sync {
    /// Ask the user for a value. `None` means the prompt was cancelled.
    async fn prompt(&self, prompt: Prompt) -> Option<String>;
    fn notify_info(&self, text: &str);
    fn notify_error(&self, text: &str);
    /// Reload the whole panel so new settings take effect.
    fn reload(&self);
    /// The configuration flow ended without saving, so no reload follows.
    fn configuration_closed(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    Saved,
    Cancelled,
    Failed,
}

#[derive(Clone)]
pub struct HostController {
    settings: Arc<dyn SettingsStore>,
    runner: Arc<dyn ToolRunner>,
    services: Arc<dyn HostServices>,
    history: Arc<HistoryStore>,
    tool: ToolConfig,
    searching: Arc<AtomicBool>,
}

impl HostController {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        runner: Arc<dyn ToolRunner>,
        services: Arc<dyn HostServices>,
        history: Arc<HistoryStore>,
        tool: ToolConfig,
    ) -> Self {
        HostController {
            settings,
            runner,
            services,
            history,
            tool,
            searching: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handles one panel message. Long-running work is spawned, so this
    /// returns immediately.
    pub fn dispatch(&self, message: PanelMessage, sink: Arc<dyn PanelSink>) {
        match message {
            PanelMessage::Search(request) => {
                self.handle_search(request, sink);
            }
            PanelMessage::Config => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.configure_api().await;
                });
            }
            PanelMessage::GetConfig => {
                sink.post(HostMessage::ConfigLoaded(self.get_configuration()));
            }
            PanelMessage::GetHistory => self.post_history(sink.as_ref()),
            PanelMessage::DeleteHistoryEntry { id } => {
                if let Err(e) = self.history.delete_entry(id) {
                    tracing::warn!("could not delete history entry {id}: {e}");
                }
                self.post_history(sink.as_ref());
            }
        }
    }

    pub fn get_configuration(&self) -> Configuration {
        settings::read_configuration(self.settings.as_ref())
    }

    /// Prompts for API key, base URL and model, then persists all three and
    /// reloads the panel.
    pub async fn configure_api(&self) -> ConfigureOutcome {
        let current = self.get_configuration();

        let api_key = self
            .services
            .prompt(Prompt::secret("Enter API key", &current.api_key))
            .await
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let Some(api_key) = api_key else {
            tracing::debug!("API configuration cancelled");
            self.services.configuration_closed();
            return ConfigureOutcome::Cancelled;
        };

        let base_url = self.prompt_or_keep("Enter API base URL", current.base_url).await;
        let model = self.prompt_or_keep("Enter model name", current.model).await;

        let mut failed = false;
        for (key, value) in [
            (keys::API_KEY, api_key),
            (keys::BASE_URL, base_url),
            (keys::MODEL, model),
        ] {
            if let Err(e) = self.settings.set(key, Value::String(value)) {
                tracing::error!("failed to store {key}: {e}");
                failed = true;
            }
        }

        if failed {
            self.services
                .notify_error("Could not save the API configuration, see the log for details");
            self.services.configuration_closed();
            return ConfigureOutcome::Failed;
        }

        tracing::info!("API configuration saved");
        self.services.notify_info("API configuration saved");
        self.services.reload();
        ConfigureOutcome::Saved
    }

    async fn prompt_or_keep(&self, label: &str, current: String) -> String {
        self.services
            .prompt(Prompt::text(label, &current))
            .await
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(current)
    }

    /// Starts a search in the background and returns its task handle.
    pub fn handle_search(&self, request: SearchRequest, sink: Arc<dyn PanelSink>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_search(request, sink.as_ref()).await;
        })
    }

    /// Runs one search to completion, posting exactly one terminal message.
    pub async fn run_search(&self, request: SearchRequest, sink: &dyn PanelSink) {
        if let Err(e) = request.validate() {
            tracing::warn!(keywords = %request.keywords, "rejecting invalid search: {e}");
            sink.post(HostMessage::SearchError { error: e.to_string() });
            return;
        }

        let Some(_in_flight) = InFlight::acquire(&self.searching) else {
            tracing::warn!(keywords = %request.keywords, "rejecting search, another one is running");
            sink.post(HostMessage::SearchError {
                error: InvocationError::Busy.to_string(),
            });
            return;
        };

        match self.search(&request).await {
            Ok(result) => {
                let count = result.papers.len();
                tracing::info!(keywords = %request.keywords, "search finished with {count} papers");
                sink.post(HostMessage::SearchComplete(result));
                self.services
                    .notify_info(&format!("Paper search finished: {count} papers"));
                self.record(&request, Outcome::Ok, count);
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(keywords = %request.keywords, "search failed: {error}");
                sink.post(HostMessage::SearchError { error: error.clone() });
                self.services.notify_error(&format!("Search failed: {error}"));
                self.record(&request, Outcome::Error, 0);
            }
        }
        self.post_history(sink);
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResult, InvocationError> {
        let config = self.get_configuration();
        let command = ToolCommand::search(&self.tool.program, request);
        let output_dir = self.tool.working_dir().join(&config.output_dir);
        let before = OutputSnapshot::take(&output_dir);
        let output = self.runner.run(&command).await?;
        results::collect(&output, &output_dir, &before)
    }

    fn record(&self, request: &SearchRequest, outcome: Outcome, paper_count: usize) {
        if let Err(e) = self.history.add_entry(request, outcome, paper_count) {
            tracing::warn!("could not record search history: {e}");
        }
    }

    fn post_history(&self, sink: &dyn PanelSink) {
        match self.history.list_entries(HISTORY_LIMIT) {
            Ok(entries) => sink.post(HostMessage::HistoryLoaded { entries }),
            Err(e) => tracing::warn!("could not load search history: {e}"),
        }
    }
}

/// Marks a search as running until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
