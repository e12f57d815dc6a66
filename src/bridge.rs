//! Connects the iced panel to a [`HostController`].
//!
//! The bridge runs as an iced subscription. It first hands the panel a
//! sender for [`PanelMessage`]s, then forwards everything the host produces
//! (replies, prompts, reload requests) back into the update loop in order.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use iced::futures::channel::mpsc;
use iced::futures::{SinkExt, Stream};
use iced::stream;
use notify_rust::Notification;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::oneshot;

use crate::config::Config;
use crate::history::HistoryStore;
use crate::host::{HostController, HostServices, PanelSink, Prompt};
use crate::protocol::{HostMessage, PanelMessage};
use crate::runner::ProcessRunner;
use crate::settings::TomlSettingsStore;

const APP_NAME: &str = "Paper Robot";

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The host is ready; panel messages go through this sender.
    Connected(UnboundedSender<PanelMessage>),
    Host(HostMessage),
    Prompt(PromptRequest),
    Reload,
    /// The configuration flow ended without a reload.
    ConfigClosed,
    /// The host could not be started.
    Failed(String),
}

/// A prompt waiting for the user. Answer it exactly once; later answers are
/// ignored and dropping it unanswered counts as a cancel.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub prompt: Prompt,
    reply: Arc<Mutex<Option<oneshot::Sender<Option<String>>>>>,
}

impl PromptRequest {
    pub fn new(prompt: Prompt) -> (Self, oneshot::Receiver<Option<String>>) {
        let (tx, rx) = oneshot::channel();
        let request = PromptRequest {
            prompt,
            reply: Arc::new(Mutex::new(Some(tx))),
        };
        (request, rx)
    }

    pub fn answer(&self, value: Option<String>) {
        let sender = self.reply.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sender) = sender {
            let _ = sender.send(value);
        }
    }
}

struct BridgeSink(UnboundedSender<BridgeEvent>);

impl PanelSink for BridgeSink {
    fn post(&self, message: HostMessage) {
        if self.0.send(BridgeEvent::Host(message)).is_err() {
            tracing::warn!("bridge closed, dropping host message");
        }
    }
}

struct BridgeServices {
    events: UnboundedSender<BridgeEvent>,
}

#[async_trait]
impl HostServices for BridgeServices {
    async fn prompt(&self, prompt: Prompt) -> Option<String> {
        let (request, answer) = PromptRequest::new(prompt);
        if self.events.send(BridgeEvent::Prompt(request)).is_err() {
            return None;
        }
        answer.await.ok().flatten()
    }

    fn notify_info(&self, text: &str) {
        desktop_notification(APP_NAME, text);
    }

    fn notify_error(&self, text: &str) {
        desktop_notification(&format!("{APP_NAME}: error"), text);
    }

    fn reload(&self) {
        let _ = self.events.send(BridgeEvent::Reload);
    }

    fn configuration_closed(&self) {
        let _ = self.events.send(BridgeEvent::ConfigClosed);
    }
}

fn desktop_notification(summary: &str, body: &str) {
    let summary = summary.to_string();
    let body = body.to_string();
    // Showing a notification can block on the session bus.
    tokio::task::spawn_blocking(move || {
        if let Err(e) = Notification::new()
            .appname("paper-panel")
            .summary(&summary)
            .body(&body)
            .show()
        {
            tracing::warn!("could not show notification: {e}");
        }
    });
}

fn build_controller(events: UnboundedSender<BridgeEvent>) -> anyhow::Result<HostController> {
    let config = Config::load();
    let config_dir = Config::get_config_dir();

    let history = match HistoryStore::open(&config_dir.join("history.sqlite")) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("search history unavailable, keeping it in memory: {e}");
            HistoryStore::open_in_memory().context("opening in-memory history")?
        }
    };

    let settings = TomlSettingsStore::new(config_dir.join("settings.toml"));
    tracing::info!(
        settings = %settings.path().display(),
        tool = %config.tool.program,
        "host controller ready"
    );

    Ok(HostController::new(
        Arc::new(settings),
        Arc::new(ProcessRunner::new(config.tool.working_dir())),
        Arc::new(BridgeServices { events }),
        Arc::new(history),
        config.tool,
    ))
}

pub fn connect() -> impl Stream<Item = BridgeEvent> {
    stream::channel(100, |mut output: mpsc::Sender<BridgeEvent>| async move {
        let (events_tx, mut events_rx) = unbounded_channel::<BridgeEvent>();
        let (panel_tx, mut panel_rx) = unbounded_channel::<PanelMessage>();

        let controller = match build_controller(events_tx.clone()) {
            Ok(controller) => controller,
            Err(e) => {
                tracing::error!("failed to start host: {e:#}");
                let _ = output.send(BridgeEvent::Failed(format!("{e:#}"))).await;
                return;
            }
        };
        let sink: Arc<dyn PanelSink> = Arc::new(BridgeSink(events_tx));

        if output.send(BridgeEvent::Connected(panel_tx)).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                Some(message) = panel_rx.recv() => {
                    tracing::debug!(?message, "panel message");
                    controller.dispatch(message, sink.clone());
                }
                Some(event) = events_rx.recv() => {
                    if output.send(event).await.is_err() {
                        tracing::debug!("panel closed, stopping bridge");
                        break;
                    }
                }
                else => break,
            }
        }
    })
}
