use iced::{
    widget::{button, checkbox, column, container, row, scrollable, text, text_input, text_input::Id, Column},
    Element, Length, Task, Theme, Font, Subscription, Color,
    time, clipboard,
    keyboard::{self, Key},
    event::{self, Event as IcedEvent},
    alignment,
    window,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paper_panel::bridge::{self, BridgeEvent, PromptRequest};
use paper_panel::config::Config;
use paper_panel::history::Outcome;
use paper_panel::panel::{format_authors, Panel, Status, StatusKind};
use paper_panel::protocol::{PanelMessage, Paper};

/// History entries listed under the form.
const SHOWN_HISTORY: usize = 5;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PAPER_PANEL_LOG")
        .unwrap_or_else(|_| EnvFilter::new("paper_panel=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> iced::Result {
    init_tracing();
    let config = Config::load();

    iced::application("Paper Robot", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: iced::Size::new(config.window.width as f32, config.window.height as f32),
            min_size: Some(iced::Size::new(
                config.window.min_width as f32,
                config.window.min_height as f32,
            )),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(App::new)
}

#[derive(Debug, Clone)]
enum Message {
    Bridge(BridgeEvent),
    KeywordsChanged(String),
    StartDateChanged(String),
    EndDateChanged(String),
    MaxResultsChanged(String),
    SummaryToggled(bool),
    Submit,
    Configure,
    PromptInputChanged(String),
    PromptSubmit,
    PromptCancel,
    UseHistory(i64),
    DeleteHistory(i64),
    CopyLink(String),
    Tick,
    Escape,
}

struct ActivePrompt {
    request: PromptRequest,
    input: String,
}

struct App {
    panel: Panel,
    host: Option<UnboundedSender<PanelMessage>>,
    prompt: Option<ActivePrompt>,
    loading_frame: usize,
    keywords_id: Id,
    prompt_id: Id,
}

impl App {
    fn new() -> (Self, Task<Message>) {
        let keywords_id = Id::unique();

        let app = App {
            panel: Panel::new(),
            host: None,
            prompt: None,
            loading_frame: 0,
            keywords_id: keywords_id.clone(),
            prompt_id: Id::unique(),
        };

        (app, text_input::focus(keywords_id))
    }

    fn send(&self, message: PanelMessage) {
        match &self.host {
            Some(host) => {
                if host.send(message).is_err() {
                    tracing::warn!("host bridge is closed");
                }
            }
            None => tracing::warn!("host not connected yet, dropping {:?}", message),
        }
    }

    fn refresh(&self) {
        self.send(self.panel.request_config_snapshot());
        self.send(PanelMessage::GetHistory);
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Bridge(event) => return self.on_bridge(event),
            Message::KeywordsChanged(value) => self.panel.form.keywords = value,
            Message::StartDateChanged(value) => self.panel.form.start_date = value,
            Message::EndDateChanged(value) => self.panel.form.end_date = value,
            Message::MaxResultsChanged(value) => self.panel.form.set_max_results(value),
            Message::SummaryToggled(value) => self.panel.form.generate_summary = value,
            Message::Submit => {
                if let Some(search) = self.panel.submit() {
                    self.loading_frame = 0;
                    self.send(search);
                }
            }
            Message::Configure => {
                let config = self.panel.request_config();
                self.send(config);
            }
            Message::PromptInputChanged(value) => {
                if let Some(prompt) = &mut self.prompt {
                    prompt.input = value;
                }
            }
            Message::PromptSubmit => {
                if let Some(prompt) = self.prompt.take() {
                    prompt.request.answer(Some(prompt.input));
                }
            }
            Message::PromptCancel => {
                if let Some(prompt) = self.prompt.take() {
                    prompt.request.answer(None);
                }
            }
            Message::UseHistory(id) => self.panel.apply_history(id),
            Message::DeleteHistory(id) => self.send(PanelMessage::DeleteHistoryEntry { id }),
            Message::CopyLink(url) => return clipboard::write(url),
            Message::Tick => {
                if self.panel.is_searching() {
                    self.loading_frame = (self.loading_frame + 1) % 80;
                }
            }
            Message::Escape => {
                if self.prompt.is_some() {
                    return self.update(Message::PromptCancel);
                }
                return iced::exit();
            }
        }
        Task::none()
    }

    fn on_bridge(&mut self, event: BridgeEvent) -> Task<Message> {
        match event {
            BridgeEvent::Connected(host) => {
                self.host = Some(host);
                self.refresh();
            }
            BridgeEvent::Host(message) => self.panel.on_message(message),
            BridgeEvent::Prompt(request) => {
                // A prompt left open from an earlier flow is cancelled.
                if let Some(previous) = self.prompt.take() {
                    previous.request.answer(None);
                }
                self.prompt = Some(ActivePrompt {
                    input: request.prompt.value.clone(),
                    request,
                });
                return text_input::focus(self.prompt_id.clone());
            }
            BridgeEvent::Reload => {
                tracing::info!("reloading panel");
                self.prompt = None;
                self.panel = Panel::new();
                self.refresh();
                return text_input::focus(self.keywords_id.clone());
            }
            BridgeEvent::ConfigClosed => {
                self.prompt = None;
                self.panel.config_prompt_closed();
            }
            BridgeEvent::Failed(error) => {
                self.panel.status = Some(Status {
                    kind: StatusKind::Error,
                    text: format!("Host failed to start: {error}"),
                });
            }
        }
        Task::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let host = Subscription::run(bridge::connect).map(Message::Bridge);

        let timer = if self.panel.is_searching() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Escape)
            } else {
                None
            }
        });

        Subscription::batch([host, timer, events])
    }

    fn view(&self) -> Element<Message> {
        let header = column![
            text("Paper Robot").size(24),
            text("Paper search and AI summaries").size(13),
        ]
        .spacing(4)
        .align_x(alignment::Horizontal::Center)
        .width(Length::Fill);

        let configured = self.panel.is_configured();
        let config_status = if self.panel.config.is_none() {
            text("Connecting...").size(13)
        } else if configured {
            text("✓ API configured").size(13).color(Color::from_rgb(0.45, 0.8, 0.5))
        } else {
            text("⚠ Configure the API first").size(13).color(Color::from_rgb(0.95, 0.75, 0.3))
        };

        let body: Element<Message> = if let Some(prompt) = &self.prompt {
            self.prompt_view(prompt)
        } else if !configured {
            let mut setup = column![
                button(text("Configure API"))
                    .on_press(Message::Configure)
                    .width(Length::Fill)
                    .padding(10),
                text("An LLM API key is needed before the first search.").size(13),
            ]
            .spacing(15);
            if let Some(status) = &self.panel.status {
                setup = setup.push(self.status_view(status, false));
            }
            setup.into()
        } else {
            self.search_view()
        };

        let content = column![header, config_status, body]
            .spacing(15)
            .padding(20);

        scrollable(content).height(Length::Fill).into()
    }

    fn prompt_view<'a>(&'a self, prompt: &'a ActivePrompt) -> Element<'a, Message> {
        let input = text_input("", &prompt.input)
            .on_input(Message::PromptInputChanged)
            .on_submit(Message::PromptSubmit)
            .secure(prompt.request.prompt.secret)
            .padding(8)
            .id(self.prompt_id.clone());

        column![
            text(&prompt.request.prompt.label).size(15),
            input,
            row![
                button(text("OK")).on_press(Message::PromptSubmit).padding(8),
                button(text("Cancel"))
                    .on_press(Message::PromptCancel)
                    .style(button::secondary)
                    .padding(8),
            ]
            .spacing(10),
        ]
        .spacing(10)
        .into()
    }

    fn search_view(&self) -> Element<Message> {
        let form = &self.panel.form;
        let searching = self.panel.is_searching();

        let keywords = text_input("e.g. AI Security, RAG", &form.keywords)
            .on_input(Message::KeywordsChanged)
            .on_submit(Message::Submit)
            .padding(8)
            .id(self.keywords_id.clone());
        let start = text_input("YYYY-MM-DD", &form.start_date)
            .on_input(Message::StartDateChanged)
            .padding(8);
        let end = text_input("YYYY-MM-DD", &form.end_date)
            .on_input(Message::EndDateChanged)
            .padding(8);
        let max = text_input("1-100", &form.max_results)
            .on_input(Message::MaxResultsChanged)
            .padding(8);

        let search_button = button(text("Search papers"))
            .on_press_maybe((!searching).then_some(Message::Submit))
            .width(Length::Fill)
            .padding(10);
        let config_button = button(text("Reconfigure API"))
            .on_press(Message::Configure)
            .style(button::secondary)
            .width(Length::Fill)
            .padding(10);

        let mut content = Column::new()
            .spacing(12)
            .push(column![text("Keywords").size(13), keywords].spacing(5))
            .push(row![
                column![text("Start date").size(13), start].spacing(5),
                column![text("End date").size(13), end].spacing(5),
            ]
            .spacing(10))
            .push(column![text("Max results").size(13), max].spacing(5))
            .push(
                checkbox("Generate AI summary", form.generate_summary)
                    .on_toggle(Message::SummaryToggled),
            )
            .push(search_button)
            .push(config_button);

        if let Some(status) = &self.panel.status {
            content = content.push(self.status_view(status, searching));
        }

        if !self.panel.papers.is_empty() {
            content = content.push(text(format!("Results ({} papers)", self.panel.papers.len())).size(16));
            for (index, paper) in self.panel.papers.iter().enumerate() {
                content = content.push(paper_card(index, paper));
            }
        }

        if !self.panel.history.is_empty() {
            content = content.push(column![text("Recent searches").size(13), self.history_view()].spacing(5));
        }

        content.into()
    }

    fn status_view(&self, status: &Status, searching: bool) -> Element<'static, Message> {
        let color = match status.kind {
            StatusKind::Info => Color::from_rgb(0.6, 0.7, 0.95),
            StatusKind::Success => Color::from_rgb(0.45, 0.8, 0.5),
            StatusKind::Error => Color::from_rgb(0.95, 0.45, 0.45),
        };

        let label = if searching {
            let frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
            format!("{} {}", frames[self.loading_frame % frames.len()], status.text)
        } else {
            status.text.clone()
        };

        container(text(label).size(14).color(color))
            .padding(10)
            .width(Length::Fill)
            .style(container::rounded_box)
            .into()
    }

    fn history_view(&self) -> Element<'static, Message> {
        let mut list = Column::new().spacing(4);
        for entry in self.panel.history.iter().take(SHOWN_HISTORY) {
            let marker = match entry.outcome {
                Outcome::Ok => format!("{} papers", entry.paper_count),
                Outcome::Error => "failed".to_string(),
            };
            list = list.push(
                row![
                    button(text(entry.request.keywords.clone()).size(13))
                        .on_press(Message::UseHistory(entry.id))
                        .style(button::text)
                        .width(Length::Fill),
                    text(marker).size(12),
                    button(text("✕").size(12))
                        .on_press(Message::DeleteHistory(entry.id))
                        .style(button::text),
                ]
                .spacing(8)
                .align_y(alignment::Vertical::Center),
            );
        }
        list.into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn paper_card(index: usize, paper: &Paper) -> Element<'static, Message> {
    let mut card = Column::new()
        .spacing(6)
        .push(text(format!("{}. {}", index + 1, paper.title)).size(15))
        .push(text(format!("👤 {}", format_authors(&paper.authors))).size(12))
        .push(text(format!("📅 {}", paper.published)).size(12))
        .push(
            row![
                text(format!("📄 {}", paper.arxiv_id)).size(12),
                button(text("Copy PDF link").size(12))
                    .on_press(Message::CopyLink(paper.pdf_url.clone()))
                    .style(button::text),
            ]
            .spacing(8)
            .align_y(alignment::Vertical::Center),
        );

    if let Some(summary) = &paper.ai_summary {
        card = card.push(
            container(text(format!("AI summary: {summary}")).size(13))
                .padding(8)
                .style(container::rounded_box),
        );
    }

    container(card)
        .padding(10)
        .width(Length::Fill)
        .style(container::bordered_box)
        .into()
}
