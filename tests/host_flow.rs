//! End-to-end tests of the host controller: configuration prompts, tool
//! invocation and the messages the panel receives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use paper_panel::command::ToolCommand;
use paper_panel::config::ToolConfig;
use paper_panel::error::InvocationError;
use paper_panel::history::{HistoryStore, Outcome};
use paper_panel::host::{ConfigureOutcome, HostController, HostServices, PanelSink, Prompt};
use paper_panel::protocol::{HostMessage, PanelMessage, SearchRequest};
use paper_panel::runner::{ProcessRunner, ToolOutput, ToolRunner};
use paper_panel::settings::{keys, MemorySettingsStore, SettingsStore, TomlSettingsStore};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::Notify;

#[derive(Default)]
struct FakeServices {
    answers: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<Prompt>>,
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    reloads: Mutex<usize>,
    closed: Mutex<usize>,
}

impl FakeServices {
    fn answering(answers: &[Option<&str>]) -> Self {
        FakeServices {
            answers: Mutex::new(answers.iter().map(|a| a.map(str::to_string)).collect()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl HostServices for FakeServices {
    async fn prompt(&self, prompt: Prompt) -> Option<String> {
        self.asked.lock().unwrap().push(prompt);
        self.answers.lock().unwrap().pop_front().flatten()
    }

    fn notify_info(&self, text: &str) {
        self.infos.lock().unwrap().push(text.to_string());
    }

    fn notify_error(&self, text: &str) {
        self.errors.lock().unwrap().push(text.to_string());
    }

    fn reload(&self) {
        *self.reloads.lock().unwrap() += 1;
    }

    fn configuration_closed(&self) {
        *self.closed.lock().unwrap() += 1;
    }
}

/// Records the command and answers with a canned result.
struct FakeRunner {
    seen: Mutex<Vec<ToolCommand>>,
    respond: fn() -> Result<ToolOutput, InvocationError>,
}

impl FakeRunner {
    fn new(respond: fn() -> Result<ToolOutput, InvocationError>) -> Self {
        FakeRunner {
            seen: Mutex::new(Vec::new()),
            respond,
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, InvocationError> {
        self.seen.lock().unwrap().push(command.clone());
        (self.respond)()
    }
}

/// Blocks until released, to keep a search in flight.
struct GatedRunner {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl ToolRunner for GatedRunner {
    async fn run(&self, _command: &ToolCommand) -> Result<ToolOutput, InvocationError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(empty_output())
    }
}

fn empty_output() -> ToolOutput {
    ToolOutput {
        stdout: "[]".to_string(),
        stderr: String::new(),
    }
}

fn enoent() -> Result<ToolOutput, InvocationError> {
    Err(std::io::Error::new(std::io::ErrorKind::NotFound, "ENOENT").into())
}

fn tool(dir: &std::path::Path, program: &str) -> ToolConfig {
    ToolConfig {
        program: program.to_string(),
        working_dir: Some(dir.to_path_buf()),
    }
}

fn controller(
    settings: Arc<dyn SettingsStore>,
    runner: Arc<dyn ToolRunner>,
    services: Arc<dyn HostServices>,
    tool: ToolConfig,
) -> HostController {
    let history = Arc::new(HistoryStore::open_in_memory().unwrap());
    HostController::new(settings, runner, services, history, tool)
}

fn request(keywords: &str) -> SearchRequest {
    SearchRequest {
        keywords: keywords.to_string(),
        start_date: None,
        end_date: None,
        max_results: 20,
        generate_summary: true,
    }
}

fn drain(rx: &mut UnboundedReceiver<HostMessage>) -> Vec<HostMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn terminal(messages: &[HostMessage]) -> Vec<&HostMessage> {
    messages
        .iter()
        .filter(|m| matches!(m, HostMessage::SearchComplete(_) | HostMessage::SearchError { .. }))
        .collect()
}

#[tokio::test]
async fn get_config_replies_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let host = controller(
        Arc::new(MemorySettingsStore::new()),
        Arc::new(FakeRunner::new(enoent)),
        Arc::new(FakeServices::default()),
        tool(dir.path(), "paper-robot"),
    );
    let (tx, mut rx) = unbounded_channel::<HostMessage>();

    host.dispatch(PanelMessage::GetConfig, Arc::new(tx));

    let Some(HostMessage::ConfigLoaded(config)) = rx.recv().await else {
        panic!("expected configLoaded");
    };
    assert_eq!(config.api_key, "");
    assert_eq!(config.base_url, "https://api.openai.com/v1");
    assert_eq!(config.model, "gpt-4o-mini");
    assert_eq!(config.max_results, 20);
    assert_eq!(config.output_dir, "papers");
}

#[tokio::test]
async fn cancelling_first_prompt_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySettingsStore::new().with(keys::API_KEY, "sk-old"));
    let services = Arc::new(FakeServices::answering(&[None]));
    let host = controller(
        store.clone(),
        Arc::new(FakeRunner::new(enoent)),
        services.clone(),
        tool(dir.path(), "paper-robot"),
    );

    assert_eq!(host.configure_api().await, ConfigureOutcome::Cancelled);
    assert!(store.writes().is_empty());
    assert_eq!(*services.reloads.lock().unwrap(), 0);
    assert_eq!(*services.closed.lock().unwrap(), 1);

    let asked = services.asked.lock().unwrap();
    assert_eq!(asked.len(), 1);
    assert!(asked[0].secret);
    assert_eq!(asked[0].value, "sk-old");
}

#[tokio::test]
async fn completed_prompts_store_all_three_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySettingsStore::new());
    let services = Arc::new(FakeServices::answering(&[Some(" sk-new "), None, Some("gpt-4o")]));
    let host = controller(
        store.clone(),
        Arc::new(FakeRunner::new(enoent)),
        services.clone(),
        tool(dir.path(), "paper-robot"),
    );

    assert_eq!(host.configure_api().await, ConfigureOutcome::Saved);
    assert_eq!(store.writes(), vec![keys::API_KEY, keys::BASE_URL, keys::MODEL]);
    assert_eq!(*services.reloads.lock().unwrap(), 1);
    assert_eq!(*services.closed.lock().unwrap(), 0);

    let config = host.get_configuration();
    assert_eq!(config.api_key, "sk-new");
    // Cancelled second prompt keeps the pre-filled value.
    assert_eq!(config.base_url, "https://api.openai.com/v1");
    assert_eq!(config.model, "gpt-4o");

    let asked = services.asked.lock().unwrap();
    assert_eq!(asked[1].value, "https://api.openai.com/v1");
    assert!(!asked[1].secret);
}

#[tokio::test]
async fn empty_api_key_closes_the_flow_without_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySettingsStore::new());
    let services = Arc::new(FakeServices::answering(&[Some("   ")]));
    let host = controller(
        store.clone(),
        Arc::new(FakeRunner::new(enoent)),
        services.clone(),
        tool(dir.path(), "paper-robot"),
    );

    assert_eq!(host.configure_api().await, ConfigureOutcome::Cancelled);
    assert!(store.writes().is_empty());
    assert_eq!(*services.closed.lock().unwrap(), 1);
    assert_eq!(services.asked.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_write_reports_error_and_skips_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "apiKey = [[[").unwrap();
    let services = Arc::new(FakeServices::answering(&[Some("sk-new"), None, None]));
    let host = controller(
        Arc::new(TomlSettingsStore::new(path)),
        Arc::new(FakeRunner::new(enoent)),
        services.clone(),
        tool(dir.path(), "paper-robot"),
    );

    assert_eq!(host.configure_api().await, ConfigureOutcome::Failed);
    assert_eq!(services.errors.lock().unwrap().len(), 1);
    assert_eq!(*services.reloads.lock().unwrap(), 0);
    assert_eq!(*services.closed.lock().unwrap(), 1);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_the_tool_runs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new(enoent));
    let host = controller(
        Arc::new(MemorySettingsStore::new()),
        runner.clone(),
        Arc::new(FakeServices::default()),
        tool(dir.path(), "paper-robot"),
    );
    let (tx, mut rx) = unbounded_channel::<HostMessage>();
    let sink: Arc<dyn PanelSink> = Arc::new(tx);

    host.run_search(request("  "), sink.as_ref()).await;
    let mut too_many = request("rag");
    too_many.max_results = 500;
    host.run_search(too_many, sink.as_ref()).await;

    assert!(runner.seen.lock().unwrap().is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![
            HostMessage::SearchError {
                error: "please enter search keywords".to_string()
            },
            HostMessage::SearchError {
                error: "max results must be a whole number between 1 and 100, got \"500\"".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn spawn_failure_reports_one_search_error() {
    let dir = tempfile::tempdir().unwrap();
    let services = Arc::new(FakeServices::default());
    let runner = Arc::new(FakeRunner::new(enoent));
    let host = controller(
        Arc::new(MemorySettingsStore::new()),
        runner.clone(),
        services.clone(),
        tool(dir.path(), "paper-robot"),
    );
    let (tx, mut rx) = unbounded_channel::<HostMessage>();

    host.handle_search(request("AI Security"), Arc::new(tx)).await.unwrap();

    let messages = drain(&mut rx);
    assert_eq!(
        terminal(&messages),
        vec![&HostMessage::SearchError {
            error: "ENOENT".to_string()
        }]
    );
    assert_eq!(services.errors.lock().unwrap().len(), 1);
    assert!(services.infos.lock().unwrap().is_empty());

    assert_eq!(
        runner.seen.lock().unwrap()[0].to_string(),
        "paper-robot search \"AI Security\" --max-results 20 --summarize --format json"
    );

    let Some(HostMessage::HistoryLoaded { entries }) = messages.last() else {
        panic!("expected refreshed history");
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, Outcome::Error);
}

#[tokio::test]
async fn overlapping_search_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(GatedRunner {
        started: Notify::new(),
        release: Notify::new(),
    });
    let host = controller(
        Arc::new(MemorySettingsStore::new()),
        runner.clone(),
        Arc::new(FakeServices::default()),
        tool(dir.path(), "paper-robot"),
    );
    let (tx, mut rx) = unbounded_channel::<HostMessage>();
    let sink: Arc<dyn PanelSink> = Arc::new(tx);

    let first = host.handle_search(request("first"), sink.clone());
    runner.started.notified().await;

    host.run_search(request("second"), sink.as_ref()).await;
    let messages = drain(&mut rx);
    assert_eq!(
        terminal(&messages),
        vec![&HostMessage::SearchError {
            error: "a search is already running".to_string()
        }]
    );

    runner.release.notify_one();
    first.await.unwrap();
    let messages = drain(&mut rx);
    assert!(matches!(terminal(&messages)[..], [HostMessage::SearchComplete(_)]));
}

#[cfg(unix)]
mod process {
    use super::*;
    use std::fs;

    /// `sh search ...` runs the script named `search` in the working dir,
    /// standing in for the real tool's `search` subcommand.
    fn fake_tool(dir: &std::path::Path, script: &str) -> HostController {
        fs::write(dir.join("search"), script).unwrap();
        controller(
            Arc::new(MemorySettingsStore::new().with(keys::OUTPUT_DIR, "out")),
            Arc::new(ProcessRunner::new(dir)),
            Arc::new(FakeServices::default()),
            tool(dir, "sh"),
        )
    }

    #[tokio::test]
    async fn papers_written_to_output_dir_are_returned() {
        let dir = tempfile::tempdir().unwrap();
        let host = fake_tool(
            dir.path(),
            r#"
mkdir -p out
cat > out/papers_20240101_000000.json <<JSON
[{"title": "On Keywords", "authors": ["A", "B", "C", "D"], "published": "2024-01-01",
  "arxiv_id": "2401.00001v1", "pdf_url": "http://arxiv.org/pdf/2401.00001v1",
  "ai_summary": "About $1"}]
JSON
echo "saved"
"#,
        );
        let (tx, mut rx) = unbounded_channel::<HostMessage>();

        host.handle_search(request("graph rag"), Arc::new(tx)).await.unwrap();

        let messages = drain(&mut rx);
        let terminal = terminal(&messages);
        let [HostMessage::SearchComplete(result)] = terminal[..] else {
            panic!("expected searchComplete, got {messages:?}");
        };
        assert_eq!(result.papers.len(), 1);
        assert_eq!(result.papers[0].authors.len(), 4);
        assert_eq!(result.papers[0].ai_summary.as_deref(), Some("About graph rag"));
    }

    #[tokio::test]
    async fn earlier_result_file_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("out")).unwrap();
        fs::write(
            dir.path().join("out/papers_previous.json"),
            r#"[{"title": "Old", "authors": [], "published": "2024-01-01",
                "arxiv_id": "2401.00002v1", "pdf_url": "http://arxiv.org/pdf/2401.00002v1"}]"#,
        )
        .unwrap();
        // Finds nothing: exits 0 without writing a file.
        let host = fake_tool(dir.path(), "echo 'no matching papers'\n");
        let (tx, mut rx) = unbounded_channel::<HostMessage>();

        host.handle_search(request("nothing here"), Arc::new(tx)).await.unwrap();

        let messages = drain(&mut rx);
        let terminal = terminal(&messages);
        let [HostMessage::SearchComplete(result)] = terminal[..] else {
            panic!("expected searchComplete, got {messages:?}");
        };
        assert!(result.papers.is_empty());
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let host = fake_tool(dir.path(), "echo 'configure the API first' >&2\nexit 1\n");
        let (tx, mut rx) = unbounded_channel::<HostMessage>();

        host.handle_search(request("llm"), Arc::new(tx)).await.unwrap();

        let messages = drain(&mut rx);
        let terminal = terminal(&messages);
        let [HostMessage::SearchError { error }] = terminal[..] else {
            panic!("expected searchError, got {messages:?}");
        };
        assert!(error.starts_with("sh exited with"), "{error}");
        assert!(error.ends_with("configure the API first"), "{error}");
    }

    #[tokio::test]
    async fn arguments_reach_the_tool_unquoted() {
        let dir = tempfile::tempdir().unwrap();
        let host = fake_tool(
            dir.path(),
            r#"printf '%s\n' "$@" > args.txt
echo '[]'
"#,
        );
        let (tx, _rx) = unbounded_channel::<HostMessage>();
        let mut req = request("a \"quoted\" $HOME; rm -rf /");
        req.generate_summary = false;
        req.end_date = chrono::NaiveDate::from_ymd_opt(2024, 2, 29);

        host.handle_search(req, Arc::new(tx)).await.unwrap();

        let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert_eq!(
            args.lines().collect::<Vec<_>>(),
            vec![
                "a \"quoted\" $HOME; rm -rf /",
                "--end-date",
                "2024-02-29",
                "--max-results",
                "20",
                "--no-summarize",
                "--format",
                "json",
            ]
        );
    }
}
