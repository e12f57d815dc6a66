use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::command::ToolCommand;
use crate::error::InvocationError;

/// Captured output of a successful tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, InvocationError>;
}

/// Runs the tool as a child process and waits for it to exit.
pub struct ProcessRunner {
    working_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        ProcessRunner {
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, InvocationError> {
        tracing::info!(cwd = %self.working_dir.display(), "running {}", command);

        let output = Command::new(&command.program)
            .args(command.args())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                tracing::error!("failed to start {}: {}", command.program, e);
                e
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!("{} stderr: {}", command.program, line.trim());
        }

        if !output.status.success() {
            return Err(InvocationError::Failed {
                program: command.program.clone(),
                status: output.status,
                stderr: last_meaningful_line(&stderr, &stdout),
            });
        }

        tracing::info!("{} finished ({} bytes of output)", command.program, stdout.len());
        Ok(ToolOutput { stdout, stderr })
    }
}

/// The tool prints its diagnostics last; that line is the useful one.
fn last_meaningful_line(stderr: &str, stdout: &str) -> String {
    let last = |text: &str| {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
    };
    last(stderr)
        .or_else(|| last(stdout))
        .unwrap_or_else(|| "no output".to_string())
}
