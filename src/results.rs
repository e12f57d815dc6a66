//! Reading the papers the external tool produced.
//!
//! The tool is asked for `--format json`. Depending on its version it either
//! prints the paper array to stdout or saves `papers_<timestamp>.json` under
//! its output directory, so both places are checked. A run that finds nothing
//! exits successfully without writing a file, so only files that appeared or
//! changed since [`OutputSnapshot::take`] count as this run's output.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::InvocationError;
use crate::protocol::{Paper, SearchResult};
use crate::runner::ToolOutput;

/// The `*.json` files of an output directory and their modification times.
#[derive(Debug, Clone, Default)]
pub struct OutputSnapshot {
    files: HashMap<PathBuf, SystemTime>,
}

impl OutputSnapshot {
    /// Lists `dir` as it is now. A missing directory is an empty snapshot.
    pub fn take(dir: &Path) -> Self {
        OutputSnapshot {
            files: json_files(dir).collect(),
        }
    }

    fn is_new(&self, path: &Path, modified: SystemTime) -> bool {
        self.files.get(path) != Some(&modified)
    }
}

pub fn collect(
    output: &ToolOutput,
    output_dir: &Path,
    before: &OutputSnapshot,
) -> Result<SearchResult, InvocationError> {
    if let Some(papers) = papers_from_stdout(&output.stdout) {
        tracing::debug!("read {} papers from tool stdout", papers.len());
        return Ok(found(papers));
    }

    let Some(path) = newest_result_file(output_dir, before) else {
        tracing::info!(dir = %output_dir.display(), "tool wrote no new result file");
        return Ok(SearchResult {
            papers: Vec::new(),
            message: Some(format!(
                "The search finished but wrote no new results to {}",
                output_dir.display()
            )),
        });
    };

    let contents = fs::read_to_string(&path)?;
    let papers: Vec<Paper> = serde_json::from_str(&contents)
        .map_err(|source| InvocationError::Results { path: path.clone(), source })?;
    tracing::debug!(file = %path.display(), "read {} papers", papers.len());

    let mut result = found(papers);
    result.message = Some(format!("Saved to {}", path.display()));
    Ok(result)
}

fn found(papers: Vec<Paper>) -> SearchResult {
    let message = if papers.is_empty() {
        Some("No matching papers found".to_string())
    } else {
        None
    };
    SearchResult { papers, message }
}

fn papers_from_stdout(stdout: &str) -> Option<Vec<Paper>> {
    let trimmed = stdout.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn json_files(dir: &Path) -> impl Iterator<Item = (PathBuf, SystemTime)> {
    fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.path(), modified))
        })
}

/// Newest `*.json` in `dir` that is not in `before` or has changed since.
fn newest_result_file(dir: &Path, before: &OutputSnapshot) -> Option<PathBuf> {
    json_files(dir)
        .filter(|(path, modified)| before.is_new(path, *modified))
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}
