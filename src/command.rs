//! Command line for the external search tool.

use std::fmt;

use crate::protocol::SearchRequest;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A fully derived invocation of the tool's `search` subcommand.
///
/// The process is spawned from [`ToolCommand::args`] directly, so the
/// keywords are a single argument and never pass through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub keywords: String,
    pub flags: Vec<String>,
}

impl ToolCommand {
    pub fn search(program: impl Into<String>, request: &SearchRequest) -> Self {
        let mut flags = Vec::with_capacity(8);

        if let Some(start) = request.start_date {
            flags.push("--start-date".to_string());
            flags.push(start.format(DATE_FORMAT).to_string());
        }
        if let Some(end) = request.end_date {
            flags.push("--end-date".to_string());
            flags.push(end.format(DATE_FORMAT).to_string());
        }
        flags.push("--max-results".to_string());
        flags.push(request.max_results.to_string());
        flags.push(if request.generate_summary { "--summarize" } else { "--no-summarize" }.to_string());
        flags.push("--format".to_string());
        flags.push("json".to_string());

        ToolCommand {
            program: program.into(),
            keywords: request.keywords.clone(),
            flags,
        }
    }

    /// Arguments passed to the process, excluding the program itself.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.flags.len() + 2);
        args.push("search".to_string());
        args.push(self.keywords.clone());
        args.extend(self.flags.iter().cloned());
        args
    }
}

/// Human-readable form, e.g. `paper-robot search "AI Security" --max-results 20 ...`.
impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} search \"{}\"", self.program, self.keywords.replace('"', "\\\""))?;
        for flag in &self.flags {
            write!(f, " {flag}")?;
        }
        Ok(())
    }
}
