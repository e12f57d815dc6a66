//! Side panel for searching and summarizing papers with an external
//! `paper-robot` style command line tool.

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod history;
pub mod host;
pub mod panel;
pub mod protocol;
pub mod results;
pub mod runner;
pub mod settings;
