use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::config::ClientConfig;

#[derive(Parser, Debug)]
#[command(name = "research-desk")]
#[command(version)]
#[command(about = "Start, follow and review research sessions on a research-chat backend")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Backend base URL (overrides config and RESEARCH_DESK_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// WebSocket URL of the push channel; polling alone is used without it
    #[arg(long, global = true)]
    pub push_url: Option<String>,

    /// Status poll interval in milliseconds
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Answer yes to confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a research session
    Start {
        /// The research question
        query: String,
        /// Follow progress until the session completes or stops
        #[arg(long, short)]
        follow: bool,
    },
    /// Load a session and follow it while it runs (defaults to the last active one)
    Watch { id: Option<String> },
    /// Stop a running session
    Stop { id: String },
    /// Show a session once
    Show { id: String },
    /// List chat history
    List,
    /// Show or change the selected model
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Print shell completions
    Completions { shell: Shell },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SettingsAction {
    /// Select the model the backend uses for new research
    Set { model: String },
}

impl Args {
    /// Fold command-line overrides into a loaded config.
    pub fn apply_to(&self, cfg: &mut ClientConfig) {
        if let Some(url) = &self.base_url {
            cfg.base_url = url.clone();
        }
        if let Some(url) = &self.push_url {
            cfg.push_url = Some(url.clone());
        }
        if let Some(ms) = self.poll_interval_ms {
            cfg.poll_interval_ms = ms;
        }
    }
}
