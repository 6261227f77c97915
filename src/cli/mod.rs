//! CLI entry point for conductor.

pub mod repl;

pub use repl::ReplCommand;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conductor multi-agent CLI
#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Run multi-agent workflows against an MCP tool service")]
pub struct Cli {
    /// Config file (defaults to $CONDUCTOR_CONFIG or the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Tool service URL, overrides config and CONDUCTOR_TOOLS_URL
    #[arg(long, global = true)]
    pub tools_url: Option<String>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send messages to a workflow
    Chat(ChatArgs),
    /// List the tool catalog offered by the tool service
    Tools,
    /// Show configured workflows and their agents
    Workflows,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Workflow type to run
    #[arg(short, long, default_value = "plan")]
    pub workflow: String,

    /// Session id (a random one is generated when omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Print the session log as JSON after each run
    #[arg(long)]
    pub json: bool,

    /// Message to send; starts an interactive session when omitted
    pub message: Option<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
