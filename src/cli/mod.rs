//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// Offline issue-tracker mirror (git-versioned JSON snapshot + `SQLite` index)
#[derive(Parser, Debug)]
#[command(name = "offtrac", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Snapshot root directory (default: ./db)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare the snapshot directory and print its head
    Init,

    /// Pull changes from the tracker into the snapshot
    Sync(RemoteArgs),

    /// Load the snapshot into the relational index
    Reindex(ReindexArgs),

    /// Sync, then reindex
    Update(UpdateArgs),

    /// Run a stored report against the index
    Report(ReportArgs),

    /// List stored reports
    Reports,

    /// Show snapshot and index state
    Status,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Tracker connection overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Tracker base URL
    #[arg(long)]
    pub url: Option<String>,

    /// Tracker user name
    #[arg(long)]
    pub user: Option<String>,

    /// Calls per multicall request
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReindexArgs {
    /// Rebuild every table instead of applying the git delta
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Rebuild every table instead of applying the git delta
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Report id
    pub id: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    pub format: ReportFormat,

    /// User substituted for `$USER` in the report query
    #[arg(long, default_value = crate::format::DEFAULT_REPORT_USER)]
    pub user: String,
}

/// Report output formats.
#[derive(ValueEnum, Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ReportFormat {
    /// `{"results": [...]}`
    #[default]
    Json,
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tab,
    /// The stored query text
    Sql,
}

/// Arguments for the completions command.
#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Supported shells for completion generation.
#[derive(ValueEnum, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    #[value(name = "powershell")]
    #[value(alias = "pwsh")]
    /// `PowerShell`
    PowerShell,
    /// Elvish
    Elvish,
}
