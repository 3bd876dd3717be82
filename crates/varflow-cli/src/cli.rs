//! CLI argument definitions for the `varflow` tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "varflow",
    version,
    about = "Inspect reactive variable graphs and stream captures",
    long_about = "Inspect reactive variable graphs and stream captures.\n\n\
                  Normalizes session snapshots into backend payloads, lists triggers and\n\
                  observed dependencies, and replays NDJSON stream captures."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Engine configuration file (TOML).
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Include stream payloads in log output.
    #[arg(long = "log-payloads", global = true)]
    pub log_payloads: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Normalize every variable of a session into a `{ data, lookup }` payload.
    Normalize(NormalizeArgs),

    /// Build the backend request for one derived variable.
    Request(RequestArgs),

    /// List the trigger map of a session's variables.
    Triggers(SessionArgs),

    /// Show the values each top-level variable observes through its `deps`.
    Deps(SessionArgs),

    /// Replay an NDJSON stream capture through the stream state machine.
    Replay(ReplayArgs),
}

#[derive(Args)]
pub struct SessionArgs {
    /// Session snapshot (JSON).
    #[arg(value_name = "SESSION")]
    pub session: PathBuf,
}

#[derive(Args)]
pub struct NormalizeArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Stamp a fresh force key on the slot owning this trigger index.
    #[arg(long = "trigger", value_name = "N")]
    pub trigger: Option<usize>,

    /// Fail if any variable is a stream variable.
    #[arg(long = "preload")]
    pub preload: bool,
}

#[derive(Args)]
pub struct RequestArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Uid of the derived variable to request.
    #[arg(long = "uid", value_name = "UID")]
    pub uid: String,

    /// Trigger index (0 forces the variable itself).
    #[arg(long = "trigger", value_name = "N")]
    pub trigger: Option<usize>,

    /// Force key to use instead of a generated one.
    #[arg(long = "force-key", value_name = "KEY", requires = "trigger")]
    pub force_key: Option<String>,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Captured stream events, one JSON object per line.
    #[arg(value_name = "EVENTS")]
    pub events: PathBuf,

    /// Dotted path used to key `add` events.
    #[arg(long = "key-accessor", value_name = "PATH")]
    pub key_accessor: Option<String>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
