//! `varflow` command-line tool.

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::{ColorChoice, Parser};
use tracing::level_filters::LevelFilter;
use varflow_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use varflow_cli::commands::{
    print_json, run_deps, run_normalize, run_replay, run_request, run_triggers,
};
use varflow_cli::config::load_config;
use varflow_cli::logging::{LogConfig, LogFormat, init_logging};
use varflow_cli::summary::{print_deps, print_replay, print_triggers};
use varflow_stream::StreamStatus;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Command::Normalize(args) => print_json(&run_normalize(args, &config)?)?,
        Command::Request(args) => print_json(&run_request(args, &config)?)?,
        Command::Triggers(args) => print_triggers(&run_triggers(args, &config)?),
        Command::Deps(args) => print_deps(&run_deps(args, &config)?),
        Command::Replay(args) => {
            let report = run_replay(args, &config)?;
            print_replay(&report);
            if report.status == Some(StreamStatus::Error) {
                return Ok(2);
            }
        }
    }
    Ok(0)
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file.clone_from(&cli.log_file);
    config.log_payloads = cli.log_payloads;
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
