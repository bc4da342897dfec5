//! Sheaf CLI - Command line interface
//!
//! Project-based builds - all configuration from sheaf.json

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sheaf_config::{Mode, Phase};
use sheaf_core::{Bundler, NativeFileSystem};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, Level};

mod config;
mod logging;
mod report;

use crate::config::{load_bundler_config, parse_phase_level, LogConfig};
use crate::logging::LogFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Development,
    Production,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Development => Mode::Development,
            ModeArg::Production => Mode::Production,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Pretty => LogFormat::Pretty,
            FormatArg::Compact => LogFormat::Compact,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sheaf", about = "Sheaf module bundler - Project-based builds", version)]
struct Cli {
    /// Configuration file path (default: ./sheaf.json)
    #[arg(value_name = "CONFIG", default_value = "sheaf.json")]
    config: PathBuf,

    /// Override the configured mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Global log level: error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: Level,

    /// Per-phase log level, e.g. `--log split=debug` (repeatable)
    #[arg(long = "log", value_name = "PHASE=LEVEL", value_parser = parse_phase_level)]
    phase_levels: Vec<(Phase, Level)>,

    #[arg(long, value_enum, default_value = "compact")]
    log_format: FormatArg,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Build without writing the output directory
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let mut config = LogConfig {
            global: self.log_level,
            ..LogConfig::default()
        };
        for &(phase, level) in &self.phase_levels {
            config.set(phase, level);
        }
        config
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("❌ {:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    logging::init_with_file(&cli.log_config(), cli.log_format.into(), cli.log_file.as_deref())?;

    let mut config = load_bundler_config(&cli.config)?;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    info!(
        target: "sheaf::cli",
        config = %cli.config.display(),
        context = %config.context.display(),
        "Configuration loaded"
    );

    let bundler = Bundler::new(config, Arc::new(NativeFileSystem::new()));
    let result = if cli.dry_run {
        bundler.build()
    } else {
        bundler.run()
    }
    .context("构建失败")?;

    report::print_warnings(&result.warnings);
    report::print_summary(&result, &bundler.output_dir(), !cli.dry_run);
    Ok(())
}
