//! CLI argument parsing and command handling.
//!
//! Without a subcommand the binary runs in hook mode (see `main.rs`). The
//! subcommands exist for people: testing a command against the allowlist,
//! inspecting the merged configuration, and reading the decision log.

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::classifier::{Classification, Classifier};
use crate::config::Config;
use crate::decision_log::DecisionLog;

/// Auto-approve read-only shell commands for AI coding agents.
///
/// Runs as a `PreToolUse` hook: reads the tool call as JSON on stdin and
/// prints an approval for allowlisted read-only commands. Everything else
/// is left to the agent's normal permission prompt.
#[derive(Parser, Debug)]
#[command(name = "permission-filter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run (omit to run in hook mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify a command without running the hook protocol
    #[command(name = "check")]
    Check {
        /// Command to classify
        command: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective merged configuration
    #[command(name = "show-config")]
    ShowConfig,

    /// Write a commented sample configuration file
    #[command(name = "init")]
    Init {
        /// Output path (defaults to the user config path)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show recent auto-approval decisions
    #[command(name = "log")]
    Log {
        /// Number of entries to show
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
}

/// JSON shape printed by `check --json`.
#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    command: &'a str,
    safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl<'a> CheckReport<'a> {
    fn new(command: &'a str, classification: &'a Classification) -> Self {
        Self {
            command,
            safe: classification.is_safe(),
            base_command: classification.base_command(),
            reason: classification.unsafe_reason().map(ToString::to_string),
        }
    }
}

/// Run a subcommand, returning the process exit code.
///
/// # Errors
///
/// Returns an error if a file cannot be read or written, or output cannot
/// be serialized.
pub fn run_command(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let config = Config::load();

    match cli.command {
        Some(Command::Check { command, json }) => Ok(check_command(&config, &command, json)?),
        Some(Command::ShowConfig) => {
            show_config(&config)?;
            Ok(0)
        }
        Some(Command::Init { output, force }) => {
            init_config(output, force)?;
            Ok(0)
        }
        Some(Command::Log { limit, json }) => {
            show_log(&config, limit, json)?;
            Ok(0)
        }
        None => Ok(0),
    }
}

fn check_command(
    config: &Config,
    command: &str,
    json: bool,
) -> Result<i32, serde_json::Error> {
    let classifier = Classifier::new(config.safety_policy());
    let classification = classifier.evaluate(command);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&CheckReport::new(command, &classification))?
        );
    } else {
        match &classification {
            Classification::Safe { base_command } => {
                println!("{} {}", "SAFE".green().bold(), command);
                println!(
                    "  {} auto-approved as '{}'",
                    "→".bright_black(),
                    base_command.cyan()
                );
            }
            Classification::Unsafe(reason) => {
                println!("{} {}", "DEFER".yellow().bold(), command);
                println!("  {} {}", "→".bright_black(), reason);
            }
        }
    }

    Ok(if classification.is_safe() { 0 } else { 1 })
}

fn show_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir().ok();
    let layers = Config::layer_paths(cwd.as_deref());

    println!("{}", "# Config layers (lowest priority first)".bright_black());
    if layers.is_empty() {
        println!("{}", "#   (none, using built-in defaults)".bright_black());
    }
    for path in &layers {
        println!("{}", format!("#   {}", path.display()).bright_black());
    }
    println!();
    print!("{}", toml::to_string_pretty(config)?);

    let classifier = Classifier::new(config.safety_policy());
    for invalid in classifier.invalid_patterns() {
        eprintln!(
            "{} unsafe pattern '{}' is not a valid regex ({}); matching it literally",
            "warning:".yellow().bold(),
            invalid.pattern,
            invalid.error
        );
    }

    Ok(())
}

fn init_config(output: Option<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = match output {
        Some(path) => path,
        None => Config::user_config_path().ok_or("Could not determine config directory")?,
    };

    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, Config::generate_sample_config())?;
    println!("{} {}", "Wrote".green(), path.display());
    Ok(())
}

fn show_log(config: &Config, limit: usize, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Reading works even when writing is disabled.
    let log = DecisionLog::new(config.log.path(), config.log.max_entries());
    let entries = log.recent(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No decisions logged in {}", log.path().display());
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:<24} {}",
            entry.timestamp.bright_black(),
            entry.tool_name.cyan(),
            entry.reason
        );
    }
    Ok(())
}
