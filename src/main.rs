#![forbid(unsafe_code)]
//! permission-filter: Claude Code `PreToolUse` hook.
//!
//! Auto-approves read-only shell commands and trusted MCP tools. Anything
//! else gets no answer, so the host falls back to its normal prompt.
//!
//! Exit behavior:
//!   - Exit 0 with JSON {"decision": "approve", "reason": ...} = approve
//!   - Exit 0 with no output = no decision
//!   - Exit 1 with a message on stderr = input could not be read or parsed

use clap::Parser;
use permission_filter::cli::{self, Cli};
use permission_filter::config::Config;
use permission_filter::decision_log::DecisionLog;
use permission_filter::hook::{self, HookReadError};
use permission_filter::Classifier;
use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;

/// Env var holding a `tracing` filter directive, e.g. `debug`.
const ENV_LOG_FILTER: &str = "PFILTER_LOG";

/// Env var that raises diagnostics to `debug` when set.
const ENV_VERBOSE: &str = "PFILTER_VERBOSE";

/// Configure colored output based on TTY detection.
///
/// Disables colors if stderr is not a terminal (e.g., piped to a file).
fn configure_colors() {
    if !io::stderr().is_terminal() {
        colored::control::set_override(false);
    }
}

/// Diagnostics go to stderr; stdout carries the hook protocol.
fn init_tracing() {
    let default = if std::env::var_os(ENV_VERBOSE).is_some() {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_env(ENV_LOG_FILTER).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn main() {
    configure_colors();
    init_tracing();

    // Parse CLI arguments (subcommands). If parsing fails (e.g., unknown flags),
    // print the clap error and exit instead of falling into hook mode and
    // blocking on stdin.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    if cli.command.is_some() {
        match cli::run_command(cli) {
            Ok(code) => std::process::exit(code),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    std::process::exit(run_hook());
}

/// Hook mode: one request on stdin, at most one decision on stdout.
fn run_hook() -> i32 {
    let config = Config::load();

    // Escape hatch: make no decisions at all.
    if Config::is_bypassed() {
        return 0;
    }

    let input = match hook::read_hook_input(config.general.max_input_bytes()) {
        Ok(input) => input,
        Err(HookReadError::InputTooLarge(len)) => {
            tracing::warn!(
                "stdin input ({len} bytes) exceeds limit ({} bytes); making no decision",
                config.general.max_input_bytes()
            );
            return 0;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    let classifier = Classifier::new(config.safety_policy());
    for invalid in classifier.invalid_patterns() {
        tracing::warn!(
            pattern = %invalid.pattern,
            "unsafe pattern is not a valid regex, matching literally: {}",
            invalid.error
        );
    }

    let result = hook::process_hook_input(&input, &classifier);
    let log = DecisionLog::from_config(&config.log);
    hook::respond(&result, log.as_ref());
    0
}
