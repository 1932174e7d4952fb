//! Claude Code hook protocol handling.
//!
//! This module handles the JSON input/output for the `PreToolUse` hook.
//! A request either gets an approval object on stdout, or no output at all,
//! which leaves the decision to the host's own permission system.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Write};

use crate::classifier::Classifier;
use crate::decision_log::{DecisionEntry, DecisionLog};

/// Tool name the host uses for shell commands.
pub const BASH_TOOL_NAME: &str = "Bash";

/// Input structure from Claude Code's `PreToolUse` hook.
#[derive(Debug, Deserialize)]
pub struct HookInput {
    /// The name of the tool being invoked (e.g., "Bash", "Read", "mcp__zen__chat").
    pub tool_name: Option<String>,

    /// Tool-specific input parameters. Shape depends on the tool.
    pub tool_input: Option<serde_json::Value>,
}

/// Output structure for approving a tool call.
#[derive(Debug, Serialize)]
pub struct HookOutput<'a> {
    /// Always "approve"; deferral produces no output.
    pub decision: &'static str,

    /// Human-readable explanation shown by the host.
    pub reason: Cow<'a, str>,
}

/// Result of processing a hook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    /// Approve without asking the user.
    Approve {
        tool_name: String,
        /// Reason sent back to the host.
        reason: String,
        /// Reason written to the decision log.
        log_reason: String,
    },

    /// Make no decision.
    Defer,
}

/// Error type for reading and parsing hook input.
#[derive(Debug)]
pub enum HookReadError {
    /// Failed to read from stdin.
    Io(io::Error),
    /// Input exceeded the configured size limit.
    InputTooLarge(usize),
    /// Failed to parse JSON input.
    Json(serde_json::Error),
}

impl fmt::Display for HookReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read input: {e}"),
            Self::InputTooLarge(len) => write!(f, "Input too large ({len} bytes)"),
            Self::Json(e) => write!(f, "Invalid JSON input: {e}"),
        }
    }
}

impl std::error::Error for HookReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::InputTooLarge(_) => None,
        }
    }
}

/// Read and parse hook input from stdin.
///
/// # Errors
///
/// See [`read_hook_input_from`].
pub fn read_hook_input(max_bytes: usize) -> Result<HookInput, HookReadError> {
    read_hook_input_from(io::stdin().lock(), max_bytes)
}

/// Read and parse hook input from `reader`.
///
/// # Errors
///
/// Returns [`HookReadError::Io`] if the reader fails, [`HookReadError::Json`]
/// if the input is not valid hook JSON, or [`HookReadError::InputTooLarge`] if
/// the input exceeds `max_bytes`.
pub fn read_hook_input_from<R: Read>(reader: R, max_bytes: usize) -> Result<HookInput, HookReadError> {
    let mut input = String::with_capacity(256);
    // Read up to limit + 1 to detect overflow
    reader
        .take(max_bytes as u64 + 1)
        .read_to_string(&mut input)
        .map_err(HookReadError::Io)?;

    if input.len() > max_bytes {
        return Err(HookReadError::InputTooLarge(input.len()));
    }

    serde_json::from_str(&input).map_err(HookReadError::Json)
}

/// Extract the command string from a Bash hook input.
#[must_use]
pub fn extract_command(input: &HookInput) -> Option<&str> {
    if input.tool_name.as_deref() != Some(BASH_TOOL_NAME) {
        return None;
    }

    input
        .tool_input
        .as_ref()?
        .get("command")?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// Decide a hook request.
#[must_use]
pub fn process_hook_input(input: &HookInput, classifier: &Classifier) -> HookResult {
    let Some(tool_name) = input.tool_name.as_deref() else {
        return HookResult::Defer;
    };

    if let Some(prefix) = classifier.policy().trusted_mcp_prefix(tool_name) {
        return HookResult::Approve {
            tool_name: tool_name.to_string(),
            reason: format!("Auto-approved: {prefix} (trusted MCP)"),
            log_reason: format!("Trusted MCP tool: {prefix}"),
        };
    }

    let Some(command) = extract_command(input) else {
        return HookResult::Defer;
    };

    let classification = classifier.evaluate(command);
    match classification.base_command() {
        Some(base) => HookResult::Approve {
            tool_name: tool_name.to_string(),
            reason: format!("Auto-approved: {base} (safe read-only)"),
            log_reason: format!("Safe command: {base}"),
        },
        None => {
            if let Some(reason) = classification.unsafe_reason() {
                tracing::debug!(command, "deferring: {reason}");
            }
            HookResult::Defer
        }
    }
}

/// Write the approval JSON to `out`.
///
/// # Errors
///
/// Returns any I/O or serialization error from writing to `out`.
pub fn write_approval<W: Write>(mut out: W, reason: &str) -> io::Result<()> {
    let output = HookOutput {
        decision: "approve",
        reason: Cow::Borrowed(reason),
    };
    serde_json::to_writer(&mut out, &output).map_err(io::Error::other)?;
    writeln!(out)?;
    out.flush()
}

/// Emit the hook response for `result`, logging approvals.
pub fn respond(result: &HookResult, log: Option<&DecisionLog>) {
    respond_to(io::stdout().lock(), result, log);
}

/// Like [`respond`], writing to `out`. Only approvals the host received
/// are logged.
pub fn respond_to<W: Write>(out: W, result: &HookResult, log: Option<&DecisionLog>) {
    let HookResult::Approve {
        tool_name,
        reason,
        log_reason,
    } = result
    else {
        return;
    };

    if let Err(e) = write_approval(out, reason) {
        tracing::debug!("approval not delivered: {e}");
        return;
    }

    if let Some(log) = log {
        log.record_silently(DecisionEntry::approved(tool_name, log_reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SafetyPolicy;

    fn parse(json: &str) -> HookInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_valid_bash_input() {
        let input = parse(r#"{"tool_name": "Bash", "tool_input": {"command": "git status"}}"#);
        assert_eq!(input.tool_name.as_deref(), Some("Bash"));
        assert_eq!(extract_command(&input), Some("git status"));
    }

    #[test]
    fn test_extract_command_non_bash() {
        let input = parse(r#"{"tool_name": "Read", "tool_input": {"file_path": "/tmp/foo"}}"#);
        assert_eq!(extract_command(&input), None);
    }

    #[test]
    fn test_extract_command_empty() {
        let input = parse(r#"{"tool_name": "Bash", "tool_input": {"command": ""}}"#);
        assert_eq!(extract_command(&input), None);
    }

    #[test]
    fn test_extract_command_not_a_string() {
        let input = parse(r#"{"tool_name": "Bash", "tool_input": {"command": ["ls"]}}"#);
        assert_eq!(extract_command(&input), None);
        let input = parse(r#"{"tool_name": "Bash", "tool_input": "ls"}"#);
        assert_eq!(extract_command(&input), None);
    }

    #[test]
    fn test_process_safe_bash() {
        let input = parse(r#"{"tool_name": "Bash", "tool_input": {"command": "ls -la"}}"#);
        assert_eq!(
            process_hook_input(&input, &Classifier::default()),
            HookResult::Approve {
                tool_name: "Bash".to_string(),
                reason: "Auto-approved: ls (safe read-only)".to_string(),
                log_reason: "Safe command: ls".to_string(),
            }
        );
    }

    #[test]
    fn test_process_unsafe_bash_defers() {
        let input = parse(r#"{"tool_name": "Bash", "tool_input": {"command": "git push"}}"#);
        assert_eq!(
            process_hook_input(&input, &Classifier::default()),
            HookResult::Defer
        );
    }

    #[test]
    fn test_process_trusted_mcp() {
        let input = parse(r#"{"tool_name": "mcp__ref__search_docs", "tool_input": {"query": "x"}}"#);
        match process_hook_input(&input, &Classifier::default()) {
            HookResult::Approve {
                reason, log_reason, ..
            } => {
                assert_eq!(reason, "Auto-approved: mcp__ref__ (trusted MCP)");
                assert_eq!(log_reason, "Trusted MCP tool: mcp__ref__");
            }
            HookResult::Defer => panic!("trusted MCP tool should be approved"),
        }
    }

    #[test]
    fn test_process_untrusted_mcp_defers() {
        let input = parse(r#"{"tool_name": "mcp__github__merge_pr"}"#);
        assert_eq!(
            process_hook_input(&input, &Classifier::default()),
            HookResult::Defer
        );
    }

    #[test]
    fn test_process_missing_tool_name_defers() {
        let input = parse(r#"{"tool_input": {"command": "ls"}}"#);
        assert_eq!(
            process_hook_input(&input, &Classifier::default()),
            HookResult::Defer
        );
    }

    #[test]
    fn test_process_respects_policy() {
        let classifier = Classifier::new(SafetyPolicy::empty());
        let input = parse(r#"{"tool_name": "Bash", "tool_input": {"command": "ls"}}"#);
        assert_eq!(process_hook_input(&input, &classifier), HookResult::Defer);
        let input = parse(r#"{"tool_name": "mcp__zen__chat"}"#);
        assert_eq!(process_hook_input(&input, &classifier), HookResult::Defer);
    }

    #[test]
    fn test_read_hook_input_from_reader() {
        let json = br#"{"tool_name": "Bash", "tool_input": {"command": "pwd"}}"#;
        let input = read_hook_input_from(&json[..], 1024).unwrap();
        assert_eq!(extract_command(&input), Some("pwd"));
    }

    #[test]
    fn test_read_hook_input_invalid_json() {
        let err = read_hook_input_from(&b"not json"[..], 1024).unwrap_err();
        assert!(matches!(err, HookReadError::Json(_)));
        assert!(err.to_string().starts_with("Invalid JSON input:"));
    }

    #[test]
    fn test_read_hook_input_too_large() {
        let json = br#"{"tool_name": "Bash", "tool_input": {"command": "ls"}}"#;
        let err = read_hook_input_from(&json[..], 10).unwrap_err();
        assert!(matches!(err, HookReadError::InputTooLarge(11)));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    fn approval() -> HookResult {
        HookResult::Approve {
            tool_name: "Bash".to_string(),
            reason: "Auto-approved: ls (safe read-only)".to_string(),
            log_reason: "Safe command: ls".to_string(),
        }
    }

    #[test]
    fn test_respond_logs_delivered_approval() {
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::new(dir.path().join("log.json"), 10);
        let mut buf = Vec::new();

        respond_to(&mut buf, &approval(), Some(&log));

        assert!(!buf.is_empty());
        let entries = log.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "Safe command: ls");
    }

    #[test]
    fn test_respond_skips_log_when_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::new(dir.path().join("log.json"), 10);

        respond_to(ClosedPipe, &approval(), Some(&log));

        assert!(log.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_respond_defer_writes_nothing() {
        let mut buf = Vec::new();
        respond_to(&mut buf, &HookResult::Defer, None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_write_approval() {
        let mut buf = Vec::new();
        write_approval(&mut buf, "Auto-approved: ls (safe read-only)").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "{\"decision\":\"approve\",\"reason\":\"Auto-approved: ls (safe read-only)\"}\n"
        );
    }
}
