//! Text passes that run before a command is classified.
//!
//! These mirror how the hook reads a shell string, not how a shell would:
//!
//! - leading `NAME=value` assignments are dropped,
//! - compound statements are cut at `|`, `;`, `&&` and `||` (quote-unaware);
//!   the strict split also cuts at a lone `&` and at line breaks,
//! - the remainder is word-split with POSIX quoting rules,
//! - one transparent wrapper (`sudo`, `time`, ...) is peeled off.
//!
//! The operator cut ignores quoting on purpose. A quoted operator splits a
//! quoted word in half, and the word split that follows then fails, which
//! the classifier treats as unsafe.

use memchr::{memchr2, memchr3};
use regex::Regex;
use std::sync::LazyLock;

use crate::policy::SafetyPolicy;

/// Leading `NAME=value` assignments, each followed by whitespace.
static ENV_ASSIGNMENT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\w+=\S+\s+)*").unwrap());

/// A word-split command with any transparent wrapper removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandWords {
    /// The executable as written (may include a directory path).
    pub program: String,
    /// Arguments following the program.
    pub args: Vec<String>,
    /// The wrapper that was stripped, if any.
    pub wrapper: Option<String>,
}

impl CommandWords {
    /// The executable name without any directory component.
    #[must_use]
    pub fn base_name(&self) -> &str {
        base_name(&self.program)
    }

    /// First argument, which is the subcommand for multi-mode tools.
    #[must_use]
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Drop leading `NAME=value` tokens.
#[must_use]
pub fn strip_env_assignments(command: &str) -> &str {
    let end = ENV_ASSIGNMENT_PREFIX
        .find(command)
        .map_or(0, |m| m.end());
    &command[end..]
}

/// Locate the next sequencing operator at or after `from`.
///
/// Returns `(start, len)`. With `background` unset, a lone `&` is skipped.
/// With it set, a lone `&` and `|&` also separate commands, while the `&`
/// of a redirection (`2>&1`, `<&3`, `&>file`) never does.
fn find_operator(bytes: &[u8], mut from: usize, background: bool) -> Option<(usize, usize)> {
    while from < bytes.len() {
        let offset = memchr3(b'|', b';', b'&', &bytes[from..])?;
        let pos = from + offset;
        let next = bytes.get(pos + 1).copied();
        match bytes[pos] {
            b'|' if next == Some(b'|') => return Some((pos, 2)),
            b'|' if background && next == Some(b'&') => return Some((pos, 2)),
            b'|' | b';' => return Some((pos, 1)),
            _ if next == Some(b'&') => return Some((pos, 2)),
            _ if background && !is_redirect_ampersand(bytes, pos) => return Some((pos, 1)),
            _ => from = pos + 1,
        }
    }
    None
}

fn is_redirect_ampersand(bytes: &[u8], pos: usize) -> bool {
    let prev = pos.checked_sub(1).map(|i| bytes[i]);
    matches!(prev, Some(b'>' | b'<')) || bytes.get(pos + 1) == Some(&b'>')
}

/// Next command boundary for [`split_segments`]: any operator, a lone `&`,
/// or a line break.
fn find_separator(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let line_break = memchr2(b'\n', b'\r', &bytes[from..]).map(|offset| (from + offset, 1));
    match (find_operator(bytes, from, true), line_break) {
        (Some(op), Some(nl)) => Some(if nl.0 < op.0 { nl } else { op }),
        (op, nl) => op.or(nl),
    }
}

/// The text before the first sequencing operator, trimmed.
#[must_use]
pub fn first_segment(command: &str) -> &str {
    match find_operator(command.as_bytes(), 0, false) {
        Some((start, _)) => command[..start].trim(),
        None => command,
    }
}

/// Every command in a statement, trimmed. Empty segments are kept.
///
/// Unlike [`first_segment`], this also splits at a lone `&` and at line
/// breaks, since a shell runs each of those as a separate command.
#[must_use]
pub fn split_segments(command: &str) -> Vec<&str> {
    let bytes = command.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    while let Some((pos, len)) = find_separator(bytes, start) {
        segments.push(command[start..pos].trim());
        start = pos + len;
    }
    segments.push(command[start..].trim());
    segments
}

/// Word-split a single segment and strip one transparent wrapper.
///
/// Returns `None` when the text cannot be split (unbalanced quotes, a
/// trailing escape) or contains no words.
#[must_use]
pub fn split_command_words(segment: &str, policy: &SafetyPolicy) -> Option<CommandWords> {
    let mut words = shlex::split(segment)?.into_iter();
    let first = words.next()?;
    let rest: Vec<String> = words.collect();

    // A bare wrapper ("sudo", "time") is judged as itself.
    if policy.is_wrapper(&first) && !rest.is_empty() {
        let mut wrapped = rest.into_iter();
        let program = wrapped.next()?;
        return Some(CommandWords {
            program,
            args: wrapped.collect(),
            wrapper: Some(first),
        });
    }

    Some(CommandWords {
        program: first,
        args: rest,
        wrapper: None,
    })
}

/// Strip any directory component: `/usr/bin/ls` -> `ls`.
#[must_use]
pub fn base_name(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}
