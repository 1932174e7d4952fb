//! Command safety classifier.
//!
//! Decides whether a shell command string may be auto-approved. The
//! classifier is a conservative allowlist: anything it cannot positively
//! identify as read-only is reported as unsafe, which defers the decision
//! to the host's own permission prompt.
//!
//! # Pipeline
//!
//! ```text
//! strip NAME=value ─▶ cut at |, ;, &&, || ─▶ word split ─▶ strip wrapper
//!        ─▶ safe-command set ─▶ safe-subcommand map ─▶ unsafe-pattern scan
//! ```
//!
//! The unsafe-pattern scan always runs against the original, unmodified
//! command string.

use regex::Regex;
use std::fmt;

use crate::normalize::{first_segment, split_command_words, split_segments, strip_env_assignments};
use crate::policy::{SafetyPolicy, SegmentPolicy};

/// Why a command was not approved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsafeReason {
    /// Nothing left to judge after stripping.
    Empty,
    /// The command could not be word-split.
    Tokenize,
    /// The base command is not in the safe-command set.
    NotAllowlisted { command: String },
    /// The subcommand is not in the command's safe-subcommand set.
    Subcommand { command: String, subcommand: String },
    /// An unsafe pattern matched the command text.
    UnsafePattern { pattern: String },
}

impl fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no command to evaluate"),
            Self::Tokenize => write!(f, "command could not be parsed"),
            Self::NotAllowlisted { command } => {
                write!(f, "'{command}' is not an allowlisted command")
            }
            Self::Subcommand {
                command,
                subcommand,
            } => write!(f, "'{command} {subcommand}' is not a read-only subcommand"),
            Self::UnsafePattern { pattern } => {
                write!(f, "command matches unsafe pattern '{pattern}'")
            }
        }
    }
}

/// Outcome of classifying one command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Safe {
        /// The resolved program as written, e.g. `ls` or `/usr/bin/ls`.
        base_command: String,
    },
    Unsafe(UnsafeReason),
}

impl Classification {
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::Safe { .. })
    }

    /// The resolved program for a safe command.
    #[must_use]
    pub fn base_command(&self) -> Option<&str> {
        match self {
            Self::Safe { base_command } => Some(base_command),
            Self::Unsafe(_) => None,
        }
    }

    #[must_use]
    pub const fn unsafe_reason(&self) -> Option<&UnsafeReason> {
        match self {
            Self::Safe { .. } => None,
            Self::Unsafe(reason) => Some(reason),
        }
    }
}

/// A user-supplied unsafe pattern that is not a valid regex.
///
/// Such patterns are still enforced, as literal substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub pattern: String,
    pub error: String,
}

#[derive(Debug)]
struct CompiledPattern {
    source: String,
    regex: Regex,
}

/// Stateless classifier over an immutable [`SafetyPolicy`].
///
/// Build once and reuse; patterns are compiled in [`Classifier::new`].
#[derive(Debug)]
pub struct Classifier {
    policy: SafetyPolicy,
    patterns: Vec<CompiledPattern>,
    invalid_patterns: Vec<InvalidPattern>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(SafetyPolicy::builtin())
    }
}

impl Classifier {
    #[must_use]
    pub fn new(policy: SafetyPolicy) -> Self {
        let mut patterns = Vec::with_capacity(policy.unsafe_patterns().len());
        let mut invalid_patterns = Vec::new();

        for source in policy.unsafe_patterns() {
            let regex = match Regex::new(source) {
                Ok(regex) => regex,
                Err(e) => {
                    invalid_patterns.push(InvalidPattern {
                        pattern: source.clone(),
                        error: e.to_string(),
                    });
                    // Dropping a veto pattern would widen the allowlist.
                    match Regex::new(&regex::escape(source)) {
                        Ok(literal) => literal,
                        Err(_) => continue,
                    }
                }
            };
            patterns.push(CompiledPattern {
                source: source.clone(),
                regex,
            });
        }

        Self {
            policy,
            patterns,
            invalid_patterns,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Unsafe patterns that failed to compile as regexes.
    #[must_use]
    pub fn invalid_patterns(&self) -> &[InvalidPattern] {
        &self.invalid_patterns
    }

    /// `true` when `command` may be auto-approved.
    #[must_use]
    pub fn classify(&self, command: &str) -> bool {
        self.evaluate(command).is_safe()
    }

    /// Classify `command`, keeping the resolved base command or the reason
    /// for refusal.
    #[must_use]
    pub fn evaluate(&self, command: &str) -> Classification {
        let stripped = strip_env_assignments(command);

        let verdict = match self.policy.segment_policy() {
            SegmentPolicy::First => self.evaluate_segment(first_segment(stripped)),
            SegmentPolicy::All => self.evaluate_all_segments(stripped),
        };

        if let Classification::Unsafe(_) = verdict {
            return verdict;
        }

        if let Some(pattern) = self.matching_pattern(command) {
            return Classification::Unsafe(UnsafeReason::UnsafePattern {
                pattern: pattern.to_string(),
            });
        }

        verdict
    }

    /// Every non-empty segment must pass; the first one names the command.
    fn evaluate_all_segments(&self, command: &str) -> Classification {
        let mut first = None;
        for segment in split_segments(command) {
            let segment = strip_env_assignments(segment);
            if segment.trim().is_empty() {
                continue;
            }
            let verdict = self.evaluate_segment(segment);
            if !verdict.is_safe() {
                return verdict;
            }
            first.get_or_insert(verdict);
        }
        first.unwrap_or(Classification::Unsafe(UnsafeReason::Empty))
    }

    fn evaluate_segment(&self, segment: &str) -> Classification {
        if segment.trim().is_empty() {
            return Classification::Unsafe(UnsafeReason::Empty);
        }

        let Some(words) = split_command_words(segment, &self.policy) else {
            return Classification::Unsafe(UnsafeReason::Tokenize);
        };

        let name = words.base_name();
        if !self.policy.is_safe_command(name) {
            return Classification::Unsafe(UnsafeReason::NotAllowlisted {
                command: name.to_string(),
            });
        }

        if let Some(allowed) = self.policy.safe_subcommands(name) {
            if let Some(subcommand) = words.subcommand() {
                if !allowed.contains(subcommand) {
                    return Classification::Unsafe(UnsafeReason::Subcommand {
                        command: name.to_string(),
                        subcommand: subcommand.to_string(),
                    });
                }
            }
        }

        Classification::Safe {
            base_command: words.program,
        }
    }

    fn matching_pattern(&self, command: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(command))
            .map(|p| p.source.as_str())
    }
}
