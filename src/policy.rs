//! Allowlist data consulted by the command safety classifier.
//!
//! A [`SafetyPolicy`] is immutable once built. The built-in tables below are
//! the defaults; user configuration can extend them (see
//! [`crate::config::PolicyConfig`]) or start from an empty policy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Commands that are safe to auto-approve when invoked without side effects.
pub const DEFAULT_SAFE_COMMANDS: &[&str] = &[
    // File reading and listing
    "ls", "cat", "head", "tail", "less", "more", "view",
    // Directory navigation
    "cd", "pwd",
    // System information
    "whoami", "date", "which", "type", "whereis", "uname", "hostname", "id", "groups",
    // Process information
    "ps", "top", "htop", "pgrep", "jobs",
    // Disk and memory
    "df", "du", "free", "mount",
    // Network info
    "ifconfig", "ip", "netstat", "ss", "ping", "traceroute",
    // Search and text processing
    "grep", "rg", "find", "locate", "wc", "sort", "uniq", "awk", "sed", "cut", "tr", "paste",
    "join",
    // Environment
    "echo", "env", "printenv", "set", "export",
    // File info
    "file", "stat", "readlink", "basename", "dirname",
    // Version control (subcommands checked below)
    "git", "hg", "svn",
    // Package managers (subcommands checked below)
    "npm", "pip", "apt", "yum", "brew",
    // Other utilities
    "curl", "wget", "man", "help", "history", "diff", "cmp", "md5sum", "sha256sum", "tree",
    "watch", "time", "tee",
];

/// Read-only subcommands for tools that also have mutating modes.
pub const DEFAULT_SAFE_SUBCOMMANDS: &[(&str, &[&str])] = &[
    (
        "git",
        &[
            "status", "log", "diff", "show", "branch", "remote", "tag", "describe", "rev-parse",
            "ls-files", "ls-tree",
        ],
    ),
    (
        "npm",
        &["list", "ls", "view", "info", "search", "outdated", "audit"],
    ),
    ("pip", &["list", "show", "search", "freeze"]),
    ("apt", &["list", "search", "show", "policy"]),
    ("brew", &["list", "info", "search", "outdated"]),
];

/// Patterns that veto approval wherever they appear in the command.
pub const DEFAULT_UNSAFE_PATTERNS: &[&str] = &[
    // Writes into system directories
    r">\s*/etc/",
    r">\s*/usr/",
    r">\s*/bin/",
    r">\s*/sbin/",
    // Appends to shell startup files, bare or behind a path (`~/`, `$HOME/`)
    r">>\s*(?:\S*/)?\.bashrc",
    r">>\s*(?:\S*/)?\.zshrc",
    r">>\s*(?:\S*/)?\.profile",
    // Any mention of this filter's own config files, so an approved
    // command cannot rewrite the allowlist for the next one
    r"\.permission-filter\.toml",
    r"permission-filter/config\.toml",
];

/// Prefixes that do not change what the wrapped command does.
pub const DEFAULT_WRAPPERS: &[&str] = &["sudo", "time", "nohup", "nice"];

/// MCP tool-name prefixes that are approved without inspection.
pub const DEFAULT_TRUSTED_MCP_PREFIXES: &[&str] =
    &["mcp__zen__", "mcp__playwright__", "mcp__ref__"];

/// How compound statements (`a | b`, `a; b`, `a && b`) are judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentPolicy {
    /// Only the first segment is classified. Later segments are never looked at.
    #[default]
    First,
    /// Every segment must classify as safe.
    All,
}

impl SegmentPolicy {
    /// Parse a policy name as used in config files and env vars.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first" => Some(Self::First),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::All => "all",
        }
    }
}

/// Immutable allowlist configuration handed to [`crate::Classifier::new`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SafetyPolicy {
    safe_commands: BTreeSet<String>,
    safe_subcommands: BTreeMap<String, BTreeSet<String>>,
    unsafe_patterns: Vec<String>,
    wrappers: BTreeSet<String>,
    trusted_mcp_prefixes: Vec<String>,
    segment_policy: SegmentPolicy,
}

impl SafetyPolicy {
    /// The built-in allowlist.
    #[must_use]
    pub fn builtin() -> Self {
        let mut policy = Self::empty()
            .with_safe_commands(DEFAULT_SAFE_COMMANDS.iter().copied())
            .with_unsafe_patterns(DEFAULT_UNSAFE_PATTERNS.iter().copied())
            .with_wrappers(DEFAULT_WRAPPERS.iter().copied())
            .with_trusted_mcp_prefixes(DEFAULT_TRUSTED_MCP_PREFIXES.iter().copied());
        for (command, subcommands) in DEFAULT_SAFE_SUBCOMMANDS {
            policy = policy.with_safe_subcommands(command, subcommands.iter().copied());
        }
        policy
    }

    /// A policy that approves nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_safe_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safe_commands
            .extend(commands.into_iter().map(Into::into));
        self
    }

    /// Restrict `command` to the given subcommands.
    ///
    /// The command itself is added to the safe set as well; an entry here
    /// is only meaningful for an allowlisted command.
    #[must_use]
    pub fn with_safe_subcommands<I, S>(mut self, command: &str, subcommands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safe_commands.insert(command.to_string());
        self.safe_subcommands
            .entry(command.to_string())
            .or_default()
            .extend(subcommands.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_unsafe_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            let pattern = pattern.into();
            if !self.unsafe_patterns.contains(&pattern) {
                self.unsafe_patterns.push(pattern);
            }
        }
        self
    }

    #[must_use]
    pub fn with_wrappers<I, S>(mut self, wrappers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wrappers.extend(wrappers.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_trusted_mcp_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for prefix in prefixes {
            let prefix = prefix.into();
            // An empty prefix would trust every tool.
            if !prefix.is_empty() && !self.trusted_mcp_prefixes.contains(&prefix) {
                self.trusted_mcp_prefixes.push(prefix);
            }
        }
        self
    }

    #[must_use]
    pub fn with_segment_policy(mut self, segment_policy: SegmentPolicy) -> Self {
        self.segment_policy = segment_policy;
        self
    }

    #[must_use]
    pub fn is_safe_command(&self, name: &str) -> bool {
        self.safe_commands.contains(name)
    }

    /// Safe subcommands for `name`, if it is restricted to a subcommand set.
    #[must_use]
    pub fn safe_subcommands(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.safe_subcommands.get(name)
    }

    #[must_use]
    pub fn is_wrapper(&self, word: &str) -> bool {
        self.wrappers.contains(word)
    }

    #[must_use]
    pub fn unsafe_patterns(&self) -> &[String] {
        &self.unsafe_patterns
    }

    /// The first trusted MCP prefix that `tool_name` starts with.
    #[must_use]
    pub fn trusted_mcp_prefix(&self, tool_name: &str) -> Option<&str> {
        self.trusted_mcp_prefixes
            .iter()
            .map(String::as_str)
            .find(|prefix| tool_name.starts_with(prefix))
    }

    #[must_use]
    pub const fn segment_policy(&self) -> SegmentPolicy {
        self.segment_policy
    }

    pub fn safe_commands(&self) -> impl Iterator<Item = &str> {
        self.safe_commands.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contains_read_only_tools() {
        let policy = SafetyPolicy::builtin();
        for name in ["ls", "cat", "grep", "git", "tee", "time"] {
            assert!(policy.is_safe_command(name), "{name} should be allowlisted");
        }
        assert!(!policy.is_safe_command("rm"));
        assert!(!policy.is_safe_command("sudo"));
    }

    #[test]
    fn test_builtin_subcommand_map() {
        let policy = SafetyPolicy::builtin();
        let git = policy.safe_subcommands("git").expect("git entry");
        assert!(git.contains("status"));
        assert!(git.contains("ls-tree"));
        assert!(!git.contains("push"));
        assert!(policy.safe_subcommands("hg").is_none());
        assert!(policy.safe_subcommands("yum").is_none());
    }

    #[test]
    fn test_empty_policy_allows_nothing() {
        let policy = SafetyPolicy::empty();
        assert!(!policy.is_safe_command("ls"));
        assert!(policy.unsafe_patterns().is_empty());
        assert!(policy.trusted_mcp_prefix("mcp__zen__chat").is_none());
    }

    #[test]
    fn test_subcommand_entry_allowlists_command() {
        let policy = SafetyPolicy::empty().with_safe_subcommands("cargo", ["check", "tree"]);
        assert!(policy.is_safe_command("cargo"));
        assert_eq!(policy.safe_subcommands("cargo").map(BTreeSet::len), Some(2));
    }

    #[test]
    fn test_subcommand_entries_extend() {
        let policy = SafetyPolicy::builtin().with_safe_subcommands("git", ["blame"]);
        let git = policy.safe_subcommands("git").expect("git entry");
        assert!(git.contains("blame"));
        assert!(git.contains("status"));
    }

    #[test]
    fn test_unsafe_patterns_deduplicated() {
        let policy = SafetyPolicy::builtin().with_unsafe_patterns([r">\s*/etc/"]);
        assert_eq!(policy.unsafe_patterns().len(), DEFAULT_UNSAFE_PATTERNS.len());
    }

    #[test]
    fn test_trusted_mcp_prefix_lookup() {
        let policy = SafetyPolicy::builtin();
        assert_eq!(
            policy.trusted_mcp_prefix("mcp__playwright__browser_click"),
            Some("mcp__playwright__")
        );
        assert!(policy.trusted_mcp_prefix("mcp__github__create_pr").is_none());
    }

    #[test]
    fn test_empty_mcp_prefix_ignored() {
        let policy = SafetyPolicy::empty().with_trusted_mcp_prefixes([""]);
        assert!(policy.trusted_mcp_prefix("anything").is_none());
    }

    #[test]
    fn test_segment_policy_parse() {
        assert_eq!(SegmentPolicy::parse("ALL"), Some(SegmentPolicy::All));
        assert_eq!(SegmentPolicy::parse(" first "), Some(SegmentPolicy::First));
        assert_eq!(SegmentPolicy::parse("every"), None);
        assert_eq!(SegmentPolicy::default(), SegmentPolicy::First);
    }
}
