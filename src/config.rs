//! Configuration system for permission-filter.
//!
//! Supports layered configuration from multiple sources:
//! 1. Environment variables (highest priority)
//! 2. Project config (.permission-filter.toml, searched up to the repo root)
//! 3. User config (~/.config/permission-filter/config.toml)
//! 4. System config (/etc/permission-filter/config.toml)
//! 5. Compiled defaults (lowest priority)
//!
//! List-valued policy settings are additive across layers. A layer can
//! set `use_defaults = false` to drop the built-in allowlist entirely.
//!
//! The project layer can only narrow: settings that would approve more
//! commands are ignored there (see [`Config::load_with_cwd`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::decision_log::{DEFAULT_LOG_FILE, DEFAULT_MAX_ENTRIES};
use crate::policy::{SafetyPolicy, SegmentPolicy};

/// Environment variable prefix for all config options.
pub const ENV_PREFIX: &str = "PFILTER";

/// Overrides the system config path. An empty value disables the system layer.
pub const ENV_SYSTEM_CONFIG_PATH: &str = "PFILTER_SYSTEM_CONFIG";

/// Directory name under the system and user config roots.
const CONFIG_DIR_NAME: &str = "permission-filter";

/// Default config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Project-level config file name.
const PROJECT_CONFIG_NAME: &str = ".permission-filter.toml";

/// Hook input above this size is never evaluated.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 1024 * 1024;

/// Error loading a config file.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// Allowlist extensions.
    pub policy: PolicyConfig,

    /// Decision log settings.
    pub log: LogConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    /// How compound statements are judged: "first" or "all".
    pub segment_policy: Option<SegmentPolicy>,

    /// Maximum hook input size in bytes.
    pub max_input_bytes: Option<usize>,
}

impl GeneralConfig {
    #[must_use]
    pub fn segment_policy(&self) -> SegmentPolicy {
        self.segment_policy.unwrap_or_default()
    }

    #[must_use]
    pub fn max_input_bytes(&self) -> usize {
        self.max_input_bytes.unwrap_or(DEFAULT_MAX_INPUT_BYTES)
    }
}

/// Allowlist extensions applied on top of (or instead of) the built-ins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Start from the built-in allowlist (default: true).
    pub use_defaults: Option<bool>,

    /// Additional safe command names.
    pub safe_commands: Vec<String>,

    /// Additional unsafe patterns (regex).
    pub unsafe_patterns: Vec<String>,

    /// Additional transparent wrappers.
    pub wrappers: Vec<String>,

    /// Additional trusted MCP tool-name prefixes.
    pub trusted_mcp_prefixes: Vec<String>,

    /// Additional safe subcommands, keyed by command name.
    pub safe_subcommands: BTreeMap<String, Vec<String>>,
}

impl PolicyConfig {
    #[must_use]
    pub fn use_defaults(&self) -> bool {
        self.use_defaults.unwrap_or(true)
    }
}

/// Decision log configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Whether approvals are logged (default: true).
    pub enabled: Option<bool>,

    /// Path to the JSON log file. Supports ~ expansion.
    pub file: Option<String>,

    /// Number of most recent entries to keep.
    pub max_entries: Option<usize>,
}

impl LogConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Resolved log file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        expand_tilde(self.file.as_deref().unwrap_or(DEFAULT_LOG_FILE))
    }

    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES)
    }
}

impl Config {
    /// Load configuration from all sources, merging them in priority order.
    ///
    /// Unreadable or malformed files are skipped with a warning.
    #[must_use]
    pub fn load() -> Self {
        Self::load_with_cwd(env::current_dir().ok().as_deref())
    }

    /// Like [`Config::load`], resolving the project layer from `cwd`.
    #[must_use]
    pub fn load_with_cwd(cwd: Option<&Path>) -> Self {
        let mut config = Self::default();

        let trusted = [Self::system_config_path(), Self::user_config_path()];
        for path in trusted.into_iter().flatten().filter(|path| path.is_file()) {
            if let Some(layer) = Self::load_from_file(&path) {
                config.merge(layer);
            }
        }

        if let Some(path) = cwd.and_then(find_project_config) {
            if let Some(layer) = Self::load_from_file(&path) {
                config.merge(layer.into_project_layer(&path));
            }
        }

        config.apply_env_overrides();
        config
    }

    /// Drop every setting a project config could use to widen the allowlist.
    ///
    /// Project files live in the working tree, where approved commands can
    /// write. They keep unsafe patterns, `use_defaults = false`, the `all`
    /// segment policy, and the general and log settings.
    fn into_project_layer(mut self, path: &Path) -> Self {
        let policy = &mut self.policy;
        let ignored: Vec<&str> = [
            ("policy.safe_commands", !policy.safe_commands.is_empty()),
            ("policy.safe_subcommands", !policy.safe_subcommands.is_empty()),
            ("policy.wrappers", !policy.wrappers.is_empty()),
            ("policy.trusted_mcp_prefixes", !policy.trusted_mcp_prefixes.is_empty()),
            ("policy.use_defaults", policy.use_defaults == Some(true)),
            (
                "general.segment_policy",
                self.general.segment_policy == Some(SegmentPolicy::First),
            ),
        ]
        .into_iter()
        .filter_map(|(key, set)| set.then_some(key))
        .collect();

        policy.safe_commands.clear();
        policy.safe_subcommands.clear();
        policy.wrappers.clear();
        policy.trusted_mcp_prefixes.clear();
        if policy.use_defaults == Some(true) {
            policy.use_defaults = None;
        }
        if self.general.segment_policy == Some(SegmentPolicy::First) {
            self.general.segment_policy = None;
        }

        if !ignored.is_empty() {
            tracing::warn!(
                path = %path.display(),
                "project config can only narrow the allowlist; ignoring {}",
                ignored.join(", ")
            );
        }
        self
    }

    /// Config files that exist, lowest priority first.
    #[must_use]
    pub fn layer_paths(cwd: Option<&Path>) -> Vec<PathBuf> {
        [
            Self::system_config_path(),
            Self::user_config_path(),
            cwd.and_then(find_project_config),
        ]
        .into_iter()
        .flatten()
        .filter(|path| path.is_file())
        .collect()
    }

    /// Load a config file, logging and discarding any error.
    #[must_use]
    pub fn load_from_file(path: &Path) -> Option<Self> {
        match Self::try_load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring config: {e}");
                None
            }
        }
    }

    /// Load a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid config TOML.
    pub fn try_load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn system_config_path() -> Option<PathBuf> {
        match env::var_os(ENV_SYSTEM_CONFIG_PATH) {
            Some(path) if path.is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(
                PathBuf::from("/etc")
                    .join(CONFIG_DIR_NAME)
                    .join(CONFIG_FILE_NAME),
            ),
        }
    }

    /// Path of the user config file (may not exist).
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        Some(
            dirs::config_dir()?
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        )
    }

    /// Merge another config into this one (other takes priority).
    pub fn merge(&mut self, other: Self) {
        if other.general.segment_policy.is_some() {
            self.general.segment_policy = other.general.segment_policy;
        }
        if other.general.max_input_bytes.is_some() {
            self.general.max_input_bytes = other.general.max_input_bytes;
        }

        let policy = other.policy;
        if policy.use_defaults.is_some() {
            self.policy.use_defaults = policy.use_defaults;
        }
        self.policy.safe_commands.extend(policy.safe_commands);
        for (command, subcommands) in policy.safe_subcommands {
            self.policy
                .safe_subcommands
                .entry(command)
                .or_default()
                .extend(subcommands);
        }
        self.policy.unsafe_patterns.extend(policy.unsafe_patterns);
        self.policy.wrappers.extend(policy.wrappers);
        self.policy
            .trusted_mcp_prefixes
            .extend(policy.trusted_mcp_prefixes);

        if other.log.enabled.is_some() {
            self.log.enabled = other.log.enabled;
        }
        if other.log.file.is_some() {
            self.log.file = other.log.file;
        }
        if other.log.max_entries.is_some() {
            self.log.max_entries = other.log.max_entries;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // PFILTER_SEGMENT_POLICY=all
        if let Ok(value) = env::var(format!("{ENV_PREFIX}_SEGMENT_POLICY")) {
            match SegmentPolicy::parse(&value) {
                Some(policy) => self.general.segment_policy = Some(policy),
                None => tracing::warn!("ignoring unknown {ENV_PREFIX}_SEGMENT_POLICY={value}"),
            }
        }

        // PFILTER_SAFE_COMMANDS="make,just"
        if let Ok(commands) = env::var(format!("{ENV_PREFIX}_SAFE_COMMANDS")) {
            self.policy.safe_commands.extend(
                commands
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }

        // PFILTER_LOG_FILE=/tmp/approved.json
        if let Ok(file) = env::var(format!("{ENV_PREFIX}_LOG_FILE")) {
            self.log.file = Some(file);
        }

        // PFILTER_NO_LOG=1
        if env::var_os(format!("{ENV_PREFIX}_NO_LOG")).is_some() {
            self.log.enabled = Some(false);
        }
    }

    /// Check if the bypass flag is set (escape hatch).
    #[must_use]
    pub fn is_bypassed() -> bool {
        env::var_os(format!("{ENV_PREFIX}_BYPASS")).is_some()
    }

    /// Build the classifier policy this config describes.
    #[must_use]
    pub fn safety_policy(&self) -> SafetyPolicy {
        let base = if self.policy.use_defaults() {
            SafetyPolicy::builtin()
        } else {
            SafetyPolicy::empty()
        };

        let mut policy = base
            .with_safe_commands(self.policy.safe_commands.iter().cloned())
            .with_unsafe_patterns(self.policy.unsafe_patterns.iter().cloned())
            .with_wrappers(self.policy.wrappers.iter().cloned())
            .with_trusted_mcp_prefixes(self.policy.trusted_mcp_prefixes.iter().cloned())
            .with_segment_policy(self.general.segment_policy());

        for (command, subcommands) in &self.policy.safe_subcommands {
            policy = policy.with_safe_subcommands(command, subcommands.iter().cloned());
        }

        policy
    }

    /// Generate a sample configuration string with comments.
    #[must_use]
    pub fn generate_sample_config() -> String {
        r#"# permission-filter configuration
#
# Layers (later wins): /etc/permission-filter/config.toml,
# ~/.config/permission-filter/config.toml, .permission-filter.toml
# in the project, then PFILTER_* environment variables.
#
# The project file can only narrow the allowlist: it may add
# unsafe_patterns, set use_defaults = false or segment_policy = "all",
# but its safe_commands, safe_subcommands, wrappers and
# trusted_mcp_prefixes are ignored.

[general]
# How compound commands are judged:
#   "first" - only the command before the first |, ;, && or || (default)
#   "all"   - every command in the statement must be read-only
segment_policy = "first"

# Hook input larger than this is ignored (bytes)
# max_input_bytes = 1048576

#─────────────────────────────────────────────────────────────
# ALLOWLIST
#─────────────────────────────────────────────────────────────

[policy]
# Set to false to start from an empty allowlist instead of the built-in one.
use_defaults = true

# Extra commands to auto-approve.
safe_commands = [
    # "make",
]

# Extra patterns that veto approval anywhere in the command (regex).
unsafe_patterns = [
    # ">\\s*/opt/",
]

# Extra prefixes that are stripped before the command is judged.
wrappers = [
    # "caffeinate",
]

# Extra MCP tool-name prefixes to approve wholesale.
trusted_mcp_prefixes = [
    # "mcp__docs__",
]

# Commands restricted to read-only subcommands. Listing a command here
# also allowlists it.
[policy.safe_subcommands]
# cargo = ["check", "tree", "metadata"]
# docker = ["ps", "images", "inspect"]

#─────────────────────────────────────────────────────────────
# DECISION LOG
#─────────────────────────────────────────────────────────────

[log]
enabled = true
# file = "~/.claude/logs/auto-approved.json"
# max_entries = 1000
"#
        .to_string()
    }
}

/// Find `.permission-filter.toml` from `start` up to the git root.
#[must_use]
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let config_path = current.join(PROJECT_CONFIG_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }

        // Stop at the repository root
        if current.join(".git").exists() {
            return None;
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Expand a leading `~/` to the home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(path), |h| h.join(rest)),
        None => PathBuf::from(path),
    }
}
