#![forbid(unsafe_code)]
//! permission-filter library.
//!
//! Decides whether a coding agent's tool call can be approved without
//! asking the user. Shell commands go through a conservative allowlist
//! classifier; everything it cannot vouch for is left to the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Configuration                             │
//! │  (env vars → project config → user config → system → defaults)  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │  SafetyPolicy
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Classifier                              │
//! │  env strip → first segment → word split → wrapper → allowlist   │
//! │  → subcommand map → unsafe patterns                             │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Hook protocol + decision log                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use permission_filter::{Classifier, SafetyPolicy};
//!
//! let classifier = Classifier::new(SafetyPolicy::builtin());
//! assert!(classifier.classify("git status"));
//! assert!(!classifier.classify("git push origin main"));
//! ```

pub mod classifier;
pub mod cli;
pub mod config;
pub mod decision_log;
pub mod hook;
pub mod normalize;
pub mod policy;

// Re-export commonly used types
pub use classifier::{Classification, Classifier, InvalidPattern, UnsafeReason};
pub use config::Config;
pub use decision_log::{DecisionEntry, DecisionLog, DecisionLogError};
pub use hook::{HookInput, HookOutput, HookReadError, HookResult, process_hook_input};
pub use policy::{SafetyPolicy, SegmentPolicy};
