//! # Hookweave Core
//!
//! Weaving engine that rewrites Go sources before compilation so that matched
//! functions call entry and exit hooks, including:
//! - Rule model and rule-set loading
//! - Arena-based Go syntax tree with a tree-sitter front end
//! - Trampoline-jump synthesis and call-context generation
//! - Optimization of trampoline-jumps
//! - Source materialization and compile-command rewriting
//!
//! The engine never runs the target program. It only reshapes its syntax tree
//! and hands the rewritten files back to the build.

#![warn(clippy::all)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod ast;
pub mod materialize;
pub mod parser;
pub mod pipeline;
pub mod rules;
pub mod weave;

// Re-export commonly used types
pub use ast::{Arena, ExprId, GoFile, StmtId};
pub use parser::{create_parser, Parser};
pub use pipeline::{CompileCommand, PackageWeaver, WeaveOutcome};
pub use rules::{Rule, RuleSet};
pub use weave::{FileWeaver, WeaveStats};

/// Hookweave version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for hookweave components
pub fn init_tracing() {
    init_tracing_with("hookweave_core=info");
}

/// Initialize tracing with an explicit default directive, e.g. `hookweave_core=debug`
pub fn init_tracing_with(directive: &str) {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match directive.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Weaving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Directory receiving rewritten files and generated package files
    pub work_dir: PathBuf,
    /// Matched rule set file
    pub rule_file: PathBuf,
    /// Emit debug-level decisions
    pub verbose: bool,
    /// Keep a copy of every rewritten file under `work_dir/debug`
    pub keep_debug_files: bool,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            work_dir: "./.hookweave".into(),
            rule_file: "matched_rules.json".into(),
            verbose: false,
            keep_debug_files: false,
        }
    }
}

impl WeaveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn with_work_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_rule_file<P: Into<PathBuf>>(mut self, file: P) -> Self {
        self.rule_file = file.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn keep_debug_files(mut self, keep: bool) -> Self {
        self.keep_debug_files = keep;
        self
    }
}

/// Error types for weaving operations
#[derive(thiserror::Error, Debug)]
pub enum WeaveError {
    /// Malformed rule set or rule
    #[error("Rule set error: {0}")]
    RuleSet(String),

    /// No candidate file defines the named hooks
    #[error("no hook {on_enter}/{on_exit} found for {function} from {candidates:?}")]
    HookNotFound {
        on_enter: String,
        on_exit: String,
        function: String,
        candidates: Vec<PathBuf>,
    },

    /// Hook signature does not line up with the target function
    #[error("hook func {hook} signature can not match with target function: expected {expected} parameters, found {found}")]
    SignatureMismatch {
        hook: String,
        expected: usize,
        found: usize,
    },

    /// Go source failed to parse
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// Earlier phase produced a tree the later phase cannot accept
    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    /// Build pipeline failure, with the captured log attached
    #[error("Build pipeline error: {message}\n{log}")]
    BuildPipeline { message: String, log: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeaveError {
    pub fn invariant(message: impl Into<String>) -> Self {
        WeaveError::Invariant(message.into())
    }

    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        WeaveError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn pipeline(message: impl Into<String>, log: impl Into<String>) -> Self {
        WeaveError::BuildPipeline {
            message: message.into(),
            log: log.into(),
        }
    }
}

/// Result type for weaving operations
pub type Result<T> = std::result::Result<T, WeaveError>;

/// Fail with an invariant violation unless `cond` holds
pub(crate) fn ensure(cond: bool, message: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(WeaveError::invariant(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = WeaveConfig::new()
            .with_work_dir("/tmp/out")
            .with_rule_file("rules.json")
            .verbose(true);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.rule_file, PathBuf::from("rules.json"));
        assert!(config.verbose);
        assert!(!config.keep_debug_files);
    }

    #[test]
    fn test_config_partial_json() {
        let config: WeaveConfig = serde_json::from_str(r#"{"verbose": true}"#).unwrap();
        assert!(config.verbose);
        assert_eq!(config.rule_file, PathBuf::from("matched_rules.json"));
    }

    #[test]
    fn test_hook_not_found_message() {
        let err = WeaveError::HookNotFound {
            on_enter: "onEnter".into(),
            on_exit: String::new(),
            function: "Do".into(),
            candidates: vec![PathBuf::from("/rules/a.go")],
        };
        assert_eq!(
            err.to_string(),
            "no hook onEnter/ found for Do from [\"/rules/a.go\"]"
        );
    }
}
