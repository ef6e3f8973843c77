//! Shared test utilities for linksmith.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tempfile::TempDir;

use crate::config::Settings;
use crate::diagnostics::{DiagnosticSink, Level};
use crate::handler::HandlerRegistry;
use crate::rules::RuleSet;
use crate::schema::validate;

/// Creates a temporary workspace directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The path to the workspace subdirectory
///
/// Temp directories may live under hidden paths such as `/tmp/.tmpXXXXX`.
/// The non-hidden "workspace" subdirectory keeps dotfile handling out of
/// tests that are not about it.
pub fn create_test_workspace() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let workspace = temp_dir.path().join("workspace");
    fs::create_dir(&workspace).expect("Failed to create workspace subdirectory");
    (temp_dir, workspace)
}

/// Validates `raw` against `handlers` with default settings.
///
/// Panics with the violations if the configuration is invalid.
pub fn rule_set(handlers: &HandlerRegistry, raw: Value) -> RuleSet {
    validate(&raw, handlers, &Settings::default())
        .unwrap_or_else(|err| panic!("test config should be valid: {err}"))
}

/// Sink that keeps every message for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries()
            .iter()
            .filter(|(entry_level, _)| *entry_level == level)
            .count()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(_, message)| message.contains(needle))
    }
}

impl DiagnosticSink for RecordingSink {
    fn log(&self, level: Level, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}
