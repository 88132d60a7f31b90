//! Non-fatal build diagnostics.
//!
//! Anything that goes wrong below the start directory degrades to a
//! diagnostic: the affected node or edge is simply absent from the graph.

use qnm_util::UnresolvablePathError;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Stable diagnostic codes.
pub mod codes {
    pub const QNM_PATH_UNRESOLVABLE: &str = "QNM_PATH_UNRESOLVABLE";
    pub const QNM_SYMLINK_CYCLE: &str = "QNM_SYMLINK_CYCLE";
    pub const QNM_MANIFEST_MISSING: &str = "QNM_MANIFEST_MISSING";
    pub const QNM_MANIFEST_INVALID: &str = "QNM_MANIFEST_INVALID";
    pub const QNM_DIR_UNREADABLE: &str = "QNM_DIR_UNREADABLE";
    pub const QNM_DEPTH_LIMIT_REACHED: &str = "QNM_DEPTH_LIMIT_REACHED";
    pub const QNM_WORKSPACE_INVALID: &str = "QNM_WORKSPACE_INVALID";
}

/// A problem encountered while building the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDiagnostic {
    /// Stable code from [`codes`].
    pub code: String,
    /// Path where the problem occurred.
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

impl GraphDiagnostic {
    #[must_use]
    pub fn new(code: &str, path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: path.as_ref().to_string_lossy().into_owned(),
            message: message.into(),
        }
    }

    /// A candidate directory whose real location could not be determined.
    #[must_use]
    pub fn unresolvable(path: &Path, err: &UnresolvablePathError) -> Self {
        let code = if err.is_cycle() {
            codes::QNM_SYMLINK_CYCLE
        } else {
            codes::QNM_PATH_UNRESOLVABLE
        };
        Self::new(code, path, err.to_string())
    }

    #[must_use]
    pub fn unreadable_dir(path: &Path, err: &io::Error) -> Self {
        Self::new(
            codes::QNM_DIR_UNREADABLE,
            path,
            format!("Failed to read directory: {err}"),
        )
    }

    pub(crate) fn sort_key(&self) -> (&str, &str, &str) {
        (&self.path, &self.code, &self.message)
    }
}

/// Sort and deduplicate diagnostics for deterministic output.
pub(crate) fn normalize(diagnostics: &mut Vec<GraphDiagnostic>) {
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    diagnostics.dedup();
}
