//! Symlink-free path resolution.
//!
//! Every installed package is identified by the real location of its
//! directory. [`canonicalize`] walks a path one component at a time,
//! following symlinks with a hop budget so that a link cycle is reported
//! instead of looping.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Maximum number of symlinks followed while resolving a single path.
///
/// Matches the `MAXSYMLINKS` bound used by Linux.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// A candidate directory that has no real location.
#[derive(Error, Debug)]
pub enum UnresolvablePathError {
    /// A segment of the path (or the target of a link) does not exist.
    #[error("path segment {segment} does not exist while resolving {path}")]
    Missing {
        path: PathBuf,
        segment: PathBuf,
        #[source]
        source: io::Error,
    },

    /// More than [`MAX_SYMLINK_HOPS`] links were followed.
    #[error("symlink cycle detected while resolving {path} ({hops} hops)")]
    SymlinkCycle { path: PathBuf, hops: usize },

    /// A link could not be read.
    #[error("failed to read symlink {link}: {source}")]
    ReadLink {
        link: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl UnresolvablePathError {
    /// The path that was being resolved.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Missing { path, .. } | Self::SymlinkCycle { path, .. } => path,
            Self::ReadLink { link, .. } => link,
        }
    }

    /// Whether the failure was a link cycle.
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::SymlinkCycle { .. })
    }
}

/// Resolve `path` to its symlink-free absolute location.
///
/// Relative paths are interpreted against the process working directory.
///
/// # Errors
/// Returns [`UnresolvablePathError::Missing`] when a segment does not exist
/// (a dangling link included) and [`UnresolvablePathError::SymlinkCycle`] when
/// the hop budget is exhausted.
pub fn canonicalize(path: &Path) -> Result<PathBuf, UnresolvablePathError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|source| UnresolvablePathError::Missing {
            path: path.to_path_buf(),
            segment: PathBuf::from("."),
            source,
        })?;
        cwd.join(path)
    };

    let mut pending: VecDeque<OsString> = VecDeque::new();
    let mut resolved = PathBuf::new();
    push_components(&absolute, &mut resolved, &mut pending, true);

    let mut hops = 0usize;
    while let Some(part) = pending.pop_front() {
        if part == ".." {
            resolved.pop();
            continue;
        }

        let candidate = resolved.join(&part);
        let meta = fs::symlink_metadata(&candidate).map_err(|source| {
            UnresolvablePathError::Missing {
                path: absolute.clone(),
                segment: candidate.clone(),
                source,
            }
        })?;

        if !meta.file_type().is_symlink() {
            resolved = candidate;
            continue;
        }

        hops += 1;
        if hops > MAX_SYMLINK_HOPS {
            return Err(UnresolvablePathError::SymlinkCycle {
                path: absolute,
                hops,
            });
        }

        let target = fs::read_link(&candidate).map_err(|source| {
            UnresolvablePathError::ReadLink {
                link: candidate.clone(),
                source,
            }
        })?;

        // The link target replaces the current component; whatever was left
        // of the original path is resolved relative to it.
        let mut spliced: VecDeque<OsString> = VecDeque::new();
        push_components(&target, &mut resolved, &mut spliced, target.is_absolute());
        spliced.extend(pending.drain(..));
        pending = spliced;
    }

    Ok(dunce::simplified(&resolved).to_path_buf())
}

/// Split `path` into normal components queued on `pending`.
///
/// When `reset` is set, `resolved` is replaced by the path's root (and
/// prefix on Windows).
fn push_components(
    path: &Path,
    resolved: &mut PathBuf,
    pending: &mut VecDeque<OsString>,
    reset: bool,
) {
    if reset {
        *resolved = PathBuf::new();
    }
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
            Component::RootDir => resolved.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => pending.push_back(OsString::from("..")),
            Component::Normal(name) => pending.push_back(name.to_os_string()),
        }
    }
}
