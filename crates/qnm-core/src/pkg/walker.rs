//! Installation tree enumeration.
//!
//! Walks `node_modules` directories below a set of seed packages and admits
//! every installed package exactly once, keyed by its canonical path. A
//! package reached a second time (through a symlink, a workspace link, or
//! the pnpm virtual store) only gains an extra access path.

use super::error::{codes, GraphDiagnostic};
use super::graph::GraphOptions;
use super::manifest::{ManifestLoad, ManifestSource, ManifestState};
use qnm_util::fs::{read_dir_sorted, DirEntryInfo};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Name of an installation directory.
pub const NODE_MODULES: &str = "node_modules";

/// pnpm's virtual store inside `node_modules`.
pub const PNPM_STORE: &str = ".pnpm";

/// One way a package directory was reached.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessPath {
    pub path: PathBuf,
    /// The directory entry was a symlink.
    pub via_symlink: bool,
}

/// A package directory admitted by the walker.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Canonical path: the identity of the package.
    pub canonical: PathBuf,
    /// Every path the package was discovered through, sorted.
    pub access_paths: Vec<AccessPath>,
    /// Name implied by the install location (`@scope/name`), if any.
    pub install_name: Option<String>,
    pub manifest: ManifestLoad,
    /// Nesting depth: 0 for seeds, 1 for their direct `node_modules`, ...
    pub depth: usize,
}

/// Result of a walk.
#[derive(Debug, Default)]
pub struct WalkOutput {
    /// Admitted packages sorted by canonical path.
    pub candidates: Vec<Candidate>,
    pub diagnostics: Vec<GraphDiagnostic>,
}

/// Whether `name` has the shape of an npm package name.
///
/// Accepts `name` and `@scope/name` made of URL-safe characters.
#[must_use]
pub fn is_valid_package_name(name: &str) -> bool {
    fn valid_part(part: &str) -> bool {
        !part.is_empty()
            && !part.starts_with('.')
            && !part.starts_with('_')
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    }

    if name.is_empty() || name.len() > 214 {
        return false;
    }
    match name.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, pkg)) => valid_part(scope) && valid_part(pkg),
            None => false,
        },
        None => valid_part(name),
    }
}

/// Walk the installation directories of every seed.
///
/// `seeds` are canonical package directories (the project and workspace
/// members). They are admitted at depth 0 before walking, so a
/// `node_modules` link pointing back at a seed collapses into it.
pub fn walk_installations(
    seeds: &[PathBuf],
    source: &dyn ManifestSource,
    opts: &GraphOptions,
) -> WalkOutput {
    let walker = Walker {
        source,
        opts,
        table: Mutex::new(HashMap::new()),
        diagnostics: Mutex::new(Vec::new()),
    };

    for seed in seeds {
        walker.admit(seed, None, None, 0);
    }

    seeds
        .par_iter()
        .for_each(|seed| walker.walk_install_dir(&seed.join(NODE_MODULES), 1));

    let mut candidates: Vec<Candidate> = walker
        .table
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_values()
        .map(|mut c| {
            c.access_paths.sort();
            c.access_paths.dedup();
            c
        })
        .collect();
    candidates.sort_by(|a, b| a.canonical.cmp(&b.canonical));

    let mut diagnostics = walker
        .diagnostics
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);

    for candidate in candidates.iter().filter(|c| c.depth >= opts.max_depth) {
        let nested = candidate.canonical.join(NODE_MODULES);
        if nested.is_dir() {
            diagnostics.push(GraphDiagnostic::new(
                codes::QNM_DEPTH_LIMIT_REACHED,
                &nested,
                format!("Depth limit {} reached", opts.max_depth),
            ));
        }
    }

    WalkOutput {
        candidates,
        diagnostics,
    }
}

/// What [`Walker::admit`] did with a package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// First sighting.
    New,
    /// Already admitted, now reached at a smaller depth.
    Shallower,
    /// Already admitted at this depth or less.
    Known,
}

impl Admission {
    fn needs_walk(self) -> bool {
        !matches!(self, Self::Known)
    }
}

struct Walker<'a> {
    source: &'a dyn ManifestSource,
    opts: &'a GraphOptions,
    /// Admission table. The only shared mutable state of the walk.
    table: Mutex<HashMap<PathBuf, Candidate>>,
    diagnostics: Mutex<Vec<GraphDiagnostic>>,
}

impl Walker<'_> {
    fn report(&self, diagnostic: GraphDiagnostic) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }

    /// Enumerate one installation directory.
    fn walk_install_dir(&self, node_modules: &Path, depth: usize) {
        let entries = match read_dir_sorted(node_modules) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                self.report(GraphDiagnostic::unreadable_dir(node_modules, &e));
                return;
            }
        };

        let mut packages: Vec<(String, DirEntryInfo)> = Vec::new();
        let mut store_dirs: Vec<PathBuf> = Vec::new();

        for entry in entries {
            if entry.name == PNPM_STORE {
                if self.opts.include_pnpm_store {
                    store_dirs.extend(self.pnpm_store_dirs(&entry.path));
                }
                continue;
            }
            if entry.name.starts_with('.') {
                continue;
            }
            if entry.name.starts_with('@') {
                match read_dir_sorted(&entry.path) {
                    Ok(scoped) => {
                        for child in scoped {
                            packages.push((format!("{}/{}", entry.name, child.name), child));
                        }
                    }
                    Err(e) => self.report(GraphDiagnostic::unreadable_dir(&entry.path, &e)),
                }
                continue;
            }
            packages.push((entry.name.clone(), entry));
        }

        packages
            .par_iter()
            .for_each(|(name, entry)| self.visit(name, entry, depth));

        store_dirs
            .par_iter()
            .for_each(|dir| self.walk_install_dir(dir, depth));
    }

    /// `.pnpm/<id>/node_modules` directories of the virtual store.
    fn pnpm_store_dirs(&self, store: &Path) -> Vec<PathBuf> {
        match read_dir_sorted(store) {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| !e.name.starts_with('.'))
                .map(|e| e.path.join(NODE_MODULES))
                .collect(),
            Err(e) => {
                self.report(GraphDiagnostic::unreadable_dir(store, &e));
                Vec::new()
            }
        }
    }

    fn visit(&self, install_name: &str, entry: &DirEntryInfo, depth: usize) {
        let canonical = match qnm_util::canonicalize(&entry.path) {
            Ok(p) => p,
            Err(e) => {
                self.report(GraphDiagnostic::unresolvable(&entry.path, &e));
                return;
            }
        };

        let access = AccessPath {
            path: entry.path.clone(),
            via_symlink: entry.is_symlink,
        };

        let admission = self.admit(&canonical, Some(access), Some(install_name), depth);
        if admission.needs_walk() && depth < self.opts.max_depth {
            self.walk_install_dir(&canonical.join(NODE_MODULES), depth + 1);
        }
    }

    /// Admit `canonical` unless it is already known.
    ///
    /// A package keeps the smallest depth it was reached at. When a later
    /// path is shallower the package's own installation directory has to be
    /// walked again from the new depth.
    fn admit(
        &self,
        canonical: &Path,
        access: Option<AccessPath>,
        install_name: Option<&str>,
        depth: usize,
    ) -> Admission {
        if let Some(admission) = self.record_alias(canonical, access.as_ref(), depth) {
            return admission;
        }

        // Read outside the lock; a concurrent admission of the same path
        // is resolved below.
        let manifest = self.source.load(canonical);

        let is_seed = access.is_none();
        if !is_seed
            && manifest.state() == ManifestState::Missing
            && !install_name.is_some_and(is_valid_package_name)
        {
            return Admission::Known;
        }

        let admission = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            match table.entry(canonical.to_path_buf()) {
                Entry::Occupied(mut existing) => {
                    let existing = existing.get_mut();
                    existing.access_paths.extend(access);
                    lower_depth(existing, depth)
                }
                Entry::Vacant(slot) => {
                    slot.insert(Candidate {
                        canonical: canonical.to_path_buf(),
                        access_paths: access.into_iter().collect(),
                        install_name: install_name.map(String::from),
                        manifest: manifest.clone(),
                        depth,
                    });
                    Admission::New
                }
            }
        };

        if admission == Admission::New {
            match &manifest {
                ManifestLoad::Missing if !is_seed => self.report(GraphDiagnostic::new(
                    codes::QNM_MANIFEST_MISSING,
                    canonical,
                    "No package.json found",
                )),
                ManifestLoad::Malformed { message } => self.report(GraphDiagnostic::new(
                    codes::QNM_MANIFEST_INVALID,
                    canonical,
                    message.clone(),
                )),
                _ => {}
            }
        }

        admission
    }

    /// Append an access path to an admitted package. Returns `None` when the
    /// package is not yet admitted.
    fn record_alias(
        &self,
        canonical: &Path,
        access: Option<&AccessPath>,
        depth: usize,
    ) -> Option<Admission> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = table.get_mut(canonical)?;
        existing.access_paths.extend(access.cloned());
        Some(lower_depth(existing, depth))
    }
}

fn lower_depth(candidate: &mut Candidate, depth: usize) -> Admission {
    if depth < candidate.depth {
        candidate.depth = depth;
        Admission::Shallower
    } else {
        Admission::Known
    }
}
