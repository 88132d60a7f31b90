//! Queries over a built dependency graph.
//!
//! Every query is a pure read of an immutable [`DependencyGraph`].

use super::graph::{DependencyGraph, InstalledPackage, PackageRole, Provenance};
use super::manifest::ManifestState;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A consumer of an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependent {
    pub path: PathBuf,
    pub name: String,
    pub version: Option<String>,
    pub role: PackageRole,
    pub provenance: Provenance,
    /// Requirement the consumer declared.
    pub req: Option<String>,
}

/// An installed package and who depends on it.
#[derive(Debug, Clone, Serialize)]
pub struct PackageMatch {
    pub name: String,
    pub version: Option<String>,
    pub path: PathBuf,
    pub role: PackageRole,
    pub manifest_state: ManifestState,
    /// Symlink the package was reached through, if any.
    pub symlink: Option<PathBuf>,
    pub dependents: Vec<Dependent>,
}

impl PackageMatch {
    fn new(graph: &DependencyGraph, node: &InstalledPackage) -> Self {
        Self {
            name: node.name.clone(),
            version: node.version.clone(),
            path: node.path.clone(),
            role: node.role,
            manifest_state: node.manifest_state,
            symlink: node.symlink().map(Path::to_path_buf),
            dependents: dependents_of(graph, &node.path),
        }
    }

    #[must_use]
    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("unknown")
    }
}

/// Outcome of a lookup by name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResult {
    Found { matches: Vec<PackageMatch> },
    NotFound { name: String, suggestions: Vec<String> },
}

impl QueryResult {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// Options for [`list_all`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Keep only packages the start project declares as ordinary or dev
    /// dependencies.
    pub declared_only: bool,
}

/// How a name matched a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Substring,
    Subsequence,
}

/// A package name matched by [`match_names`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameMatch {
    pub name: String,
    pub kind: MatchKind,
    /// Byte offset of the first matched character in the lowercased name.
    pub position: usize,
    /// Installed versions, sorted.
    pub versions: Vec<String>,
}

/// Distinct consumers with an edge to `path`, sorted by consumer path.
#[must_use]
pub fn dependents_of(graph: &DependencyGraph, path: &Path) -> Vec<Dependent> {
    graph
        .dependents_of(path)
        .into_iter()
        .map(|(node, edge)| Dependent {
            path: node.path.clone(),
            name: node.name.clone(),
            version: node.version.clone(),
            role: node.role,
            provenance: edge.provenance,
            req: edge.req.clone(),
        })
        .collect()
}

/// Nodes visible to queries: everything but the start project.
fn queryable<'a>(graph: &'a DependencyGraph, name: &str) -> Vec<&'a InstalledPackage> {
    graph
        .packages_named(name)
        .into_iter()
        .filter(|n| n.path != graph.start())
        .collect()
}

/// Find every installed package named `name`.
///
/// Matches are ordered by semver version, then path. Unparseable versions
/// sort first.
#[must_use]
pub fn resolve_by_name(graph: &DependencyGraph, name: &str) -> QueryResult {
    let mut found = queryable(graph, name);
    if found.is_empty() {
        return QueryResult::NotFound {
            name: name.to_string(),
            suggestions: suggest_names(graph, name),
        };
    }

    found.sort_by(|a, b| {
        a.semver()
            .cmp(&b.semver())
            .then_with(|| a.version.cmp(&b.version))
            .then_with(|| a.path.cmp(&b.path))
    });
    QueryResult::Found {
        matches: found.into_iter().map(|n| PackageMatch::new(graph, n)).collect(),
    }
}

/// Names to offer when `name` is not installed.
///
/// Scoped names whose unscoped part equals `name` come first, then names
/// equal to `name` ignoring ASCII case.
#[must_use]
pub fn suggest_names(graph: &DependencyGraph, name: &str) -> Vec<String> {
    let candidates: Vec<&str> = graph
        .names()
        .filter(|n| *n != name && !queryable(graph, n).is_empty())
        .collect();

    let scoped = candidates.iter().filter(|n| {
        n.starts_with('@') && n.split_once('/').is_some_and(|(_, bare)| bare == name)
    });
    let folded = candidates.iter().filter(|n| n.eq_ignore_ascii_case(name));

    let mut suggestions: Vec<String> = Vec::new();
    for n in scoped.chain(folded) {
        if !suggestions.iter().any(|s| s == n) {
            suggestions.push((*n).to_string());
        }
    }
    suggestions
}

/// List installed packages sorted by name, version, then path.
///
/// Started inside a workspace member, only packages reachable through the
/// member's own `node_modules` are listed, plus whatever the member
/// declares. A pnpm member's packages live in the root store and are kept
/// through their symlinked access paths.
#[must_use]
pub fn list_all(graph: &DependencyGraph, opts: &ListOptions) -> Vec<PackageMatch> {
    let start = graph.start();
    let scoped_to_member = graph.started_in_member();

    let declared = |n: &InstalledPackage| {
        graph
            .edge(start, &n.path)
            .is_some_and(|e| e.provenances.iter().any(|p| p.is_declared()))
    };
    let in_scope = |n: &InstalledPackage| {
        !scoped_to_member
            || n.path.starts_with(start)
            || n.access_paths.iter().any(|a| a.path.starts_with(start))
            || declared(n)
    };

    let mut nodes: Vec<&InstalledPackage> = graph
        .nodes()
        .filter(|n| n.path != start)
        .filter(|n| if opts.declared_only { declared(n) } else { in_scope(n) })
        .collect();

    nodes.sort_by(|a, b| a.cmp_for_listing(b));
    nodes.into_iter().map(|n| PackageMatch::new(graph, n)).collect()
}

/// Installed package names matching `pattern`, case-insensitively.
///
/// Substring hits rank before subsequence hits; within a kind, earlier
/// positions rank first, then names alphabetically.
#[must_use]
pub fn match_names(graph: &DependencyGraph, pattern: &str) -> Vec<NameMatch> {
    let needle = pattern.to_lowercase();

    let mut matches: Vec<NameMatch> = graph
        .names()
        .filter_map(|name| {
            let haystack = name.to_lowercase();
            let (kind, position) = match haystack.find(&needle) {
                Some(pos) => (MatchKind::Substring, pos),
                None => (MatchKind::Subsequence, subsequence_start(&haystack, &needle)?),
            };

            let nodes = queryable(graph, name);
            if nodes.is_empty() {
                return None;
            }
            let mut sorted = nodes;
            sorted.sort_by(|a, b| a.cmp_for_listing(b));
            let mut versions: Vec<String> =
                sorted.iter().map(|n| n.version_str().to_string()).collect();
            versions.dedup();

            Some(NameMatch {
                name: name.to_string(),
                kind,
                position,
                versions,
            })
        })
        .collect();

    matches.sort_by(|a, b| (a.kind, a.position, &a.name).cmp(&(b.kind, b.position, &b.name)));
    matches
}

/// Offset where `needle` starts matching `haystack` as a subsequence.
fn subsequence_start(haystack: &str, needle: &str) -> Option<usize> {
    let mut wanted = needle.chars().peekable();
    let mut start = None;
    for (idx, ch) in haystack.char_indices() {
        match wanted.peek() {
            Some(&c) if c == ch => {
                start.get_or_insert(idx);
                wanted.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    if wanted.peek().is_none() {
        Some(start.unwrap_or(0))
    } else {
        None
    }
}
