//! Package dependency graph construction.
//!
//! Provides read-only scanning of an existing `node_modules/` tree (and the
//! workspace around it) to build a graph of unique installed packages and
//! labeled consumer → dependency edges.
//!
//! Nodes are keyed by canonical path. Declared dependencies are resolved the
//! way Node resolves a bare specifier at runtime: the nearest
//! `node_modules/<name>` walking up from the consumer's real location wins.

use super::error::{self as diag, GraphDiagnostic};
use super::manifest::{
    Declaration, DependencyKind, FsManifestSource, Manifest, ManifestSource, ManifestState,
};
use super::walker::{walk_installations, AccessPath, Candidate, NODE_MODULES};
use super::workspaces::{locate_workspace, WorkspaceContext};
use crate::error::Error;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Schema version for graph-derived JSON output.
pub const QNM_GRAPH_SCHEMA_VERSION: u32 = 1;

/// Options for graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphOptions {
    /// Maximum `node_modules` nesting depth (default 25).
    pub max_depth: usize,
    /// Walk pnpm's `.pnpm` virtual store (default true).
    pub include_pnpm_store: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_depth: 25,
            include_pnpm_store: true,
        }
    }
}

/// Why a package is part of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageRole {
    /// The project the query runs for, or the workspace root.
    Project,
    WorkspaceMember,
    /// Anything found inside an installation directory.
    Dependency,
}

impl PackageRole {
    #[must_use]
    pub fn is_top_level(self) -> bool {
        !matches!(self, Self::Dependency)
    }
}

/// Edge label. Variants are ordered by precedence: when several
/// declarations link the same pair, the greatest wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Dev,
    Peer,
    Direct,
    Resolution,
    Bundled,
    WorkspaceInternal,
}

impl Provenance {
    #[must_use]
    pub fn from_kind(kind: DependencyKind) -> Self {
        match kind {
            DependencyKind::Ordinary | DependencyKind::Optional => Self::Direct,
            DependencyKind::Dev => Self::Dev,
            DependencyKind::Peer => Self::Peer,
            DependencyKind::Bundled => Self::Bundled,
            DependencyKind::Resolution => Self::Resolution,
        }
    }

    /// Phrase for "required by X (as ...)" output.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Dev => "a dev dependency",
            Self::Peer => "a peer dependency",
            Self::Direct => "a dependency",
            Self::Resolution => "a resolution",
            Self::Bundled => "a bundled dependency",
            Self::WorkspaceInternal => "a workspace package",
        }
    }

    /// Whether the edge comes from the ordinary or dev mappings.
    #[must_use]
    pub fn is_declared(self) -> bool {
        matches!(self, Self::Direct | Self::Dev)
    }
}

/// A unique installed package.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledPackage {
    /// Canonical path: the identity of the node.
    pub path: PathBuf,
    pub name: String,
    /// Declared version, verbatim.
    pub version: Option<String>,
    pub role: PackageRole,
    pub manifest_state: ManifestState,
    /// Paths the package was discovered through.
    pub access_paths: Vec<AccessPath>,
    pub depth: usize,
    #[serde(skip)]
    manifest: Option<Arc<Manifest>>,
}

impl InstalledPackage {
    fn from_candidate(candidate: Candidate, role: PackageRole) -> Self {
        let manifest = candidate.manifest.manifest().cloned();
        let name = manifest
            .as_ref()
            .and_then(|m| m.name.clone())
            .or(candidate.install_name)
            .or_else(|| {
                candidate
                    .canonical
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        let version = manifest.as_ref().and_then(|m| m.version.clone());

        Self {
            manifest_state: candidate.manifest.state(),
            path: candidate.canonical,
            access_paths: candidate.access_paths,
            depth: candidate.depth,
            name,
            version,
            role,
            manifest,
        }
    }

    /// The parsed manifest, if it was readable.
    #[must_use]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_deref()
    }

    /// The declared version parsed as semver, when valid.
    #[must_use]
    pub fn semver(&self) -> Option<semver::Version> {
        self.version
            .as_deref()
            .and_then(|v| semver::Version::parse(v.trim().trim_start_matches('v')).ok())
    }

    /// Version for display, `unknown` when absent.
    #[must_use]
    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("unknown")
    }

    /// The first symlink this package was reached through, if any.
    #[must_use]
    pub fn symlink(&self) -> Option<&Path> {
        self.access_paths
            .iter()
            .find(|a| a.via_symlink)
            .map(|a| a.path.as_path())
    }

    /// Ordering used by every listing: name, then semver, then path.
    pub(crate) fn cmp_for_listing(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.semver().cmp(&other.semver()))
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.path.cmp(&other.path))
    }
}

/// A labeled consumer → dependency relation.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyEdge {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Name as declared by the consumer.
    pub name: String,
    /// Requirement from the winning declaration.
    pub req: Option<String>,
    /// Highest-precedence label.
    pub provenance: Provenance,
    /// Every label that linked this pair.
    pub provenances: BTreeSet<Provenance>,
}

impl DependencyEdge {
    fn new(from: &Path, to: &Path, decl: &Declaration, provenance: Provenance) -> Self {
        Self {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            name: decl.name.clone(),
            req: decl.req.clone(),
            provenance,
            provenances: BTreeSet::from([provenance]),
        }
    }

    fn merge(&mut self, other: Self) {
        if other.provenance > self.provenance {
            self.provenance = other.provenance;
            if other.req.is_some() {
                self.req = other.req;
            }
        } else if self.req.is_none() {
            self.req = other.req;
        }
        self.provenances.extend(other.provenances);
    }
}

/// A declared dependency with no installed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedDependency {
    pub consumer: PathBuf,
    pub name: String,
    pub req: Option<String>,
    pub kind: DependencyKind,
}

/// The complete package dependency graph. Immutable once built.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    start: PathBuf,
    workspace: WorkspaceContext,
    nodes: BTreeMap<PathBuf, InstalledPackage>,
    edges: BTreeMap<(PathBuf, PathBuf), DependencyEdge>,
    /// dependency -> consumers
    incoming: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    by_name: BTreeMap<String, BTreeSet<PathBuf>>,
    unresolved: Vec<UnresolvedDependency>,
    diagnostics: Vec<GraphDiagnostic>,
}

enum Link {
    Edge(DependencyEdge),
    Unresolved(UnresolvedDependency),
}

impl DependencyGraph {
    fn empty(start: PathBuf, workspace: WorkspaceContext) -> Self {
        Self {
            start,
            workspace,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            incoming: BTreeMap::new(),
            by_name: BTreeMap::new(),
            unresolved: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Canonical path of the project the graph was built for.
    #[must_use]
    pub fn start(&self) -> &Path {
        &self.start
    }

    #[must_use]
    pub fn start_node(&self) -> Option<&InstalledPackage> {
        self.nodes.get(&self.start)
    }

    #[must_use]
    pub fn workspace(&self) -> &WorkspaceContext {
        &self.workspace
    }

    /// Whether the start directory is a workspace member rather than the
    /// workspace root.
    #[must_use]
    pub fn started_in_member(&self) -> bool {
        self.workspace.is_member(&self.start)
    }

    #[must_use]
    pub fn node(&self, path: &Path) -> Option<&InstalledPackage> {
        self.nodes.get(path)
    }

    /// All nodes, sorted by canonical path.
    pub fn nodes(&self) -> impl Iterator<Item = &InstalledPackage> {
        self.nodes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.values()
    }

    #[must_use]
    pub fn edge(&self, from: &Path, to: &Path) -> Option<&DependencyEdge> {
        self.edges.get(&(from.to_path_buf(), to.to_path_buf()))
    }

    /// Outgoing edges of `from`.
    pub fn edges_from<'a>(
        &'a self,
        from: &'a Path,
    ) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.edges.values().filter(move |e| e.from == from)
    }

    /// Incoming edges of `to`, with their consumer nodes, sorted by consumer path.
    #[must_use]
    pub fn dependents_of(&self, to: &Path) -> Vec<(&InstalledPackage, &DependencyEdge)> {
        let Some(consumers) = self.incoming.get(to) else {
            return Vec::new();
        };
        consumers
            .iter()
            .filter_map(|from| {
                let node = self.nodes.get(from)?;
                let edge = self.edges.get(&(from.clone(), to.to_path_buf()))?;
                Some((node, edge))
            })
            .collect()
    }

    /// Every node whose declared name is `name`.
    #[must_use]
    pub fn packages_named(&self, name: &str) -> Vec<&InstalledPackage> {
        self.by_name
            .get(name)
            .map(|paths| paths.iter().filter_map(|p| self.nodes.get(p)).collect())
            .unwrap_or_default()
    }

    /// Indexed names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    #[must_use]
    pub fn unresolved(&self) -> &[UnresolvedDependency] {
        &self.unresolved
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[GraphDiagnostic] {
        &self.diagnostics
    }

    fn admit(&mut self, candidate: Candidate) {
        let role = if candidate.canonical == self.start
            || self.workspace.root.as_deref() == Some(candidate.canonical.as_path())
        {
            PackageRole::Project
        } else if self.workspace.is_member(&candidate.canonical) {
            PackageRole::WorkspaceMember
        } else {
            PackageRole::Dependency
        };

        let node = InstalledPackage::from_candidate(candidate, role);
        self.by_name
            .entry(node.name.clone())
            .or_default()
            .insert(node.path.clone());
        self.nodes.insert(node.path.clone(), node);
    }

    fn insert_edge(&mut self, edge: DependencyEdge) {
        self.incoming
            .entry(edge.to.clone())
            .or_default()
            .insert(edge.from.clone());
        let key = (edge.from.clone(), edge.to.clone());
        match self.edges.get_mut(&key) {
            Some(existing) => existing.merge(edge),
            None => {
                self.edges.insert(key, edge);
            }
        }
    }

    /// Resolve every declaration of `node` against the admitted nodes.
    fn link_node(&self, node: &InstalledPackage) -> Vec<Link> {
        let Some(manifest) = node.manifest() else {
            return Vec::new();
        };
        let kinds: &[DependencyKind] = if node.role.is_top_level() {
            &DependencyKind::TOP_LEVEL[..]
        } else {
            &DependencyKind::INSTALLED[..]
        };

        let mut links = Vec::new();
        for decl in manifest.declarations(kinds) {
            let provenance = Provenance::from_kind(decl.kind);

            if node.role.is_top_level() {
                if let Some(member) = self.workspace.member_named(&decl.name) {
                    if member.path != node.path {
                        links.push(Link::Edge(DependencyEdge::new(
                            &node.path,
                            &member.path,
                            &decl,
                            Provenance::WorkspaceInternal,
                        )));
                        links.push(Link::Edge(DependencyEdge::new(
                            &node.path,
                            &member.path,
                            &decl,
                            provenance,
                        )));
                        continue;
                    }
                }
            }

            match self.resolve_name(&node.path, &decl.name) {
                Some(target) if target == node.path => {}
                Some(target) => links.push(Link::Edge(DependencyEdge::new(
                    &node.path, &target, &decl, provenance,
                ))),
                None => links.push(Link::Unresolved(UnresolvedDependency {
                    consumer: node.path.clone(),
                    name: decl.name,
                    req: decl.req,
                    kind: decl.kind,
                })),
            }
        }
        links
    }

    /// Nearest-wins lookup of `name` from `consumer`'s real location.
    ///
    /// The first existing `node_modules/<name>` decides: if it is not an
    /// admitted node the name is unresolved.
    fn resolve_name(&self, consumer: &Path, name: &str) -> Option<PathBuf> {
        let boundary = self.resolution_boundary(consumer);

        for dir in consumer.ancestors() {
            if dir.file_name().is_some_and(|n| n == NODE_MODULES) {
                continue;
            }
            let candidate = dir.join(NODE_MODULES).join(name);
            if let Ok(canonical) = qnm_util::canonicalize(&candidate) {
                return self.nodes.contains_key(&canonical).then_some(canonical);
            }
            if boundary == Some(dir) {
                break;
            }
        }
        None
    }

    /// The last directory consulted when resolving from `consumer`.
    fn resolution_boundary(&self, consumer: &Path) -> Option<&Path> {
        if let Some(root) = self.workspace.root.as_deref() {
            if consumer.starts_with(root) {
                return Some(root);
            }
        }
        consumer
            .starts_with(&self.start)
            .then_some(self.start.as_path())
    }
}

/// Build the dependency graph for `start` reading manifests from disk.
///
/// # Errors
/// Fails only when `start` itself cannot be resolved or read.
pub fn build_graph(start: &Path, opts: &GraphOptions) -> Result<DependencyGraph, Error> {
    build_graph_with_source(start, opts, &FsManifestSource::new())
}

/// Build the dependency graph for `start` with a custom manifest supplier.
///
/// # Errors
/// Fails only when `start` itself cannot be resolved or read.
pub fn build_graph_with_source(
    start: &Path,
    opts: &GraphOptions,
    source: &dyn ManifestSource,
) -> Result<DependencyGraph, Error> {
    let canonical_start =
        qnm_util::canonicalize(start).map_err(|err| Error::StartDirUnresolvable {
            path: start.to_path_buf(),
            source: err,
        })?;
    fs::read_dir(&canonical_start).map_err(|err| Error::StartDirUnreadable {
        path: canonical_start.clone(),
        source: err,
    })?;

    let workspace = locate_workspace(&canonical_start, source);
    let project = project_root(&canonical_start, &workspace);

    // Phase A: admit every unique installed package
    let mut seeds = vec![project.clone()];
    if let Some(root) = &workspace.root {
        seeds.push(root.clone());
        seeds.extend(workspace.members.iter().map(|m| m.path.clone()));
    }
    seeds.sort();
    seeds.dedup();

    let walk = walk_installations(&seeds, source, opts);
    let mut diagnostics = walk.diagnostics;
    diagnostics.extend(workspace.diagnostics.iter().cloned());

    let mut graph = DependencyGraph::empty(project, workspace);
    for candidate in walk.candidates {
        graph.admit(candidate);
    }

    // Phase B: resolve declarations per consumer, then merge in one writer
    let links: Vec<Link> = {
        let consumers: Vec<&InstalledPackage> = graph.nodes.values().collect();
        consumers
            .par_iter()
            .flat_map_iter(|node| graph.link_node(node))
            .collect()
    };

    let mut unresolved = Vec::new();
    for link in links {
        match link {
            Link::Edge(edge) => graph.insert_edge(edge),
            Link::Unresolved(u) => unresolved.push(u),
        }
    }
    unresolved.sort_by(|a, b| (&a.consumer, &a.name, a.kind).cmp(&(&b.consumer, &b.name, b.kind)));
    diag::normalize(&mut diagnostics);

    graph.unresolved = unresolved;
    graph.diagnostics = diagnostics;
    Ok(graph)
}

/// The project directory for `start`.
///
/// The workspace root and its members are projects themselves. Any other
/// directory climbs to the nearest ancestor holding a manifest or an
/// installation directory, never past the workspace root.
fn project_root(start: &Path, workspace: &WorkspaceContext) -> PathBuf {
    if workspace.root.as_deref() == Some(start) || workspace.is_member(start) {
        return start.to_path_buf();
    }

    for dir in start.ancestors() {
        if dir.join(super::manifest::MANIFEST_FILE).is_file()
            || dir.join(NODE_MODULES).is_dir()
            || workspace.is_member(dir)
        {
            return dir.to_path_buf();
        }
        if workspace.root.as_deref() == Some(dir) {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_json(dir: &Path, value: &serde_json::Value) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join("package.json"),
            serde_json::to_string_pretty(value).unwrap(),
        )
        .unwrap();
    }

    fn create_package_json(dir: &Path, name: &str, version: &str, deps: &[(&str, &str)]) {
        let deps: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|(n, v)| ((*n).to_string(), json!(v)))
            .collect();
        write_json(
            dir,
            &json!({ "name": name, "version": version, "dependencies": deps }),
        );
    }

    fn build(root: &Path) -> DependencyGraph {
        build_graph(root, &GraphOptions::default()).unwrap()
    }

    fn only<'a>(graph: &'a DependencyGraph, name: &str) -> &'a InstalledPackage {
        let found = graph.packages_named(name);
        assert_eq!(found.len(), 1, "expected exactly one {name}");
        found[0]
    }

    fn dependent_names(
        graph: &DependencyGraph,
        node: &InstalledPackage,
    ) -> Vec<(String, Provenance)> {
        graph
            .dependents_of(&node.path)
            .into_iter()
            .map(|(n, e)| (n.name.clone(), e.provenance))
            .collect()
    }

    #[test]
    fn test_simple_graph() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "my-project", "1.0.0", &[("a", "^1.0.0")]);
        create_package_json(&root.join("node_modules/a"), "a", "1.0.0", &[("b", "^1.0.0")]);
        create_package_json(&root.join("node_modules/b"), "b", "1.0.0", &[]);

        let graph = build(root);
        assert_eq!(graph.len(), 3);
        assert!(graph.diagnostics().is_empty());
        assert_eq!(graph.start_node().unwrap().role, PackageRole::Project);

        let a = only(&graph, "a");
        let b = only(&graph, "b");
        assert_eq!(a.role, PackageRole::Dependency);
        let edge = graph.edge(&a.path, &b.path).unwrap();
        assert_eq!(edge.provenance, Provenance::Direct);
        assert_eq!(edge.req.as_deref(), Some("^1.0.0"));
        assert_eq!(
            dependent_names(&graph, a),
            vec![("my-project".to_string(), Provenance::Direct)]
        );
    }

    #[test]
    fn test_nested_private_copy_scenario() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "a", "1.0.0", &[("b", "1"), ("c", "1")]);
        create_package_json(&root.join("node_modules/b"), "b", "1.0.0", &[("c", "2")]);
        create_package_json(&root.join("node_modules/b/node_modules/c"), "c", "2.0.0", &[]);
        create_package_json(&root.join("node_modules/c"), "c", "1.0.0", &[]);

        let graph = build(root);
        let cs = graph.packages_named("c");
        assert_eq!(cs.len(), 2);

        let v1 = cs.iter().find(|c| c.version.as_deref() == Some("1.0.0")).unwrap();
        let v2 = cs.iter().find(|c| c.version.as_deref() == Some("2.0.0")).unwrap();
        assert_eq!(dependent_names(&graph, v1), vec![("a".to_string(), Provenance::Direct)]);
        assert_eq!(dependent_names(&graph, v2), vec![("b".to_string(), Provenance::Direct)]);
        assert_eq!(v2.depth, 2);
    }

    #[test]
    fn test_nearest_wins_over_ancestor() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "app", "1.0.0", &[("x", "1"), ("d", "2")]);
        create_package_json(&root.join("node_modules/x"), "x", "1.0.0", &[("d", "1")]);
        create_package_json(&root.join("node_modules/x/node_modules/d"), "d", "1.0.0", &[]);
        create_package_json(&root.join("node_modules/d"), "d", "2.0.0", &[]);

        let graph = build(root);
        let x = only(&graph, "x");
        let targets: Vec<_> = graph
            .edges_from(&x.path)
            .map(|e| graph.node(&e.to).unwrap().version_str().to_string())
            .collect();
        assert_eq!(targets, vec!["1.0.0"]);
    }

    #[test]
    fn test_bundled_dependencies_provenance() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_json(
            root,
            &json!({
                "name": "a",
                "version": "1.0.0",
                "dependencies": { "d": "^1.0.0" },
                "bundledDependencies": ["d"]
            }),
        );
        create_package_json(&root.join("node_modules/d"), "d", "1.0.0", &[]);

        let graph = build(root);
        let d = only(&graph, "d");
        assert_eq!(dependent_names(&graph, d), vec![("a".to_string(), Provenance::Bundled)]);

        let edge = graph.edge(graph.start(), &d.path).unwrap();
        assert!(edge.provenances.contains(&Provenance::Direct));
        assert_eq!(edge.req.as_deref(), Some("^1.0.0"));
    }

    #[test]
    fn test_bundle_dependencies_spelling() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_json(
            root,
            &json!({ "name": "a", "bundleDependencies": ["test"] }),
        );
        create_package_json(&root.join("node_modules/test"), "test", "1.0.0", &[]);

        let graph = build(root);
        let test = only(&graph, "test");
        assert_eq!(dependent_names(&graph, test), vec![("a".to_string(), Provenance::Bundled)]);
    }

    #[test]
    fn test_resolutions_provenance() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_json(
            root,
            &json!({
                "name": "a",
                "dependencies": { "test": "^1.0.0" },
                "resolutions": { "**/test": "1.0.0" }
            }),
        );
        create_package_json(&root.join("node_modules/test"), "test", "1.0.0", &[]);

        let graph = build(root);
        let test = only(&graph, "test");
        assert_eq!(dependent_names(&graph, test), vec![("a".to_string(), Provenance::Resolution)]);
    }

    #[test]
    fn test_installed_dev_dependencies_are_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "app", "1.0.0", &[("lib", "1")]);
        write_json(
            &root.join("node_modules/lib"),
            &json!({ "name": "lib", "version": "1.0.0", "devDependencies": { "tool": "1" } }),
        );
        create_package_json(&root.join("node_modules/tool"), "tool", "1.0.0", &[]);

        let graph = build(root);
        let tool = only(&graph, "tool");
        assert!(graph.dependents_of(&tool.path).is_empty());
    }

    #[test]
    fn test_unresolved_dependency_is_recorded() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "app", "1.0.0", &[("a", "1.0.0")]);
        create_package_json(
            &root.join("node_modules/a"),
            "a",
            "1.0.0",
            &[("missing-pkg", "1.0.0")],
        );

        let graph = build(root);
        assert_eq!(graph.unresolved().len(), 1);
        assert_eq!(graph.unresolved()[0].name, "missing-pkg");
        assert_eq!(graph.edges().count(), 1);
    }

    #[test]
    fn test_malformed_manifest_node_has_no_edges() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "app", "1.0.0", &[("a", "1.0.0")]);
        let a = root.join("node_modules/a");
        fs::create_dir_all(&a).unwrap();
        fs::write(a.join("package.json"), "not valid json {{{").unwrap();
        create_package_json(&root.join("node_modules/b"), "b", "1.0.0", &[]);

        let graph = build(root);
        let a = only(&graph, "a");
        assert_eq!(a.manifest_state, ManifestState::Malformed);
        assert!(a.version.is_none());
        assert_eq!(graph.edges_from(&a.path).count(), 0);
        assert_eq!(dependent_names(&graph, a), vec![("app".to_string(), Provenance::Direct)]);
        assert!(graph
            .diagnostics()
            .iter()
            .any(|d| d.code == codes::QNM_MANIFEST_INVALID));
    }

    #[test]
    fn test_start_directory_must_exist() {
        let dir = tempdir().unwrap();
        let err = build_graph(&dir.path().join("missing"), &GraphOptions::default()).unwrap_err();
        assert!(matches!(err, Error::StartDirUnresolvable { .. }));
    }

    #[test]
    fn test_project_root_from_subdirectory() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "app", "1.0.0", &[("a", "1")]);
        create_package_json(&root.join("node_modules/a"), "a", "1.0.0", &[]);
        fs::create_dir_all(root.join("src/deep")).unwrap();

        let graph = build(&root.join("src/deep"));
        assert_eq!(graph.start_node().unwrap().name, "app");
        assert_eq!(graph.packages_named("a").len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_install_is_one_node_with_merged_dependents() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "app", "1.0.0", &[("test", "1"), ("a", "1")]);
        create_package_json(&root.join("node_modules/test"), "test", "1.0.0", &[]);
        create_package_json(&root.join("node_modules/a"), "a", "1.0.0", &[("test", "1")]);
        fs::create_dir_all(root.join("node_modules/a/node_modules")).unwrap();
        std::os::unix::fs::symlink("../../test", root.join("node_modules/a/node_modules/test"))
            .unwrap();

        let graph = build(root);
        let test = only(&graph, "test");
        assert_eq!(test.access_paths.len(), 2);
        assert!(test.symlink().is_some());

        let mut deps = dependent_names(&graph, test);
        deps.sort();
        assert_eq!(
            deps,
            vec![("a".to_string(), Provenance::Direct), ("app".to_string(), Provenance::Direct)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_pnpm_layout_resolves_through_store() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_package_json(root, "app", "1.0.0", &[("a", "1")]);
        let store = root.join("node_modules/.pnpm");
        create_package_json(&store.join("a@1.0.0/node_modules/a"), "a", "1.0.0", &[("b", "2")]);
        create_package_json(&store.join("b@2.0.0/node_modules/b"), "b", "2.0.0", &[]);
        std::os::unix::fs::symlink(
            "../../b@2.0.0/node_modules/b",
            store.join("a@1.0.0/node_modules/b"),
        )
        .unwrap();
        std::os::unix::fs::symlink(".pnpm/a@1.0.0/node_modules/a", root.join("node_modules/a"))
            .unwrap();

        let graph = build(root);
        let a = only(&graph, "a");
        let b = only(&graph, "b");
        assert_eq!(dependent_names(&graph, a), vec![("app".to_string(), Provenance::Direct)]);
        assert_eq!(dependent_names(&graph, b), vec![("a".to_string(), Provenance::Direct)]);
    }

    fn create_monorepo(root: &Path) {
        write_json(
            root,
            &json!({ "name": "monorepo", "private": true, "workspaces": ["packages/*"] }),
        );
        create_package_json(
            &root.join("packages/package-foo"),
            "package-foo",
            "1.0.0",
            &[("package-bar", "^1.0.0"), ("camelcase", "^6.0.0")],
        );
        create_package_json(&root.join("packages/package-bar"), "package-bar", "1.0.0", &[]);
        write_json(
            &root.join("packages/package-without-modules"),
            &json!({ "name": "package-without-modules", "version": "1.0.0" }),
        );
        create_package_json(&root.join("node_modules/camelcase"), "camelcase", "6.3.0", &[]);
    }

    #[test]
    fn test_workspace_internal_edge_without_physical_link() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_monorepo(root);

        let graph = build(root);
        let bar = only(&graph, "package-bar");
        assert_eq!(bar.role, PackageRole::WorkspaceMember);
        assert_eq!(
            dependent_names(&graph, bar),
            vec![("package-foo".to_string(), Provenance::WorkspaceInternal)]
        );

        let camelcase = only(&graph, "camelcase");
        assert_eq!(
            dependent_names(&graph, camelcase),
            vec![("package-foo".to_string(), Provenance::Direct)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_workspace_member_link_collapses_into_member() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_monorepo(root);
        std::os::unix::fs::symlink("../packages/package-bar", root.join("node_modules/package-bar"))
            .unwrap();

        let graph = build(root);
        let bar = only(&graph, "package-bar");
        assert_eq!(bar.role, PackageRole::WorkspaceMember);
        assert!(bar.symlink().is_some());
        assert_eq!(
            dependent_names(&graph, bar),
            vec![("package-foo".to_string(), Provenance::WorkspaceInternal)]
        );
    }

    #[test]
    fn test_empty_workspace_member() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_monorepo(root);

        let member = root.join("packages/package-without-modules");
        let graph = build(&member);
        assert!(graph.started_in_member());
        assert_eq!(graph.edges_from(graph.start()).count(), 0);
        assert!(graph.workspace().is_workspace());
        assert_eq!(graph.packages_named("camelcase").len(), 1);
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        create_monorepo(root);
        create_package_json(&root.join("node_modules/zebra"), "zebra", "1.0.0", &[]);

        let first = build(root);
        let second = build(root);
        let paths = |g: &DependencyGraph| g.nodes().map(|n| n.path.clone()).collect::<Vec<_>>();
        let edges = |g: &DependencyGraph| {
            g.edges()
                .map(|e| (e.from.clone(), e.to.clone(), e.provenance))
                .collect::<Vec<_>>()
        };
        assert_eq!(paths(&first), paths(&second));
        assert_eq!(edges(&first), edges(&second));
    }
}
