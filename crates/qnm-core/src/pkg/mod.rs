//! Installed package inspection.
//!
//! Provides utilities for:
//! - Reading `package.json` manifests
//! - Walking `node_modules` trees (npm, yarn and pnpm layouts)
//! - Locating workspace roots and members
//! - Building a deduplicated dependency graph
//! - Querying the graph by name, pattern, or declaration

pub mod error;
pub mod graph;
pub mod manifest;
pub mod query;
pub mod walker;
pub mod workspaces;

pub use error::{codes as graph_codes, GraphDiagnostic};
pub use graph::{
    build_graph, build_graph_with_source, DependencyEdge, DependencyGraph, GraphOptions,
    InstalledPackage, PackageRole, Provenance, UnresolvedDependency, QNM_GRAPH_SCHEMA_VERSION,
};
pub use manifest::{
    read_manifest, resolution_target, Declaration, DependencyKind, FsManifestSource, Manifest,
    ManifestLoad, ManifestSource, ManifestState, MANIFEST_FILE,
};
pub use query::{
    dependents_of, list_all, match_names, resolve_by_name, suggest_names, Dependent, ListOptions,
    MatchKind, NameMatch, PackageMatch, QueryResult,
};
pub use walker::{walk_installations, AccessPath, Candidate, WalkOutput, NODE_MODULES};
pub use workspaces::{
    find_workspace_root, locate_workspace, WorkspaceContext, WorkspaceDialect, WorkspaceMember,
};
