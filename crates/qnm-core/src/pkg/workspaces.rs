//! Workspace support for monorepos.
//!
//! Walks upward from the start directory to the nearest directory that
//! declares workspace members, then expands the member patterns
//! (`packages/*`, `apps/**`, `!packages/legacy`) into member directories.
//!
//! Three markers are recognized, checked in this order in each directory:
//! the `workspaces` field of `package.json` (npm, yarn), `pnpm-workspace.yaml`
//! (pnpm) and `lerna.json` (lerna).

use super::error::{codes, GraphDiagnostic};
use super::manifest::{ManifestLoad, ManifestSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const PNPM_WORKSPACE_FILE: &str = "pnpm-workspace.yaml";
pub const LERNA_FILE: &str = "lerna.json";

/// Member patterns lerna assumes when `packages` is omitted.
const LERNA_DEFAULT_PACKAGES: &str = "packages/*";

/// Which file declared the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceDialect {
    PackageJson,
    Pnpm,
    Lerna,
}

/// A workspace member directory.
#[derive(Debug, Clone)]
pub struct WorkspaceMember {
    /// Canonical member directory.
    pub path: PathBuf,
    /// Manifest name, if the member has a readable manifest.
    pub name: Option<String>,
    pub manifest: ManifestLoad,
}

/// The located workspace, if any.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceContext {
    /// Canonical workspace root. `None` means the start directory is the
    /// sole root.
    pub root: Option<PathBuf>,
    pub dialect: Option<WorkspaceDialect>,
    /// Members sorted by path.
    pub members: Vec<WorkspaceMember>,
    pub diagnostics: Vec<GraphDiagnostic>,
}

impl WorkspaceContext {
    #[must_use]
    pub fn is_workspace(&self) -> bool {
        self.root.is_some()
    }

    #[must_use]
    pub fn is_member(&self, path: &Path) -> bool {
        self.members.iter().any(|m| m.path == path)
    }

    /// The member whose manifest name is `name`. Duplicate names resolve
    /// to the lexicographically smallest path.
    #[must_use]
    pub fn member_named(&self, name: &str) -> Option<&WorkspaceMember> {
        self.members.iter().find(|m| m.name.as_deref() == Some(name))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PnpmWorkspaceFile {
    #[serde(default)]
    packages: Vec<String>,
}

/// Find the workspace root by walking up the directory tree.
///
/// Returns the first directory declaring workspace members, with the
/// dialect and the raw member patterns.
#[must_use]
pub fn find_workspace_root(
    start: &Path,
    source: &dyn ManifestSource,
) -> Option<(PathBuf, WorkspaceDialect, Vec<String>)> {
    let mut current = start.to_path_buf();

    loop {
        if let Some((dialect, patterns)) = workspace_marker(&current, source) {
            return Some((current, dialect, patterns));
        }

        if !current.pop() {
            return None;
        }
    }
}

fn workspace_marker(
    dir: &Path,
    source: &dyn ManifestSource,
) -> Option<(WorkspaceDialect, Vec<String>)> {
    if let Some(patterns) = source
        .load(dir)
        .manifest()
        .and_then(|m| m.workspaces.clone())
    {
        return Some((WorkspaceDialect::PackageJson, patterns));
    }

    let pnpm_file = dir.join(PNPM_WORKSPACE_FILE);
    if pnpm_file.is_file() {
        let patterns = qnm_util::fs::read_to_string_lossy(&pnpm_file)
            .ok()
            .and_then(|content| serde_yaml::from_str::<PnpmWorkspaceFile>(&content).ok())
            .unwrap_or_default()
            .packages;
        return Some((WorkspaceDialect::Pnpm, patterns));
    }

    let lerna_file = dir.join(LERNA_FILE);
    if lerna_file.is_file() {
        let patterns = qnm_util::fs::read_to_string_lossy(&lerna_file)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .and_then(|json| {
                json.get("packages").and_then(Value::as_array).map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect::<Vec<_>>()
                })
            })
            .unwrap_or_else(|| vec![LERNA_DEFAULT_PACKAGES.to_string()]);
        return Some((WorkspaceDialect::Lerna, patterns));
    }

    None
}

/// Locate the workspace enclosing `start` (a canonical directory).
#[must_use]
pub fn locate_workspace(start: &Path, source: &dyn ManifestSource) -> WorkspaceContext {
    let Some((root, dialect, patterns)) = find_workspace_root(start, source) else {
        return WorkspaceContext::default();
    };

    let mut diagnostics = Vec::new();
    let members = expand_members(&root, &patterns, &mut diagnostics)
        .into_iter()
        .map(|path| {
            let manifest = source.load(&path);
            let name = manifest.manifest().and_then(|m| m.name.clone());
            WorkspaceMember {
                path,
                name,
                manifest,
            }
        })
        .collect();

    WorkspaceContext {
        root: Some(root),
        dialect: Some(dialect),
        members,
        diagnostics,
    }
}

/// Expand glob patterns into canonical member directories, sorted.
fn expand_members(
    root: &Path,
    patterns: &[String],
    diagnostics: &mut Vec<GraphDiagnostic>,
) -> Vec<PathBuf> {
    let mut included: BTreeSet<PathBuf> = BTreeSet::new();
    let mut excluded: Vec<glob::Pattern> = Vec::new();

    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            match glob::Pattern::new(&root.join(trim_pattern(negated)).to_string_lossy()) {
                Ok(p) => excluded.push(p),
                Err(e) => diagnostics.push(invalid_pattern(root, pattern, &e.to_string())),
            }
            continue;
        }

        // Recursive patterns match every nested directory; only those with a
        // manifest count as members.
        let recursive = pattern.contains("**");
        let full_pattern = root.join(trim_pattern(pattern));
        let entries = match glob::glob(&full_pattern.to_string_lossy()) {
            Ok(entries) => entries,
            Err(e) => {
                diagnostics.push(invalid_pattern(root, pattern, &e.to_string()));
                continue;
            }
        };

        for entry in entries.flatten() {
            let inside_install_dir = entry
                .strip_prefix(root)
                .is_ok_and(|rel| rel.components().any(|c| c.as_os_str() == "node_modules"));
            if !entry.is_dir() || inside_install_dir {
                continue;
            }
            if recursive && !entry.join(super::manifest::MANIFEST_FILE).is_file() {
                continue;
            }
            if excluded.iter().any(|p| p.matches_path(&entry)) {
                continue;
            }
            match qnm_util::canonicalize(&entry) {
                Ok(canonical) => {
                    // A member is never the root itself.
                    if canonical != root {
                        included.insert(canonical);
                    }
                }
                Err(e) => diagnostics.push(GraphDiagnostic::unresolvable(&entry, &e)),
            }
        }
    }

    // Exclusions apply regardless of their position in the list.
    included
        .into_iter()
        .filter(|path| !excluded.iter().any(|p| p.matches_path(path)))
        .collect()
}

fn trim_pattern(pattern: &str) -> &str {
    let pattern = pattern.trim();
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    pattern.trim_end_matches('/')
}

fn invalid_pattern(root: &Path, pattern: &str, message: &str) -> GraphDiagnostic {
    GraphDiagnostic::new(
        codes::QNM_WORKSPACE_INVALID,
        root,
        format!("Invalid workspace pattern '{pattern}': {message}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::manifest::FsManifestSource;
    use std::fs;
    use tempfile::tempdir;

    fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = qnm_util::canonicalize(dir.path()).unwrap();
        (dir, path)
    }

    fn write_member(root: &Path, rel: &str, name: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("package.json"),
            serde_json::json!({ "name": name, "version": "1.0.0" }).to_string(),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_detect_workspaces_array_format() {
        let (_dir, root) = canonical_tempdir();
        fs::write(
            root.join("package.json"),
            r#"{"name": "monorepo", "workspaces": ["packages/*"]}"#,
        )
        .unwrap();
        write_member(&root, "packages/my-lib", "@myorg/my-lib");

        let ctx = locate_workspace(&root, &FsManifestSource::new());
        assert_eq!(ctx.root.as_deref(), Some(root.as_path()));
        assert_eq!(ctx.dialect, Some(WorkspaceDialect::PackageJson));
        assert_eq!(ctx.members.len(), 1);
        assert!(ctx.member_named("@myorg/my-lib").is_some());
    }

    #[test]
    fn test_detect_workspaces_object_format() {
        let (_dir, root) = canonical_tempdir();
        fs::write(
            root.join("package.json"),
            r#"{"name": "monorepo", "workspaces": {"packages": ["packages/*"]}}"#,
        )
        .unwrap();
        write_member(&root, "packages/utils", "utils");

        let ctx = locate_workspace(&root, &FsManifestSource::new());
        assert!(ctx.member_named("utils").is_some());
    }

    #[test]
    fn test_no_workspaces() {
        let (_dir, root) = canonical_tempdir();
        fs::write(root.join("package.json"), r#"{"name": "regular-project"}"#).unwrap();

        let ctx = locate_workspace(&root, &FsManifestSource::new());
        assert!(!ctx.is_workspace());
        assert!(ctx.members.is_empty());
    }

    #[test]
    fn test_find_workspace_root_from_nested_member() {
        let (_dir, root) = canonical_tempdir();
        fs::write(
            root.join("package.json"),
            r#"{"name": "monorepo", "workspaces": ["packages/*"]}"#,
        )
        .unwrap();
        let member = write_member(&root, "packages/nested", "nested");

        let (found, _, patterns) = find_workspace_root(&member, &FsManifestSource::new()).unwrap();
        assert_eq!(found, root);
        assert_eq!(patterns, vec!["packages/*".to_string()]);
    }

    #[test]
    fn test_pnpm_workspace_file() {
        let (_dir, root) = canonical_tempdir();
        fs::write(root.join("package.json"), r#"{"name": "monorepo"}"#).unwrap();
        fs::write(
            root.join(PNPM_WORKSPACE_FILE),
            "packages:\n  - 'apps/*'\n  - 'libs/**'\n  - '!libs/legacy'\n",
        )
        .unwrap();
        write_member(&root, "apps/web", "web");
        write_member(&root, "libs/core", "core");
        write_member(&root, "libs/legacy", "legacy");

        let ctx = locate_workspace(&root, &FsManifestSource::new());
        assert_eq!(ctx.dialect, Some(WorkspaceDialect::Pnpm));
        assert!(ctx.member_named("web").is_some());
        assert!(ctx.member_named("core").is_some());
        assert!(ctx.member_named("legacy").is_none());
    }

    #[test]
    fn test_lerna_default_packages() {
        let (_dir, root) = canonical_tempdir();
        fs::write(root.join(LERNA_FILE), r#"{"version": "independent"}"#).unwrap();
        write_member(&root, "packages/a", "a");

        let ctx = locate_workspace(&root, &FsManifestSource::new());
        assert_eq!(ctx.dialect, Some(WorkspaceDialect::Lerna));
        assert_eq!(ctx.members.len(), 1);
    }

    #[test]
    fn test_member_without_manifest_is_kept() {
        let (_dir, root) = canonical_tempdir();
        fs::write(
            root.join("package.json"),
            r#"{"name": "monorepo", "workspaces": ["packages/*"]}"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("packages/empty")).unwrap();
        fs::write(root.join("packages/README.md"), "not a member").unwrap();

        let ctx = locate_workspace(&root, &FsManifestSource::new());
        assert_eq!(ctx.members.len(), 1);
        assert!(ctx.members[0].name.is_none());
        assert!(ctx.is_member(&root.join("packages/empty")));
    }
}
