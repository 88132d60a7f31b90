//! `package.json` reading.
//!
//! A manifest is parsed once into a [`Manifest`] record holding every
//! dependency-kind mapping the graph builder consults. Reading never fails
//! on absent optional fields; a missing or unparsable file is reported as a
//! [`ManifestLoad`] marker instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// File name of a package manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// Field names for bundled dependencies, in priority order.
///
/// The first field present wins.
pub const BUNDLED_FIELDS: [&str; 2] = ["bundledDependencies", "bundleDependencies"];

/// Field paths for version pins, in priority order: yarn, npm, pnpm.
///
/// Every field present contributes.
pub const RESOLUTION_FIELDS: [&[&str]; 3] =
    [&["resolutions"], &["overrides"], &["pnpm", "overrides"]];

/// Which manifest mapping declared a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Ordinary,
    Optional,
    Dev,
    Peer,
    Bundled,
    Resolution,
}

impl DependencyKind {
    /// Kinds consulted for the project and workspace members.
    pub const TOP_LEVEL: [Self; 6] = [
        Self::Ordinary,
        Self::Optional,
        Self::Dev,
        Self::Peer,
        Self::Bundled,
        Self::Resolution,
    ];

    /// Kinds consulted for installed dependencies. Their dev dependencies
    /// and pins are never installed on their behalf.
    pub const INSTALLED: [Self; 4] = [Self::Ordinary, Self::Optional, Self::Peer, Self::Bundled];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Optional => "optional",
            Self::Dev => "dev",
            Self::Peer => "peer",
            Self::Bundled => "bundled",
            Self::Resolution => "resolution",
        }
    }
}

/// A single declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    /// Requirement string (`^1.2.0`, `workspace:*`), when declared as a string.
    pub req: Option<String>,
    pub kind: DependencyKind,
}

/// Parsed contents of a `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: BTreeMap<String, Option<String>>,
    pub optional_dependencies: BTreeMap<String, Option<String>>,
    pub dev_dependencies: BTreeMap<String, Option<String>>,
    pub peer_dependencies: BTreeMap<String, Option<String>>,
    pub bundled_dependencies: BTreeSet<String>,
    /// Pinned package name -> pinned requirement.
    pub resolutions: BTreeMap<String, Option<String>>,
    /// Workspace member patterns, if this manifest declares a workspace.
    pub workspaces: Option<Vec<String>>,
}

impl Manifest {
    /// Build a manifest from an already-parsed JSON document.
    ///
    /// Fields of the wrong type are treated as absent.
    #[must_use]
    pub fn from_json(json: &Value) -> Self {
        let dependencies = string_map(json, "dependencies");
        let bundled_dependencies = read_bundled(json, &dependencies);

        Self {
            name: json.get("name").and_then(Value::as_str).map(String::from),
            version: json.get("version").and_then(Value::as_str).map(String::from),
            optional_dependencies: string_map(json, "optionalDependencies"),
            dev_dependencies: string_map(json, "devDependencies"),
            peer_dependencies: string_map(json, "peerDependencies"),
            resolutions: read_resolutions(json),
            workspaces: read_workspace_patterns(json),
            dependencies,
            bundled_dependencies,
        }
    }

    /// Parse manifest text.
    ///
    /// # Errors
    /// Returns the JSON error when the text is not a JSON object.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let json: Value = serde_json::from_str(content)?;
        if !json.is_object() {
            return Err(serde::de::Error::custom("package.json must be a JSON object"));
        }
        Ok(Self::from_json(&json))
    }

    /// All declarations of the given kinds, sorted by (name, kind).
    #[must_use]
    pub fn declarations(&self, kinds: &[DependencyKind]) -> Vec<Declaration> {
        let mut out = Vec::new();
        for &kind in kinds {
            match kind {
                DependencyKind::Ordinary => push_map(&mut out, &self.dependencies, kind),
                DependencyKind::Optional => push_map(&mut out, &self.optional_dependencies, kind),
                DependencyKind::Dev => push_map(&mut out, &self.dev_dependencies, kind),
                DependencyKind::Peer => push_map(&mut out, &self.peer_dependencies, kind),
                DependencyKind::Resolution => push_map(&mut out, &self.resolutions, kind),
                DependencyKind::Bundled => {
                    for name in &self.bundled_dependencies {
                        let req = self.dependencies.get(name).cloned().flatten();
                        out.push(Declaration {
                            name: name.clone(),
                            req,
                            kind,
                        });
                    }
                }
            }
        }
        out.sort_by(|a, b| (&a.name, a.kind).cmp(&(&b.name, b.kind)));
        out
    }

    /// Whether this manifest declares `name` in its ordinary or dev mappings.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }
}

fn push_map(
    out: &mut Vec<Declaration>,
    map: &BTreeMap<String, Option<String>>,
    kind: DependencyKind,
) {
    out.extend(map.iter().map(|(name, req)| Declaration {
        name: name.clone(),
        req: req.clone(),
        kind,
    }));
}

fn string_map(json: &Value, section: &str) -> BTreeMap<String, Option<String>> {
    json.get(section)
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .map(|(name, req)| (name.clone(), req.as_str().map(String::from)))
                .collect()
        })
        .unwrap_or_default()
}

/// The first bundled field present wins. `true` bundles every ordinary
/// dependency.
fn read_bundled(json: &Value, dependencies: &BTreeMap<String, Option<String>>) -> BTreeSet<String> {
    for field in BUNDLED_FIELDS {
        match json.get(field) {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect();
            }
            Some(Value::Bool(true)) => return dependencies.keys().cloned().collect(),
            Some(_) => return BTreeSet::new(),
            None => {}
        }
    }
    BTreeSet::new()
}

fn read_resolutions(json: &Value) -> BTreeMap<String, Option<String>> {
    let mut pins = BTreeMap::new();
    for field_path in RESOLUTION_FIELDS {
        let mut section = Some(json);
        for key in field_path {
            section = section.and_then(|v| v.get(*key));
        }
        let Some(obj) = section.and_then(Value::as_object) else {
            continue;
        };
        for (key, value) in obj {
            let Some(name) = resolution_target(key) else {
                continue;
            };
            let req = match value {
                Value::String(s) => Some(s.clone()),
                // npm nested override: { "foo": { ".": "1.0.0", "bar": "2" } }
                Value::Object(nested) => nested.get(".").and_then(Value::as_str).map(String::from),
                _ => None,
            };
            pins.entry(name).or_insert(req);
        }
    }
    pins
}

/// The package name a resolution key pins.
///
/// Handles yarn path patterns (`**/foo`, `a/foo`, `@s/a/@s/b`), pnpm parent
/// selectors (`a>foo`) and version-qualified keys (`foo@1`, `@s/foo@^2`).
#[must_use]
pub fn resolution_target(key: &str) -> Option<String> {
    let key = key.rsplit('>').next().unwrap_or(key);
    let mut names: Vec<String> = Vec::new();
    let mut segments = key.trim().split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "**" || segment == "*" {
            continue;
        }
        if segment.starts_with('@') && !segment[1..].contains('@') {
            if let Some(rest) = segments.next() {
                names.push(format!("{segment}/{rest}"));
                continue;
            }
        }
        names.push(segment.to_string());
    }

    let last = names.pop()?;
    let name = strip_version_suffix(&last);
    (!name.is_empty()).then(|| name.to_string())
}

fn strip_version_suffix(name: &str) -> &str {
    let search_from = usize::from(name.starts_with('@'));
    match name[search_from..].find('@') {
        Some(pos) => &name[..search_from + pos],
        None => name,
    }
}

fn read_workspace_patterns(json: &Value) -> Option<Vec<String>> {
    let patterns: Vec<String> = match json.get("workspaces")? {
        Value::Array(arr) => arr.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        // { "packages": ["packages/*"] } format (yarn-style)
        Value::Object(obj) => obj
            .get("packages")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default(),
        _ => return None,
    };
    Some(patterns)
}

/// State of a package's manifest, as recorded on its graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestState {
    Ok,
    Missing,
    Malformed,
}

/// Outcome of reading a package directory's manifest.
#[derive(Debug, Clone)]
pub enum ManifestLoad {
    Parsed(Arc<Manifest>),
    Missing,
    Malformed { message: String },
}

impl ManifestLoad {
    #[must_use]
    pub fn manifest(&self) -> Option<&Arc<Manifest>> {
        match self {
            Self::Parsed(manifest) => Some(manifest),
            _ => None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ManifestState {
        match self {
            Self::Parsed(_) => ManifestState::Ok,
            Self::Missing => ManifestState::Missing,
            Self::Malformed { .. } => ManifestState::Malformed,
        }
    }
}

/// Read the manifest of `dir` from disk, uncached.
#[must_use]
pub fn read_manifest(dir: &Path) -> ManifestLoad {
    let path = dir.join(MANIFEST_FILE);
    let content = match qnm_util::fs::read_to_string_lossy(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ManifestLoad::Missing,
        Err(e) => {
            return ManifestLoad::Malformed {
                message: format!("Failed to read: {e}"),
            }
        }
    };
    match Manifest::parse(&content) {
        Ok(manifest) => ManifestLoad::Parsed(Arc::new(manifest)),
        Err(e) => ManifestLoad::Malformed {
            message: format!("Invalid JSON: {e}"),
        },
    }
}

/// Supplier of parsed manifests, one per package directory.
///
/// Implementations must be thread-safe: the walker calls `load` from
/// several worker threads at once.
pub trait ManifestSource: Send + Sync + std::fmt::Debug {
    /// Load the manifest of the package rooted at `dir`.
    fn load(&self, dir: &Path) -> ManifestLoad;
}

/// Reads manifests from disk, memoizing each directory's result.
#[derive(Debug, Default)]
pub struct FsManifestSource {
    cache: RwLock<HashMap<PathBuf, ManifestLoad>>,
}

impl FsManifestSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ManifestSource for FsManifestSource {
    fn load(&self, dir: &Path) -> ManifestLoad {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dir)
        {
            return cached.clone();
        }

        let loaded = read_manifest(dir);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(dir.to_path_buf())
            .or_insert(loaded)
            .clone()
    }
}
