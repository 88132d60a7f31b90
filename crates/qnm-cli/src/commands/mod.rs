pub mod find;
pub mod list;
pub mod matches;
pub mod version;

use crate::logging;
use miette::{IntoDiagnostic, Result};
use qnm_core::pkg::{build_graph, DependencyGraph, PackageMatch, QNM_GRAPH_SCHEMA_VERSION};
use qnm_core::Config;
use std::path::Path;
use std::time::Instant;

/// Build the graph for the configured working directory.
///
/// Diagnostics are logged; only an unusable start directory fails.
pub fn load_graph(config: &Config) -> Result<DependencyGraph> {
    let started = Instant::now();
    let graph = build_graph(&config.cwd, &config.graph).into_diagnostic()?;

    tracing::debug!(
        target: "qnm",
        nodes = graph.len(),
        edges = graph.edges().count(),
        unresolved = graph.unresolved().len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "built dependency graph"
    );
    for missing in graph.unresolved() {
        tracing::trace!(
            target: "qnm",
            consumer = %missing.consumer.display(),
            kind = missing.kind.as_str(),
            "unresolved dependency {}",
            missing.name
        );
    }
    logging::report_diagnostics(graph.diagnostics());
    Ok(graph)
}

/// `path` relative to the start directory when it lies under it.
pub fn display_path(graph: &DependencyGraph, path: &Path) -> String {
    match path.strip_prefix(graph.start()) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// One `<version> <path>` line with its "required by" lines below.
pub fn print_match(graph: &DependencyGraph, m: &PackageMatch, prefix: &str, last: bool) {
    let (connector, child_prefix) = if last {
        ("└── ", "    ")
    } else {
        ("├── ", "│   ")
    };

    let mut line = format!(
        "{prefix}{connector}{} {}",
        m.version_str(),
        display_path(graph, &m.path)
    );
    if let Some(link) = &m.symlink {
        line.push_str(&format!(" (symlink: {})", display_path(graph, link)));
    }
    println!("{line}");

    let count = m.dependents.len();
    for (i, dep) in m.dependents.iter().enumerate() {
        let connector = if i + 1 == count { "└── " } else { "├── " };
        println!(
            "{prefix}{child_prefix}{connector}required by {} (as {})",
            dep.name,
            dep.provenance.describe()
        );
    }
}

/// Common envelope fields for JSON output.
pub fn json_envelope(graph: &DependencyGraph) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    map.insert("ok".into(), serde_json::Value::Bool(true));
    map.insert("schema_version".into(), QNM_GRAPH_SCHEMA_VERSION.into());
    map.insert(
        "cwd".into(),
        graph.start().to_string_lossy().into_owned().into(),
    );
    map.insert(
        "diagnostics".into(),
        serde_json::to_value(graph.diagnostics()).unwrap_or_default(),
    );
    map
}
