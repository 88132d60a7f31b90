//! `qnm list` command implementation.

use super::{json_envelope, load_graph, print_match};
use miette::Result;
use qnm_core::pkg::{list_all, ListOptions, PackageMatch};
use qnm_core::Config;

/// Run the list command.
pub fn run(config: &Config, declared_only: bool, json: bool) -> Result<()> {
    let graph = load_graph(config)?;
    let packages = list_all(&graph, &ListOptions { declared_only });

    if json {
        let mut out = json_envelope(&graph);
        out.insert("declared_only".into(), declared_only.into());
        out.insert(
            "packages".into(),
            serde_json::to_value(&packages).unwrap_or_default(),
        );
        println!("{}", serde_json::Value::Object(out));
        return Ok(());
    }

    if packages.is_empty() {
        if declared_only {
            println!("No declared dependencies are installed.");
        } else {
            println!("No packages installed.");
        }
        return Ok(());
    }

    for group in group_by_name(&packages) {
        println!("{}", group[0].name);
        let count = group.len();
        for (i, m) in group.iter().enumerate() {
            print_match(&graph, m, "", i + 1 == count);
        }
    }
    Ok(())
}

/// Split an already name-sorted list into runs of equal names.
fn group_by_name(packages: &[PackageMatch]) -> Vec<&[PackageMatch]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=packages.len() {
        if i == packages.len() || packages[i].name != packages[start].name {
            groups.push(&packages[start..i]);
            start = i;
        }
    }
    groups
}
