//! `qnm match <pattern>` command implementation.

use super::{json_envelope, load_graph};
use miette::Result;
use qnm_core::pkg::match_names;
use qnm_core::Config;

/// Run the match command.
pub fn run(config: &Config, pattern: &str, json: bool) -> Result<()> {
    let graph = load_graph(config)?;
    let found = match_names(&graph, pattern);

    if json {
        let mut out = json_envelope(&graph);
        out.insert("pattern".into(), pattern.into());
        out.insert(
            "matches".into(),
            serde_json::to_value(&found).unwrap_or_default(),
        );
        println!("{}", serde_json::Value::Object(out));
        return Ok(());
    }

    if found.is_empty() {
        println!("No installed package matches \"{pattern}\".");
        return Ok(());
    }
    let width = found.iter().map(|m| m.name.len()).max().unwrap_or(0);
    for m in &found {
        println!("{:<width$}  {}", m.name, m.versions.join(", "));
    }
    Ok(())
}
