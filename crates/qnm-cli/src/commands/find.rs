//! `qnm <name>` / `qnm find <name>` command implementation.
//!
//! Shows every installed version of a package and who requires it.

use super::{json_envelope, load_graph, print_match};
use miette::{Diagnostic, Result};
use qnm_core::pkg::{resolve_by_name, QueryResult};
use qnm_core::Config;
use thiserror::Error;

/// Error code for JSON output when nothing matches.
pub const QNM_MODULE_NOT_FOUND: &str = "QNM_MODULE_NOT_FOUND";

#[derive(Debug, Error, Diagnostic)]
#[error("Could not find any module by the name: \"{name}\"")]
#[diagnostic(code(qnm::module_not_found))]
pub struct ModuleNotFound {
    pub name: String,
    #[help]
    pub help: Option<String>,
}

impl ModuleNotFound {
    pub fn new(name: &str, suggestions: &[String]) -> Self {
        let help = (!suggestions.is_empty()).then(|| {
            let quoted: Vec<String> = suggestions.iter().map(|s| format!("\"{s}\"")).collect();
            format!("Did you mean {}?", quoted.join(" or "))
        });
        Self {
            name: name.to_string(),
            help,
        }
    }
}

/// Run the find command.
pub fn run(config: &Config, name: &str, json: bool) -> Result<()> {
    let graph = load_graph(config)?;

    match resolve_by_name(&graph, name) {
        QueryResult::Found { matches } => {
            if json {
                let mut out = json_envelope(&graph);
                out.insert("name".into(), name.into());
                out.insert(
                    "matches".into(),
                    serde_json::to_value(&matches).unwrap_or_default(),
                );
                println!("{}", serde_json::Value::Object(out));
            } else {
                println!("{name}");
                let count = matches.len();
                for (i, m) in matches.iter().enumerate() {
                    print_match(&graph, m, "", i + 1 == count);
                }
            }
            Ok(())
        }
        QueryResult::NotFound { name, suggestions } => {
            let err = ModuleNotFound::new(&name, &suggestions);
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": {
                            "code": QNM_MODULE_NOT_FOUND,
                            "message": err.to_string(),
                            "name": name,
                            "suggestions": suggestions
                        }
                    })
                );
                std::process::exit(1);
            }
            Err(err.into())
        }
    }
}
