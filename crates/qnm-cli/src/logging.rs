//! Logging initialization for the CLI.
//!
//! Library crates never log: graph diagnostics are returned as data and
//! reported here, at the edge. Output goes to stderr so stdout stays
//! reserved for query results.

use qnm_core::pkg::GraphDiagnostic;
use qnm_core::Config;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log target of the binary.
const TARGET: &str = "qnm";

/// 0 = INFO, 1 = DEBUG, 2+ = TRACE
fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match format!("{TARGET}={level}").parse::<Directive>() {
        Ok(directive) => base.add_directive(directive),
        Err(_) => base,
    }
}

/// Initialize the tracing subscriber from the CLI configuration.
///
/// JSON lines (`--json`) follow a stable shape:
/// ```json
/// {"timestamp":"...","level":"WARN","fields":{"code":"QNM_MANIFEST_INVALID","path":"..."},
///  "span":{"cmd":"list","cwd":"/path"}}
/// ```
pub fn init(config: &Config) {
    let filter = build_filter(level_for(config.verbosity));
    let subscriber = tracing_subscriber::registry().with(filter);

    // A second init (only possible in tests) keeps the first subscriber.
    let _ = if config.json_logs {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}

/// Report non-fatal graph diagnostics at warn level.
pub fn report_diagnostics(diagnostics: &[GraphDiagnostic]) {
    for diag in diagnostics {
        tracing::warn!(target: TARGET, code = %diag.code, path = %diag.path, "{}", diag.message);
    }
}
