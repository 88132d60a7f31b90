#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]

pub mod config;
pub mod error;
pub mod pkg;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use pkg::{build_graph, list_all, match_names, resolve_by_name, DependencyGraph, QueryResult};
pub use version::VERSION;
