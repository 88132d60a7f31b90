#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for qnm.
//!
//! This crate provides pure helper functions with no logging/tracing dependencies.
//! Logging is handled by the CLI crate to keep this library lightweight.

pub mod canonical;
pub mod fs;

pub use canonical::{canonicalize, UnresolvablePathError, MAX_SYMLINK_HOPS};
