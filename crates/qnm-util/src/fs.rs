use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A directory entry with its name decoded lossily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    /// The entry itself is a symlink (not its target).
    pub is_symlink: bool,
}

/// List the entries of `dir` that are directories or links to directories,
/// sorted by name.
///
/// Entries whose metadata cannot be read are skipped.
///
/// # Errors
/// Returns an error if `dir` itself cannot be read.
pub fn read_dir_sorted(dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        let is_symlink = file_type.is_symlink();
        // Dangling links are kept so the caller can report them.
        if !(file_type.is_dir() || is_symlink) {
            continue;
        }
        if is_symlink && path.exists() && !path.is_dir() {
            continue;
        }
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            is_symlink,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
