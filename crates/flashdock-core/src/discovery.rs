//! Manifest discovery
//!
//! Walks the storage tree depth-first looking for the manifest file. The
//! walk lists every directory and regular file it visits, so the log shows
//! what the operator actually copied onto the drive.

use std::fs::{self, FileType};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ManifestError, Result};
use crate::manifest::Manifest;

/// Default manifest file name written by ESP-IDF
pub const MANIFEST_FILE_NAME: &str = "flasher_args.json";

/// A file located by [`find`], read into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    /// Full path of the file
    pub path: PathBuf,
    /// Directory containing the file
    pub dir: PathBuf,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Search `root` depth-first for a regular file called `name`
///
/// Entries are visited in name order. Only the first match is returned;
/// the rest of the tree is still listed. An unreadable root is an error,
/// unreadable subdirectories are logged and skipped.
pub fn find(root: &Path, name: &str) -> io::Result<Option<FoundFile>> {
    log::info!("List file(s) in {}:", root.display());
    let mut found = None;
    walk(root, name, 0, &mut found)?;

    let Some(path) = found else {
        return Ok(None);
    };
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    let bytes = fs::read(&path)?;
    log::info!("Found \"{}\" {} bytes", path.display(), bytes.len());

    Ok(Some(FoundFile { path, dir, bytes }))
}

fn walk(dir: &Path, name: &str, depth: usize, found: &mut Option<PathBuf>) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(e) => log::warn!("{}(unreadable entry: {})", indent, e),
        }
    }
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let entry_name = entry.file_name();
        let display = entry_name.to_string_lossy();
        let Some(file_type) = listed_type(entry.file_type(), &indent, &display) else {
            continue;
        };

        if file_type.is_dir() {
            log::info!("{}{}/", indent, display);
            if let Err(e) = walk(&path, name, depth + 1, found) {
                log::warn!("{}  (unreadable: {})", indent, e);
            }
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(meta) => {
                    let is_match = found.is_none() && entry_name == name;
                    log::info!(
                        "{}{}\t{}{}",
                        indent,
                        display,
                        meta.len(),
                        if is_match { "  <- manifest" } else { "" }
                    );
                    if is_match {
                        *found = Some(path);
                    }
                }
                Err(e) => log::warn!("{}{}\t(stat failed: {})", indent, display, e),
            }
        }
    }
    Ok(())
}

/// Type of a directory entry, or `None` (logged) when it cannot be read
fn listed_type(file_type: io::Result<FileType>, indent: &str, display: &str) -> Option<FileType> {
    match file_type {
        Ok(file_type) => Some(file_type),
        Err(e) => {
            log::warn!("{}{}\t(stat failed: {})", indent, display, e);
            None
        }
    }
}

/// Locate and parse the manifest below `root`
pub fn load_manifest(root: &Path, name: &str) -> Result<Manifest> {
    let found = find(root, name)?.ok_or_else(|| ManifestError::NotFound {
        name: name.to_string(),
        root: root.to_path_buf(),
    })?;
    Manifest::parse(&found.bytes, &found.dir)
}
