//! Filesystem primitives for the store
//!
//! Crash-safe single-file writes and the explicit candidate-collection walk
//! that feeds record parsing. Collection is separated from parsing so a bad
//! file surfaces as one entry in an aggregate, not an aborted walk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Write content atomically: temp file in the target directory, fsync,
/// rename into place. A crash mid-write never leaves a half-written file
/// visible at the final path.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;

    fs::create_dir_all(parent)?;

    // Temp file must live in the same directory for rename to be atomic
    let temp_path = path.with_file_name(format!(
        ".{}.tmp.{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));

    {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);

        #[cfg(unix)]
        opts.mode(0o644);

        let mut file = opts.open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    // Sync the directory entry as well
    #[cfg(unix)]
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Whether a file name belongs to a data record.
///
/// Dotfiles, non-Markdown files, and generated index/readme files are not
/// records.
fn is_record_name(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    let lower = name.to_lowercase();
    if lower == "index.md" || lower == "readme.md" {
        return false;
    }
    lower.ends_with(".md")
}

/// Collect every record candidate under the features root, sorted by path.
///
/// A missing root is an empty collection, not an error.
pub fn collect_record_files(features_root: &Path) -> io::Result<Vec<PathBuf>> {
    if !features_root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(features_root) {
        let entry = entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_record_name(&name) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("record.md");

        atomic_write(&path, "hello").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_atomic_write_overwrites_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("record.md");

        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("features/backlog/FEAT-0001-alpha.md");

        atomic_write(&path, "nested").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "nested");
    }

    #[test]
    fn test_no_temp_file_left_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("record.md");

        atomic_write(&path, "content").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].as_ref().unwrap().file_name(), "record.md");
    }

    #[test]
    fn test_collect_skips_non_records() {
        let dir = tempdir().unwrap();
        let backlog = dir.path().join("backlog");
        fs::create_dir_all(&backlog).unwrap();

        fs::write(backlog.join("FEAT-0002-beta.md"), "b").unwrap();
        fs::write(backlog.join("FEAT-0001-alpha.md"), "a").unwrap();
        fs::write(backlog.join("INDEX.md"), "generated").unwrap();
        fs::write(backlog.join("README.md"), "docs").unwrap();
        fs::write(backlog.join(".hidden.md"), "dot").unwrap();
        fs::write(backlog.join("notes.txt"), "txt").unwrap();

        let files = collect_record_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["FEAT-0001-alpha.md", "FEAT-0002-beta.md"]);
    }

    #[test]
    fn test_collect_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let files = collect_record_files(&dir.path().join("absent")).unwrap();
        assert!(files.is_empty());
    }
}
