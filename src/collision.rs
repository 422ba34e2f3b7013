//! Collision-free destination naming.
//!
//! When a destination file already exists, a numbered suffix is inserted
//! before the extension: `report.pdf` becomes `report (1).pdf`, then
//! `report (2).pdf`, and so on until a free name is found.
//!
//! The check is not atomic with the move that follows it. Another process
//! creating the same name in between can still be overwritten.
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Returns `desired` if nothing exists there, otherwise the first free
/// numbered variant of it.
///
/// ```no_run
/// use dirsorter::collision::resolve;
/// use std::path::Path;
///
/// let path = resolve(Path::new("/downloads/Documents/PDF/report.pdf"));
/// println!("moving to {}", path.display());
/// ```
pub fn resolve(desired: &Path) -> PathBuf {
    if !occupied(desired) {
        return desired.to_path_buf();
    }

    let mut counter: u64 = 1;
    loop {
        let candidate = numbered(desired, counter);
        if !occupied(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Builds `<stem> (<n>)<.ext>` next to `path`.
pub fn numbered(path: &Path, n: u64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();

    let mut name = OsString::from(stem);
    name.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }

    path.with_file_name(name)
}

// Broken symlinks still occupy the name.
fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_free_path_is_returned_unchanged() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let desired = temp_dir.path().join("report.pdf");
        assert_eq!(resolve(&desired), desired);
    }

    #[test]
    fn test_existing_file_gets_first_suffix() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let desired = temp_dir.path().join("report.pdf");
        fs::write(&desired, "a").unwrap();

        assert_eq!(resolve(&desired), temp_dir.path().join("report (1).pdf"));
    }

    #[test]
    fn test_counter_skips_taken_suffixes() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let desired = temp_dir.path().join("report.pdf");
        fs::write(&desired, "a").unwrap();
        fs::write(temp_dir.path().join("report (1).pdf"), "b").unwrap();

        let resolved = resolve(&desired);
        assert_eq!(resolved, temp_dir.path().join("report (2).pdf"));
        assert!(!resolved.exists());
    }

    #[test]
    fn test_gap_in_numbering_is_reused() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let desired = temp_dir.path().join("notes.txt");
        fs::write(&desired, "a").unwrap();
        fs::write(temp_dir.path().join("notes (2).txt"), "b").unwrap();

        assert_eq!(resolve(&desired), temp_dir.path().join("notes (1).txt"));
    }

    #[test]
    fn test_numbered_without_extension() {
        assert_eq!(
            numbered(Path::new("/tmp/README"), 3),
            PathBuf::from("/tmp/README (3)")
        );
    }

    #[test]
    fn test_numbered_only_splits_last_extension() {
        assert_eq!(
            numbered(Path::new("/tmp/backup.tar.gz"), 1),
            PathBuf::from("/tmp/backup.tar (1).gz")
        );
    }

    #[test]
    fn test_directory_occupies_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let desired = temp_dir.path().join("photos");
        fs::create_dir(&desired).unwrap();

        assert_eq!(resolve(&desired), temp_dir.path().join("photos (1)"));
    }
}
