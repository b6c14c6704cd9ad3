//! Module extraction and cleanup
//!
//! Materializes a module's bundled folder into a private work directory
//! under the shared temp namespace before its steps run, and removes it
//! afterward. Modules run strictly sequentially, so at most one work
//! directory is live at a time; stale directories left by a crashed prior
//! run are overwritten rather than treated as errors.

use crate::bundle::Bundle;
use crate::error::{Result, SetupError};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Shared temp namespace for the working root and module work
/// directories.
pub const TEMP_NAMESPACE: &str = "setupforge";

/// Work directory for a module folder identifier.
pub fn module_work_dir(folder_name: &str) -> PathBuf {
    std::env::temp_dir().join(TEMP_NAMESPACE).join(folder_name)
}

/// Copy a module's entire bundled folder, preserving relative structure,
/// into a fresh work directory. Any read or write failure aborts
/// immediately and is fatal for this module's installation attempt.
pub fn extract_module(bundle: &dyn Bundle, folder_name: &str) -> Result<PathBuf> {
    let work_dir = module_work_dir(folder_name);
    fs::create_dir_all(&work_dir).map_err(|e| {
        SetupError::extract(format!(
            "cannot create work directory {}: {}",
            work_dir.display(),
            e
        ))
    })?;

    let entries = bundle
        .walk(folder_name)
        .map_err(|e| SetupError::extract(format!("cannot enumerate module {}: {}", folder_name, e)))?;

    for entry in entries {
        let dest = work_dir.join(entry.relative_path.replace('/', std::path::MAIN_SEPARATOR_STR));
        if entry.is_dir {
            fs::create_dir_all(&dest).map_err(|e| {
                SetupError::extract(format!("cannot create {}: {}", dest.display(), e))
            })?;
        } else {
            let source = format!("{}/{}", folder_name, entry.relative_path);
            let data = bundle
                .read(&source)
                .map_err(|e| SetupError::extract(format!("cannot read {}: {}", source, e)))?;
            fs::write(&dest, data).map_err(|e| {
                SetupError::extract(format!("cannot write {}: {}", dest.display(), e))
            })?;
        }
    }

    debug!("module {} extracted to {}", folder_name, work_dir.display());
    Ok(work_dir)
}

/// Remove a module's work directory. Invoked unconditionally after the
/// module's step sequence finishes or fails; the caller treats failure as
/// observable but not run-ending.
pub fn cleanup_module(folder_name: &str) -> Result<()> {
    let work_dir = module_work_dir(folder_name);
    if work_dir.exists() {
        fs::remove_dir_all(&work_dir)?;
        debug!("removed work directory {}", work_dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::DirBundle;
    use tempfile::TempDir;

    // Folder names are unique per test: work directories live under the
    // shared temp namespace and the tests run in parallel.
    fn bundle_with_module(dir: &TempDir, folder: &str) -> DirBundle {
        fs::create_dir_all(dir.path().join(folder).join("sub")).unwrap();
        fs::write(dir.path().join(folder).join("installer.exe"), b"bin").unwrap();
        fs::write(dir.path().join(folder).join("sub/config.ini"), b"[x]").unwrap();
        DirBundle::open(dir.path()).unwrap()
    }

    #[test]
    fn test_extract_preserves_relative_structure() {
        let dir = TempDir::new().unwrap();
        let folder = "xtr_structure";
        let bundle = bundle_with_module(&dir, folder);

        let work_dir = extract_module(&bundle, folder).unwrap();
        assert!(work_dir.join("installer.exe").is_file());
        assert!(work_dir.join("sub/config.ini").is_file());
        assert_eq!(fs::read(work_dir.join("sub/config.ini")).unwrap(), b"[x]");

        cleanup_module(folder).unwrap();
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_extract_overwrites_stale_directory() {
        let dir = TempDir::new().unwrap();
        let folder = "xtr_stale";
        let bundle = bundle_with_module(&dir, folder);

        // Simulate leftovers from a crashed prior run.
        let stale = module_work_dir(folder);
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("installer.exe"), b"old").unwrap();

        let work_dir = extract_module(&bundle, folder).unwrap();
        assert_eq!(fs::read(work_dir.join("installer.exe")).unwrap(), b"bin");
        cleanup_module(folder).unwrap();
    }

    #[test]
    fn test_extract_missing_folder_fails() {
        let dir = TempDir::new().unwrap();
        let bundle = DirBundle::open(dir.path()).unwrap();
        let err = extract_module(&bundle, "ghost").unwrap_err();
        assert!(matches!(err, SetupError::Extract(_)));
    }

    #[test]
    fn test_cleanup_missing_directory_is_ok() {
        assert!(cleanup_module("never-extracted").is_ok());
    }
}
