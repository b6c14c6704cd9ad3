//! Read-only module bundle access
//!
//! The engine never cares how the bundle is packaged; it only needs to read
//! named entries and enumerate a module folder. `Bundle` is that capability,
//! and `DirBundle` binds it to a plain directory tree (the layout produced
//! by unpacking the distribution next to the binary).

use crate::error::{Result, SetupError};
use std::fs;
use std::path::{Path, PathBuf};

/// One entry discovered while walking a bundle folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Path relative to the walked folder, `/`-separated.
    pub relative_path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Read-only access to the module bundle.
pub trait Bundle: Send + Sync {
    /// Read a named entry (`/`-separated path relative to the bundle root).
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Recursively enumerate a folder, depth-first, directories before their
    /// contents. Paths in the result are relative to `folder`.
    fn walk(&self, folder: &str) -> Result<Vec<BundleEntry>>;

    /// Read a named entry as UTF-8 text.
    fn read_to_string(&self, path: &str) -> Result<String> {
        let data = self.read(path)?;
        String::from_utf8(data)
            .map_err(|e| SetupError::config(format!("bundle entry {} is not UTF-8: {}", path, e)))
    }
}

/// License text shipped with the bundle, with a stable placeholder when
/// the entry cannot be read.
pub fn eula_text(bundle: &dyn Bundle) -> String {
    bundle
        .read_to_string("eula.txt")
        .unwrap_or_else(|_| String::from("Error loading EULA."))
}

/// Bundle backed by a directory on disk.
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    /// Open a bundle rooted at `root`. The directory must exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SetupError::config(format!(
                "bundle directory not found: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            full.push(part);
        }
        full
    }

    fn walk_dir(&self, dir: &Path, base: &Path, out: &mut Vec<BundleEntry>) -> Result<()> {
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let relative = path
                .strip_prefix(base)
                .map_err(|e| SetupError::config(format!("bundle walk escaped base: {}", e)))?;
            let relative_path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if path.is_dir() {
                out.push(BundleEntry {
                    relative_path,
                    is_dir: true,
                });
                self.walk_dir(&path, base, out)?;
            } else {
                out.push(BundleEntry {
                    relative_path,
                    is_dir: false,
                });
            }
        }
        Ok(())
    }
}

impl Bundle for DirBundle {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path))?)
    }

    fn walk(&self, folder: &str) -> Result<Vec<BundleEntry>> {
        let base = self.resolve(folder);
        if !base.is_dir() {
            return Err(SetupError::manifest(format!(
                "bundle folder not found: {}",
                folder
            )));
        }
        let mut out = Vec::new();
        self.walk_dir(&base, &base, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, DirBundle) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("mod01/nested")).unwrap();
        fs::write(dir.path().join("eula.txt"), "terms").unwrap();
        fs::write(dir.path().join("mod01/command.json"), "{}").unwrap();
        fs::write(dir.path().join("mod01/nested/data.bin"), [1u8, 2, 3]).unwrap();
        let bundle = DirBundle::open(dir.path()).unwrap();
        (dir, bundle)
    }

    #[test]
    fn test_read_entry() {
        let (_dir, bundle) = fixture();
        assert_eq!(bundle.read_to_string("eula.txt").unwrap(), "terms");
        assert_eq!(bundle.read("mod01/nested/data.bin").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_read_missing_entry_fails() {
        let (_dir, bundle) = fixture();
        assert!(bundle.read("does_not_exist.json").is_err());
    }

    #[test]
    fn test_walk_lists_dirs_before_contents() {
        let (_dir, bundle) = fixture();
        let entries = bundle.walk("mod01").unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["command.json", "nested", "nested/data.bin"]);
        assert!(entries[1].is_dir);
    }

    #[test]
    fn test_open_missing_root_fails() {
        assert!(DirBundle::open("/definitely/not/here").is_err());
    }
}
