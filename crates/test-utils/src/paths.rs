//! Temporary source trees holding image files.
//!
//! A `SourceTree` mirrors the catalog layout: one directory per series
//! path, files named `{filename}.{extension}`.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary root directory, removed on drop.
pub struct SourceTree {
    dir: TempDir,
}

impl SourceTree {
    pub fn new() -> io::Result<Self> {
        Ok(Self { dir: TempDir::new()? })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The root as a string, for `CatalogConfig::root_directory`.
    pub fn root_string(&self) -> String {
        self.root().to_string_lossy().into_owned()
    }

    /// Where a file of a series is stored.
    pub fn path_of(&self, series_path: &str, file: &str) -> PathBuf {
        self.root().join(series_path).join(file)
    }

    /// Write a file, creating the series directory.
    pub fn write(&self, series_path: &str, file: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_of(series_path, file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_series_directory() {
        let tree = SourceTree::new().unwrap();
        let path = tree.write("sst", "a.png", b"abc").unwrap();
        assert_eq!(path, tree.root().join("sst").join("a.png"));
        assert_eq!(std::fs::read(path).unwrap(), b"abc");
    }
}
