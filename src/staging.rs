//! Image Vault - Staging Area
//!
//! Scoped temporary files under the working directory. A [`StagedFile`] is
//! removed when dropped, so every exit path of the upload pipeline cleans up.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::VaultResult;

/// Working directory for staged uploads and resize output
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` to a fresh temp file ending in `suffix`
    pub fn stage(&self, data: &[u8], suffix: &str) -> VaultResult<StagedFile> {
        let mut file = self.create("staged_", suffix)?;
        file.inner.write_all(data)?;
        file.inner.as_file().sync_all()?;
        Ok(file)
    }

    /// Reserve an empty temp file for a tool to write into
    pub fn reserve(&self, suffix: &str) -> VaultResult<StagedFile> {
        self.create("resized_", suffix)
    }

    fn create(&self, prefix: &str, suffix: &str) -> VaultResult<StagedFile> {
        fs::create_dir_all(&self.root)?;
        let inner = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.root)?;
        Ok(StagedFile { inner })
    }

    #[cfg(test)]
    pub(crate) fn list_files(&self) -> VaultResult<Vec<String>> {
        let mut files = Vec::new();

        if self.root.exists() {
            for entry in fs::read_dir(&self.root)? {
                let entry = entry?;
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }
        }

        Ok(files)
    }
}

/// A temp file that is deleted on drop
#[derive(Debug)]
pub struct StagedFile {
    inner: NamedTempFile,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Read the whole file from disk, including anything a subprocess wrote
    pub fn read_all(&self) -> VaultResult<Vec<u8>> {
        let mut data = Vec::new();
        fs::File::open(self.path())?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Delete now and report failure instead of ignoring it like drop does
    pub fn remove(self) -> VaultResult<()> {
        self.inner.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_workspace_created_on_demand() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("uploads").join("nested"));
        assert!(!ws.root().exists());

        let staged = ws.stage(b"pixels", ".png").unwrap();
        assert!(ws.root().exists());
        assert!(staged.path().to_string_lossy().ends_with(".png"));
        assert_eq!(staged.read_all().unwrap(), b"pixels");
    }

    #[test]
    fn test_dropped_files_are_removed() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        let path = {
            let staged = ws.stage(b"data", ".jpg").unwrap();
            let reserved = ws.reserve(".jpg").unwrap();
            assert_eq!(ws.list_files().unwrap().len(), 2);
            assert!(reserved.read_all().unwrap().is_empty());
            staged.path().to_path_buf()
        };

        assert!(!path.exists());
        assert!(ws.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_explicit_remove() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());

        let staged = ws.stage(b"data", ".jpg").unwrap();
        let path = staged.path().to_path_buf();
        staged.remove().unwrap();

        assert!(!path.exists());
    }
}
