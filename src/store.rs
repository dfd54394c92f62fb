use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

/// Flat directory of finished downloads.
///
/// Every name resolves directly against the one directory; there is no
/// per-user namespace. The sentinel file is invisible to all operations.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
    sentinel: String,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, sentinel: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            sentinel: sentinel.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    pub fn list(&self) -> Result<Vec<StoredFile>, StoreError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == self.sentinel {
                continue;
            }
            files.push(StoredFile {
                name,
                size: entry.metadata()?.len(),
                path: entry.path().to_path_buf(),
            });
        }
        Ok(files)
    }

    /// Path of an existing stored file.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !self.is_plain_name(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StoreError::NotFound(name.to_string()))
        }
    }

    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Removes every stored file, returning how many were deleted.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let files = self.list()?;
        for file in &files {
            std::fs::remove_file(&file.path)?;
        }
        Ok(files.len())
    }

    fn is_plain_name(&self, name: &str) -> bool {
        let mut components = Path::new(name).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) && !name.contains(['/', '\\'])
            && name != self.sentinel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with_sentinel() -> (FileStore, tempfile::TempDir) {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join(".gitkeep"), "").unwrap();
        (FileStore::new(tmp.path(), ".gitkeep"), tmp)
    }

    #[test]
    fn empty_store_lists_nothing() {
        let (store, _tmp) = store_with_sentinel();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn lists_files_with_exact_sizes() {
        let (store, tmp) = store_with_sentinel();
        std::fs::write(tmp.path().join("a.mp4"), vec![0u8; 10]).unwrap();
        std::fs::write(tmp.path().join("b.mp3"), vec![0u8; 2048]).unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("c.mp4"), "x").unwrap();

        let files = store.list().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.mp4");
        assert_eq!(files[0].size, 10);
        assert_eq!(files[1].name, "b.mp3");
        assert_eq!(files[1].size, 2048);
        assert_eq!(files[1].path, tmp.path().join("b.mp3"));
    }

    #[test]
    fn delete_removes_from_listing() {
        let (store, tmp) = store_with_sentinel();
        std::fs::write(tmp.path().join("a.mp4"), "x").unwrap();
        store.delete("a.mp4").unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(matches!(store.delete("a.mp4"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn traversal_and_sentinel_are_not_found() {
        let (store, tmp) = store_with_sentinel();
        std::fs::write(tmp.path().join("a.mp4"), "x").unwrap();
        for name in ["", "..", "../a.mp4", "nested/a.mp4", "/etc/passwd", ".gitkeep"] {
            assert!(
                matches!(store.resolve(name), Err(StoreError::NotFound(_))),
                "{name}"
            );
        }
        assert!(tmp.path().join(".gitkeep").exists());
    }

    #[test]
    fn clear_counts_and_keeps_sentinel() {
        let (store, tmp) = store_with_sentinel();
        for idx in 0..3 {
            std::fs::write(tmp.path().join(format!("{idx}.mp4")), "x").unwrap();
        }
        assert_eq!(store.clear().unwrap(), 3);
        assert!(store.list().unwrap().is_empty());
        assert!(tmp.path().join(".gitkeep").exists());
        assert_eq!(store.clear().unwrap(), 0);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("absent"), ".gitkeep");
        assert!(store.list().is_err());
    }
}
