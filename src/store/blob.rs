use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
#[cfg(test)]
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Opaque load/save backend for the whole node collection.
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` means nothing has been written yet.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    fn write(&self, bytes: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .with_context(|| format!("store path {} has no file name", self.path.display()))?;
        let tmp_path = self
            .path
            .with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
        let finished = write_synced(&tmp_path, bytes).and_then(|()| {
            fs::rename(&tmp_path, &self.path)
                .with_context(|| format!("failed to finalize {}", self.path.display()))
        });
        if finished.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        finished
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    data: Mutex<Option<Vec<u8>>>,
}

#[cfg(test)]
impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Mutex::new(Some(bytes.into())),
        }
    }
}

#[cfg(test)]
impl BlobStore for MemoryBlobStore {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        let guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_reports_missing_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("nodes.json"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn file_store_writes_through_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("nodes.json");
        let store = FileBlobStore::new(&path);

        store.write(b"[]").unwrap();
        store.write(b"[1]").unwrap();

        assert_eq!(store.read().unwrap().as_deref(), Some(&b"[1]"[..]));
        assert!(!path.with_file_name("nodes.json.tmp").exists());
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");
        // A non-empty directory at the target makes the final rename fail.
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();
        let store = FileBlobStore::new(&path);

        let err = store.write(b"[]").unwrap_err();
        assert!(format!("{err:#}").contains("failed to finalize"));
        assert!(!dir.path().join("nodes.json.tmp").exists());
        assert!(path.join("keep").exists());
    }
}
