//! Filesystem pack reader scoped to a root directory.

use async_trait::async_trait;
use rulebook_core::error::ReadError;
use rulebook_core::reader::PackReader;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Reads pack files from a directory. Paths must stay inside the root.
pub struct FsPackReader {
    root: PathBuf,
    root_display: String,
}

impl FsPackReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root_display = root.display().to_string();
        Self { root, root_display }
    }

    /// Resolve a pack-relative path, rejecting absolute paths and `..`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ReadError> {
        resolve_within(&self.root, path)
    }
}

/// Resolve `relative` under `root`, refusing anything that escapes it.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, ReadError> {
    let rel = Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        return Err(ReadError::Io {
            path: relative.into(),
            reason: "path escapes pack root".into(),
        });
    }
    Ok(root.join(rel))
}

fn map_io(path: &str, e: std::io::Error) -> ReadError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ReadError::NotFound { path: path.into() }
    } else {
        ReadError::Io {
            path: path.into(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl PackReader for FsPackReader {
    fn root(&self) -> &str {
        &self.root_display
    }

    async fn read_text(&self, path: &str) -> Result<String, ReadError> {
        let full = self.resolve(path)?;
        debug!(path, "Reading pack file");
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, ReadError> {
        let full = self.resolve(path)?;
        debug!(path, "Reading pack blob");
        tokio::fs::read(&full).await.map_err(|e| map_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_text_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rules")).unwrap();
        std::fs::write(dir.path().join("rules/index_meta.json"), "{}").unwrap();
        std::fs::write(dir.path().join("rules/vectors.f16"), [0u8, 60]).unwrap();

        let reader = FsPackReader::new(dir.path());
        assert_eq!(reader.read_text("rules/index_meta.json").await.unwrap(), "{}");
        assert_eq!(reader.read_bytes("rules/vectors.f16").await.unwrap(), vec![0, 60]);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FsPackReader::new(dir.path());
        assert!(matches!(
            reader.read_text("manifest.json").await,
            Err(ReadError::NotFound { .. })
        ));
    }

    #[test]
    fn escaping_paths_rejected() {
        let reader = FsPackReader::new("/packs/v1");
        assert!(reader.resolve("../secrets").is_err());
        assert!(reader.resolve("/etc/passwd").is_err());
        assert!(reader.resolve("").is_err());
        assert_eq!(
            reader.resolve("./rules/index_meta.json").unwrap(),
            PathBuf::from("/packs/v1/rules/index_meta.json")
        );
    }
}
