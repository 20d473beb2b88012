//! File-reading capability scoped to a pack root.

use crate::error::ReadError;
use async_trait::async_trait;

/// Whole-file reads relative to the pack root.
#[async_trait]
pub trait PackReader: Send + Sync {
    /// Identity of the root this reader is scoped to.
    fn root(&self) -> &str;

    async fn read_text(&self, path: &str) -> Result<String, ReadError>;

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, ReadError>;

    /// Read a file that may legitimately be absent.
    async fn read_text_optional(&self, path: &str) -> Result<Option<String>, ReadError> {
        match self.read_text(path).await {
            Ok(text) => Ok(Some(text)),
            Err(ReadError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
