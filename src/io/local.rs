use super::ArchiveSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Archive stored on the local filesystem.
pub struct LocalFileSource {
    path: PathBuf,
    location: String,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }
}

#[async_trait]
impl ArchiveSource for LocalFileSource {
    async fn load(&self) -> Result<Vec<u8>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("cannot read {}", self.location))?;
        log::debug!("read {} bytes from {}", data.len(), self.location);
        Ok(data)
    }

    fn location(&self) -> &str {
        &self.location
    }
}
