use std::path::PathBuf;

use super::{ArtifactKey, ArtifactStore};
use crate::error::AppResult;

/// Stores each artifact as `<dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: ArtifactKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.name()))
    }
}

#[async_trait::async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn load(&self, key: ArtifactKey) -> AppResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a temporary file first so a crash never leaves a torn artifact
    async fn save(&self, key: ArtifactKey, bytes: Vec<u8>) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "Artifact written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
