use redis::AsyncCommands;
use redis::Client;

use super::{ArtifactKey, ArtifactStore};
use crate::error::AppResult;

/// Creates a Redis client for artifact storage
///
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Artifact store keeping each blob under `artifact:<name>` without expiry
#[derive(Clone)]
pub struct RedisArtifactStore {
    redis_client: Client,
}

impl RedisArtifactStore {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for RedisArtifactStore {
    async fn load(&self, key: ArtifactKey) -> AppResult<Option<Vec<u8>>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let bytes: Option<Vec<u8>> = conn.get(key.to_string()).await?;
        Ok(bytes)
    }

    async fn save(&self, key: ArtifactKey, bytes: Vec<u8>) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let size = bytes.len();
        let _: () = conn.set(key.to_string(), bytes).await?;

        tracing::debug!(key = %key, size, "Artifact written to Redis");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
