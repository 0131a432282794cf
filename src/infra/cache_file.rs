//! Persists the in-memory cache between runs as a JSON snapshot.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::application::repos::PostsCache;
use crate::cache::MemoryStore;
use crate::domain::entities::Snapshot;

use super::error::InfraError;

/// Load a previously persisted cache into `store`.
///
/// Returns `false` when there is nothing to restore yet.
pub async fn restore(path: &Path, store: &MemoryStore) -> Result<bool, InfraError> {
    let body = match tokio::fs::read_to_string(path).await {
        Ok(body) => body,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no persisted cache yet");
            return Ok(false);
        }
        Err(err) => return Err(err.into()),
    };

    let snapshot: Snapshot = serde_json::from_str(&body)?;
    store
        .upsert_snapshot(&snapshot)
        .await
        .map_err(|err| InfraError::cache(err.to_string()))?;

    info!(
        path = %path.display(),
        posts = snapshot.posts.len(),
        terms = snapshot.terms.len(),
        "restored cache"
    );
    Ok(true)
}

/// Write the whole store to `path`, replacing it atomically.
pub async fn persist(path: &Path, store: &MemoryStore) -> Result<(), InfraError> {
    let body = serde_json::to_vec_pretty(&store.dump())?;

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(path);
    tokio::fs::write(&staging, body).await?;
    tokio::fs::rename(&staging, path).await?;

    debug!(path = %path.display(), "persisted cache");
    Ok(())
}

/// `cache.json` stages as `cache.json.tmp`, never as the target itself.
fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}
