use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

/// Resumable reading progress of one book session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub active_chapter: String,
    pub completed: bool,
    pub chapters: Vec<ChapterSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSnapshot {
    pub id: String,
    pub completed: bool,
    #[serde(default)]
    pub done_sections: Vec<String>,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<BookSnapshot>>;
    async fn put(&self, session_id: &str, snapshot: &BookSnapshot) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, BookSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<BookSnapshot>> {
        Ok(self.snapshots.read().await.get(session_id).cloned())
    }

    async fn put(&self, session_id: &str, snapshot: &BookSnapshot) -> anyhow::Result<()> {
        self.snapshots
            .write()
            .await
            .insert(session_id.to_owned(), snapshot.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LocalFsSnapshotStore {
    base_dir: PathBuf,
}

impl LocalFsSnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn snapshot_path(&self, session_id: &str) -> PathBuf {
        self.base_dir
            .join("sessions")
            .join(session_id)
            .join("snapshot.json")
    }
}

#[async_trait]
impl SnapshotStore for LocalFsSnapshotStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<BookSnapshot>> {
        let path = self.snapshot_path(session_id);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put(&self, session_id: &str, snapshot: &BookSnapshot) -> anyhow::Result<()> {
        let path = self.snapshot_path(session_id);
        write_json_atomic(&path, snapshot)
            .await
            .context("write snapshot.json")
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
