use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs as async_fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::TaskStore;
use crate::task_manager::Task;

pub const SNAPSHOT_VERSION: u32 = 1;
const TASKS_FILE: &str = "tasks.json";
const BACKUP_PREFIX: &str = "tasks_backup_";

/// On-disk form of the whole catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl Snapshot {
    /// Copies the store out under its read lock.
    pub fn capture(store: &TaskStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: store.now(),
            tasks: store.snapshot(),
        }
    }
}

/// Somewhere a snapshot can be loaded from and saved to.
///
/// `persist` and `hydrate` never hold the store lock across I/O. Backends
/// shared between concurrent writers override `persist` so that snapshots
/// land in capture order.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn load_snapshot(&self) -> anyhow::Result<Option<Snapshot>>;

    async fn save_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()>;

    async fn persist(&self, store: &TaskStore) -> anyhow::Result<usize> {
        let snapshot = Snapshot::capture(store);
        self.save_snapshot(&snapshot).await?;
        Ok(snapshot.tasks.len())
    }

    async fn hydrate(&self, store: &TaskStore) -> anyhow::Result<usize> {
        match self.load_snapshot().await? {
            Some(snapshot) => {
                if snapshot.version > SNAPSHOT_VERSION {
                    bail!(
                        "Snapshot version {} is newer than supported version {}",
                        snapshot.version,
                        SNAPSHOT_VERSION
                    );
                }
                Ok(store.restore(snapshot.tasks))
            }
            None => Ok(0),
        }
    }
}

/// Keeps the latest snapshot in memory. Useful when no data directory is
/// configured and in tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotRepository {
    latest: Mutex<Option<Snapshot>>,
}

impl MemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl SnapshotRepository for MemorySnapshotRepository {
    async fn load_snapshot(&self) -> anyhow::Result<Option<Snapshot>> {
        Ok(self.latest())
    }

    async fn persist(&self, store: &TaskStore) -> anyhow::Result<usize> {
        let mut latest = self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = Snapshot::capture(store);
        let count = snapshot.tasks.len();
        *latest = Some(snapshot);
        Ok(count)
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        *self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());
        Ok(())
    }
}

/// JSON snapshot file plus timestamped backups in one data directory.
///
/// Writers to `tasks.json` take `write_lock`, so saves and restores run one
/// at a time.
pub struct StorageManager {
    data_dir: PathBuf,
    tasks_file: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl StorageManager {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            tasks_file: data_dir.join(TASKS_FILE),
            write_lock: AsyncMutex::new(()),
        }
    }

    pub fn tasks_file(&self) -> &Path {
        &self.tasks_file
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        if !self.data_dir.exists() {
            async_fs::create_dir_all(&self.data_dir)
                .await
                .with_context(|| format!("creating data directory {:?}", self.data_dir))?;
            info!(path = ?self.data_dir, "Created data directory");
        }
        Ok(())
    }

    pub async fn create_backup(&self) -> anyhow::Result<PathBuf> {
        if !self.tasks_file.exists() {
            bail!("Tasks file does not exist");
        }
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_path = self.data_dir.join(format!("{}{}.json", BACKUP_PREFIX, timestamp));
        async_fs::copy(&self.tasks_file, &backup_path).await?;
        info!(path = ?backup_path, "Created backup");
        Ok(backup_path)
    }

    /// Backup files, oldest first.
    pub async fn list_backups(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut backups = Vec::new();
        if !self.data_dir.exists() {
            return Ok(backups);
        }
        let mut entries = async_fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(BACKUP_PREFIX) && name.ends_with(".json"));
            if is_backup {
                backups.push(path);
            }
        }
        backups.sort();
        Ok(backups)
    }

    pub async fn cleanup_old_backups(&self, keep_count: usize) -> anyhow::Result<usize> {
        let backups = self.list_backups().await?;
        if backups.len() <= keep_count {
            return Ok(0);
        }
        let to_remove = backups.len() - keep_count;
        for backup in backups.iter().take(to_remove) {
            async_fs::remove_file(backup).await?;
            debug!(path = ?backup, "Removed old backup");
        }
        Ok(to_remove)
    }

    /// Copies `backup_path` over the tasks file, backing up the current
    /// file first.
    pub async fn restore_from_backup(&self, backup_path: &Path) -> anyhow::Result<()> {
        if !backup_path.exists() {
            bail!("Backup file does not exist: {:?}", backup_path);
        }
        let _guard = self.write_lock.lock().await;
        if self.tasks_file.exists() {
            self.create_backup().await?;
        }
        async_fs::copy(backup_path, &self.tasks_file).await?;
        info!(path = ?backup_path, "Restored from backup");
        Ok(())
    }

    pub async fn validate_data_integrity(&self) -> anyhow::Result<bool> {
        match self.load_snapshot().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Data integrity check failed");
                Ok(false)
            }
        }
    }

    /// Writes through a uniquely named temporary file, then renames it over
    /// the tasks file. Callers hold `write_lock`.
    async fn write_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        self.initialize().await?;
        let json_content = serde_json::to_string_pretty(snapshot)?;
        let tmp_file = self
            .data_dir
            .join(format!("{}.{}.tmp", TASKS_FILE, Uuid::new_v4().simple()));
        async_fs::write(&tmp_file, json_content)
            .await
            .with_context(|| format!("writing {:?}", tmp_file))?;
        if let Err(e) = async_fs::rename(&tmp_file, &self.tasks_file).await {
            let _ = async_fs::remove_file(&tmp_file).await;
            return Err(e).with_context(|| format!("replacing {:?}", self.tasks_file));
        }
        debug!(path = ?self.tasks_file, tasks = snapshot.tasks.len(), "Saved snapshot");
        Ok(())
    }

    pub async fn get_storage_info(&self) -> anyhow::Result<StorageInfo> {
        let mut info = StorageInfo {
            data_dir_exists: self.data_dir.exists(),
            tasks_file_exists: self.tasks_file.exists(),
            tasks_file_size: 0,
            backup_count: 0,
            last_modified: None,
        };
        if info.tasks_file_exists {
            if let Ok(metadata) = async_fs::metadata(&self.tasks_file).await {
                info.tasks_file_size = metadata.len();
                if let Ok(modified) = metadata.modified() {
                    info.last_modified = Some(modified.into());
                }
            }
        }
        info.backup_count = self.list_backups().await?.len();
        Ok(info)
    }
}

#[async_trait]
impl SnapshotRepository for StorageManager {
    async fn load_snapshot(&self) -> anyhow::Result<Option<Snapshot>> {
        if !self.tasks_file.exists() {
            return Ok(None);
        }
        let content = async_fs::read_to_string(&self.tasks_file).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("parsing snapshot {:?}", self.tasks_file))?;
        debug!(path = ?self.tasks_file, tasks = snapshot.tasks.len(), "Loaded snapshot");
        Ok(Some(snapshot))
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(snapshot).await
    }

    /// Captures under `write_lock`, so a later capture is never overwritten
    /// by an earlier one.
    async fn persist(&self, store: &TaskStore) -> anyhow::Result<usize> {
        let _guard = self.write_lock.lock().await;
        let snapshot = Snapshot::capture(store);
        self.write_snapshot(&snapshot).await?;
        Ok(snapshot.tasks.len())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub data_dir_exists: bool,
    pub tasks_file_exists: bool,
    pub tasks_file_size: u64,
    pub backup_count: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_manager::TaskDraft;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initialize_creates_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        let storage = StorageManager::new(&data_dir);
        assert!(!data_dir.exists());
        storage.initialize().await.unwrap();
        assert!(data_dir.exists());
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageManager::new(temp_dir.path());
        assert!(storage.load_snapshot().await.unwrap().is_none());
        assert!(storage.validate_data_integrity().await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_repository_round_trip() {
        let repo = MemorySnapshotRepository::new();
        let store = TaskStore::new();
        store.create(TaskDraft::new("Remember me")).unwrap();
        assert_eq!(repo.persist(&store).await.unwrap(), 1);

        let restored = TaskStore::new();
        assert_eq!(repo.hydrate(&restored).await.unwrap(), 1);
        assert_eq!(restored.snapshot(), store.snapshot());
    }
}
