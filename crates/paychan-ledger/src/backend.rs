//! Storage backends for channel records.
//!
//! A backend stores the persisted text form of each channel under its id.
//! Every write replaces the whole record; readers see either the previous
//! record or the new one, never a mix.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use paychan_channel::ChannelId;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// File extension of persisted channel records.
pub const RECORD_EXTENSION: &str = "json";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Storage backend trait.
///
/// Implementations only move whole records; validation of their contents
/// is the ledger's job.
#[async_trait::async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Read a record, `None` if absent.
    async fn read_record(&self, channel_id: &ChannelId) -> LedgerResult<Option<String>>;

    /// Store a new record. Fails with `ChannelAlreadyExists` instead of
    /// overwriting.
    async fn create_record(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()>;

    /// Atomically replace an existing record.
    async fn write_record(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()>;

    /// All stored ids, sorted.
    async fn list_ids(&self) -> LedgerResult<Vec<ChannelId>>;

    /// Remove a record. Returns whether it existed.
    async fn delete_record(&self, channel_id: &ChannelId) -> LedgerResult<bool>;
}

/// In-memory backend.
///
/// Suitable for testing and short-lived processes. All records are lost
/// when the backend is dropped.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    records: Arc<RwLock<BTreeMap<ChannelId, String>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LedgerBackend for InMemoryBackend {
    async fn read_record(&self, channel_id: &ChannelId) -> LedgerResult<Option<String>> {
        Ok(self.records.read().await.get(channel_id).cloned())
    }

    async fn create_record(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(channel_id) {
            return Err(LedgerError::ChannelAlreadyExists(channel_id.clone()));
        }
        records.insert(channel_id.clone(), text.to_string());
        debug!("Created record in memory: {}", channel_id);
        Ok(())
    }

    async fn write_record(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()> {
        let mut records = self.records.write().await;
        records.insert(channel_id.clone(), text.to_string());
        debug!("Stored record in memory: {} bytes", text.len());
        Ok(())
    }

    async fn list_ids(&self) -> LedgerResult<Vec<ChannelId>> {
        // BTreeMap keys are already sorted.
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn delete_record(&self, channel_id: &ChannelId) -> LedgerResult<bool> {
        let removed = self.records.write().await.remove(channel_id).is_some();
        if removed {
            debug!("Deleted record from memory: {}", channel_id);
        }
        Ok(removed)
    }
}

/// File-system backend.
///
/// Stores each channel as `{root_dir}/{channel_id}.json`, pretty-printed.
/// Writes go to a hidden temporary file in the same directory which is then
/// renamed over the record, so a crash mid-write leaves the previous record
/// intact.
pub struct FileSystemBackend {
    root_dir: PathBuf,
    sync_writes: bool,
}

impl FileSystemBackend {
    /// Create a backend rooted at `root_dir` with default settings.
    ///
    /// The directory will be created if it doesn't exist.
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> LedgerResult<Self> {
        Self::with_config(&LedgerConfig::default().with_root_dir(root_dir.as_ref())).await
    }

    pub async fn with_config(config: &LedgerConfig) -> LedgerResult<Self> {
        let root_dir = config.root_dir.clone();
        fs::create_dir_all(&root_dir).await?;
        debug!("Opened filesystem ledger at {}", root_dir.display());

        Ok(Self {
            root_dir,
            sync_writes: config.sync_writes,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the file path for a record.
    pub fn record_path(&self, channel_id: &ChannelId) -> PathBuf {
        self.root_dir
            .join(format!("{}.{}", channel_id, RECORD_EXTENSION))
    }

    /// A temporary path no other writer, in this process or another, uses.
    fn temp_path(&self, channel_id: &ChannelId) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.root_dir.join(format!(
            ".{}.{}.{}-{}.tmp",
            channel_id,
            RECORD_EXTENSION,
            std::process::id(),
            seq
        ))
    }

    async fn write_temp(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<PathBuf> {
        let temp = self.temp_path(channel_id);
        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(text.as_bytes()).await?;
            if self.sync_writes {
                file.sync_all().await?;
            }
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(err) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        Ok(temp)
    }

    async fn write_atomic(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()> {
        let temp = self.write_temp(channel_id, text).await?;
        let path = self.record_path(channel_id);

        if let Err(err) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }

        debug!("Stored record on filesystem: {}", path.display());
        Ok(())
    }

    /// Publish a complete record under its final name, failing if one
    /// already exists. The link is atomic, so concurrent creators on the
    /// same root cannot both succeed.
    async fn write_exclusive(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()> {
        let temp = self.write_temp(channel_id, text).await?;
        let path = self.record_path(channel_id);

        let linked = fs::hard_link(&temp, &path).await;
        let _ = fs::remove_file(&temp).await;
        match linked {
            Ok(()) => {
                debug!("Created record on filesystem: {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LedgerError::ChannelAlreadyExists(channel_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait::async_trait]
impl LedgerBackend for FileSystemBackend {
    async fn read_record(&self, channel_id: &ChannelId) -> LedgerResult<Option<String>> {
        match fs::read_to_string(self.record_path(channel_id)).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_record(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()> {
        self.write_exclusive(channel_id, text).await
    }

    async fn write_record(&self, channel_id: &ChannelId, text: &str) -> LedgerResult<()> {
        self.write_atomic(channel_id, text).await
    }

    async fn list_ids(&self) -> LedgerResult<Vec<ChannelId>> {
        let mut result = Vec::new();

        let mut entries = fs::read_dir(&self.root_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION)
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match ChannelId::new(stem) {
                Ok(id) => result.push(id),
                Err(err) => warn!("Skipping {}: {}", path.display(), err),
            }
        }

        result.sort();
        Ok(result)
    }

    async fn delete_record(&self, channel_id: &ChannelId) -> LedgerResult<bool> {
        match fs::remove_file(self.record_path(channel_id)).await {
            Ok(()) => {
                debug!("Deleted record from filesystem: {}", channel_id);
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
