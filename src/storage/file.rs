use crate::counter::models::{Store, CURRENT_SCHEMA_VERSION};
use crate::counter::schema::repair;
use crate::storage::{CounterStore, StorageResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// JSON document on the local filesystem
///
/// Saves go to `<path>.<pid>.<n>.tmp` first and are renamed over the canonical
/// file, so a concurrent `load` never reads a half-written document. The temp
/// name is unique per store instance, so two writers on the same path (the
/// server and `tally-admin`) never truncate each other's temp file.
pub struct FileStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}.{}.tmp", std::process::id(), instance));

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }
}

#[async_trait]
impl CounterStore for FileStore {
    async fn load(&self) -> StorageResult<Store> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Store::default()),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Store::default());
        }

        let document = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(document) => document,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "counter document is corrupt, starting from an empty store"
                );
                return Ok(Store::default());
            }
        };

        let (store, report) = repair(document);
        if !report.is_clean() {
            debug!(
                path = %self.path.display(),
                source_version = report.source_version,
                fixed_fields = report.fixed_fields,
                "repaired counter document on load"
            );
        }

        Ok(store)
    }

    async fn save(&self, store: &Store) -> StorageResult<()> {
        let mut stamped = store.clone();
        stamped.schema_version = stamped.schema_version.max(CURRENT_SCHEMA_VERSION);
        let bytes = serde_json::to_vec_pretty(&stamped)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.tmp_path();
        let mut file = tokio::fs::File::create(tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(tmp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
