use std::fs;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backup::{self, BackupEntry};
use crate::collection::Collection;
use crate::config::StoreConfig;
use crate::error::CmsError;

/// Durable per-collection persistence over a content directory.
///
/// `load` and `save` never return errors: failures are logged and turned
/// into the caller's default value or `false`.
#[derive(Debug, Clone)]
pub struct Storage {
    config: StoreConfig,
}

impl Storage {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> crate::Result<Self> {
        Ok(Self::new(StoreConfig::from_env()?))
    }

    pub fn with_content_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(StoreConfig::with_content_dir(dir))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn collection_path(&self, collection: Collection) -> PathBuf {
        self.config.content_dir.join(collection.file_name())
    }

    /// Creates the content and backup directories. Safe to call repeatedly.
    pub fn ensure_directories(&self) -> crate::Result<()> {
        for dir in [&self.config.content_dir, &self.config.backup_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                CmsError::FileSystem(format!("create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Reads `collection` from disk, returning `default` when the file is
    /// absent, unreadable or not valid JSON.
    pub fn load(&self, collection: Collection, default: Value) -> Value {
        self.load_as(collection, default)
    }

    /// Typed variant of [`Storage::load`]. A file that parses as JSON but not
    /// as `T` is treated like a corrupt file.
    pub fn load_as<T: DeserializeOwned>(&self, collection: Collection, default: T) -> T {
        if let Err(e) = self.ensure_directories() {
            report_failure("ensure_directories", collection, &self.config.content_dir, &e);
        }

        let path = self.collection_path(collection);
        match read_json(&path) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(collection = %collection, "No stored file, using default");
                default
            }
            Err(e) => {
                report_failure("load", collection, &path, &e);
                default
            }
        }
    }

    /// Writes `value` as pretty JSON over the collection file.
    ///
    /// The previous file, if any, is copied into the backup directory first
    /// and old backups are pruned; neither step can fail the save. The new
    /// content goes to a temp sibling which is renamed over the target, so
    /// readers see either the old or the new file in full. Returns `true`
    /// only when the rename succeeded.
    pub fn save<T: Serialize + ?Sized>(&self, collection: Collection, value: &T) -> bool {
        let path = self.collection_path(collection);
        match self.try_save(collection, &path, value) {
            Ok(()) => {
                debug!(collection = %collection, path = %path.display(), "Saved collection");
                true
            }
            Err(e) => {
                report_failure("save", collection, &path, &e);
                false
            }
        }
    }

    fn try_save<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        path: &Path,
        value: &T,
    ) -> crate::Result<()> {
        let content_dir = &self.config.content_dir;
        fs::create_dir_all(content_dir).map_err(|e| {
            CmsError::FileSystem(format!("create {}: {}", content_dir.display(), e))
        })?;

        if path.is_file() {
            if let Err(e) = self.backup_current(collection, path) {
                report_failure("backup", collection, path, &e);
            }
        }

        atomic_write_with(path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, value)?;
            writer.write_all(b"\n")?;
            Ok(())
        })
    }

    fn backup_current(&self, collection: Collection, path: &Path) -> crate::Result<()> {
        let backup_dir = &self.config.backup_dir;
        fs::create_dir_all(backup_dir).map_err(|e| {
            CmsError::FileSystem(format!("create {}: {}", backup_dir.display(), e))
        })?;

        let file_name = collection.file_name();
        let target = backup_dir.join(backup::backup_file_name(&file_name, Utc::now()));

        fs::copy(path, &target).map_err(|e| {
            CmsError::FileSystem(format!("copy to {}: {}", target.display(), e))
        })?;

        let removed = backup::cleanup_backups(backup_dir, &file_name, self.config.max_backups)?;
        if removed > 0 {
            debug!(collection = %collection, removed, "Pruned old backups");
        }
        Ok(())
    }

    /// Backups of `collection`, newest first.
    pub fn backups(&self, collection: Collection) -> crate::Result<Vec<BackupEntry>> {
        backup::list_backups(&self.config.backup_dir, &collection.file_name())
    }

    /// Saves the newest backup of `collection` back over the live file.
    ///
    /// The live file is itself backed up by the save, so a restore can be
    /// undone. Returns the backup that was restored, or `None` when there
    /// are no backups.
    pub fn restore_latest(&self, collection: Collection) -> crate::Result<Option<PathBuf>> {
        let Some(latest) = self.backups(collection)?.into_iter().next() else {
            return Ok(None);
        };

        let value: Value = read_json(&latest.path)?.ok_or_else(|| {
            CmsError::FileSystem(format!("backup vanished: {}", latest.path.display()))
        })?;

        if !self.save(collection, &value) {
            return Err(CmsError::SaveFailed(collection.to_string()));
        }
        info!(collection = %collection, backup = %latest.path.display(), "Restored collection from backup");
        Ok(Some(latest.path))
    }
}

/// Single call site for persistence failures so operators see the operation,
/// the collection and the cause together.
fn report_failure(operation: &'static str, collection: Collection, path: &Path, err: &CmsError) {
    match operation {
        "backup" => warn!(operation, collection = %collection, path = %path.display(), error = %err, "Persistence step failed"),
        _ => error!(operation, collection = %collection, path = %path.display(), error = %err, "Persistence step failed"),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> crate::Result<Option<T>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CmsError::FileSystem(format!("read {}: {}", path.display(), e))),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

/// Writes `bytes` to `path` through a temp file and rename.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> crate::Result<()> {
    atomic_write_with(path, |writer| {
        writer.write_all(bytes)?;
        Ok(())
    })
}

// Writes into a uniquely named temp file in the target's directory, syncs it,
// then renames it into place. The temp file is removed on any failure.
fn atomic_write_with<F>(path: &Path, write: F) -> crate::Result<()>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> crate::Result<()>,
{
    let parent = path
        .parent()
        .ok_or_else(|| CmsError::FileSystem(format!("Invalid path: {}", path.display())))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    use rand::{thread_rng, Rng};
    let suffix: u64 = thread_rng().gen();
    let tmp = parent.join(format!(".{file_name}.{suffix}.tmp"));

    let result = (|| -> crate::Result<()> {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| CmsError::FileSystem(e.error().to_string()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path).map_err(|e| {
            CmsError::FileSystem(format!("rename to {}: {}", path.display(), e))
        })
    })();

    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %e, "Failed to remove temp file");
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::{Error as _, SerializeSeq, Serializer};
    use serde_json::json;
    use tempfile::TempDir;

    fn storage() -> (TempDir, Storage) {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_content_dir(tmp.path().join("content"));
        (tmp, storage)
    }

    fn leftover_temp_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    struct Exploding;

    impl Serialize for Exploding {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(2))?;
            seq.serialize_element("half written")?;
            Err(S::Error::custom("disk went away"))
        }
    }

    #[test]
    fn test_round_trip_every_collection() {
        let (_tmp, storage) = storage();
        for collection in Collection::ALL {
            let value = if collection.is_list() {
                json!([{ "id": "1", "title": collection.name() }, { "id": "2" }])
            } else {
                json!({ "name": collection.name(), "nested": { "enabled": true, "n": 3 } })
            };
            assert!(storage.save(collection, &value));
            assert_eq!(storage.load(collection, Value::Null), value);
        }
    }

    #[test]
    fn test_missing_file_returns_default() {
        let (_tmp, storage) = storage();
        let loaded = storage.load(Collection::Experts, json!(["fallback"]));
        assert_eq!(loaded, json!(["fallback"]));
        assert!(storage.config().content_dir.exists());
        assert!(storage.config().backup_dir.exists());
    }

    #[test]
    fn test_corrupt_file_returns_default_and_is_left_alone() {
        let (_tmp, storage) = storage();
        storage.ensure_directories().unwrap();
        let path = storage.collection_path(Collection::Site);
        fs::write(&path, "{ not json").unwrap();

        let loaded = storage.load(Collection::Site, json!({ "title": "default" }));
        assert_eq!(loaded, json!({ "title": "default" }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_saved_file_is_pretty_printed() {
        let (_tmp, storage) = storage();
        assert!(storage.save(Collection::Footer, &json!({ "copyright": "2024" })));
        let text = fs::read_to_string(storage.collection_path(Collection::Footer)).unwrap();
        assert!(text.contains("\n  \"copyright\": \"2024\""));
    }

    #[test]
    fn test_overwrite_creates_backup_of_previous_content() {
        let (_tmp, storage) = storage();
        let v1 = json!([{ "id": "a" }]);
        let v2 = json!([{ "id": "b" }]);
        assert!(storage.save(Collection::Articles, &v1));
        assert!(storage.backups(Collection::Articles).unwrap().is_empty());
        assert!(storage.save(Collection::Articles, &v2));

        let backups = storage.backups(Collection::Articles).unwrap();
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name();
        assert!(name.starts_with("articles.json."));
        assert!(name.ends_with(".bak"));
        let content: Value = serde_json::from_str(&fs::read_to_string(&backups[0].path).unwrap()).unwrap();
        assert_eq!(content, v1);
        assert_eq!(storage.load(Collection::Articles, Value::Null), v2);
    }

    #[test]
    fn test_backup_cap_keeps_ten_most_recent() {
        let (_tmp, storage) = storage();
        for i in 0..12 {
            assert!(storage.save(Collection::Slides, &json!([{ "version": i }])));
        }

        let backups = storage.backups(Collection::Slides).unwrap();
        assert_eq!(backups.len(), 10);

        let mut versions: Vec<i64> = backups
            .iter()
            .map(|b| {
                let v: Value = serde_json::from_str(&fs::read_to_string(&b.path).unwrap()).unwrap();
                v[0]["version"].as_i64().unwrap()
            })
            .collect();
        versions.sort();
        assert_eq!(versions, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let (_tmp, storage) = storage();
        let original = json!({ "theme": "dark" });
        assert!(storage.save(Collection::Settings, &original));

        assert!(!storage.save(Collection::Settings, &Exploding));

        assert_eq!(storage.load(Collection::Settings, Value::Null), original);
        assert!(leftover_temp_files(&storage.config().content_dir).is_empty());
    }

    #[test]
    fn test_unusable_backup_dir_does_not_fail_save() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "plain file").unwrap();
        let mut config = StoreConfig::with_content_dir(tmp.path().join("content"));
        config.backup_dir = blocker.join("backups");
        let storage = Storage::new(config);

        assert!(storage.save(Collection::Articles, &json!([{ "id": "1" }])));
        assert!(storage.save(Collection::Articles, &json!([{ "id": "2" }])));
        assert_eq!(storage.load(Collection::Articles, Value::Null), json!([{ "id": "2" }]));
        assert!(storage.backups(Collection::Articles).unwrap().is_empty());
        assert!(leftover_temp_files(&storage.config().content_dir).is_empty());
    }

    #[test]
    fn test_rename_failure_reports_false_and_cleans_temp() {
        let (_tmp, storage) = storage();
        storage.ensure_directories().unwrap();
        fs::create_dir(storage.collection_path(Collection::Media)).unwrap();

        assert!(!storage.save(Collection::Media, &json!([1, 2, 3])));
        assert!(storage.collection_path(Collection::Media).is_dir());
        assert!(leftover_temp_files(&storage.config().content_dir).is_empty());
    }

    #[test]
    fn test_load_as_typed() {
        #[derive(serde::Deserialize, Debug, PartialEq, Default)]
        struct Stats {
            visitors: u64,
        }

        let (_tmp, storage) = storage();
        assert!(storage.save(Collection::Stats, &json!({ "visitors": 42 })));
        assert_eq!(storage.load_as(Collection::Stats, Stats::default()), Stats { visitors: 42 });

        assert!(storage.save(Collection::Stats, &json!({ "visitors": "many" })));
        assert_eq!(storage.load_as(Collection::Stats, Stats::default()), Stats::default());
    }

    #[test]
    fn test_restore_latest_reverts_last_save() {
        let (_tmp, storage) = storage();
        assert_eq!(storage.restore_latest(Collection::Navigation).unwrap(), None);

        assert!(storage.save(Collection::Navigation, &json!({ "items": ["home"] })));
        assert!(storage.save(Collection::Navigation, &json!({ "items": [] })));

        let restored = storage.restore_latest(Collection::Navigation).unwrap();
        assert!(restored.is_some());
        assert_eq!(
            storage.load(Collection::Navigation, Value::Null),
            json!({ "items": ["home"] })
        );
    }

    #[test]
    fn test_atomic_write_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(leftover_temp_files(tmp.path()).is_empty());
    }
}
