pub mod attachments;
pub mod backup;
pub mod collection;
pub mod config;
pub mod content;
pub mod defaults;
pub mod error;
pub mod query;
pub mod storage;
pub mod working_set;

pub use attachments::{AttachmentStore, StoredAttachment};
pub use backup::BackupEntry;
pub use collection::{Collection, Shape};
pub use config::StoreConfig;
pub use content::{Article, Category, Expert, MediaItem, Record, ResearchPaper, SiteSettings, Slide};
pub use defaults::DefaultDataset;
pub use error::CmsError;
pub use query::{Filter, Page, Query, SortOrder};
pub use storage::Storage;
pub use working_set::{load_all, save_all, Collections, WorkingSet};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CmsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn three_articles() -> Value {
        json!([
            { "id": "a1", "title": "One" },
            { "id": "a2", "title": "Two" },
            { "id": "a3", "title": "Three" }
        ])
    }

    #[test]
    fn test_empty_directory_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_content_dir(tmp.path().join("content"));
        let defaults = DefaultDataset::default().with(Collection::Articles, three_articles());

        let all = load_all(&storage, &defaults);
        assert_eq!(all[&Collection::Articles], three_articles());

        let five: Value = (1..=5)
            .map(|i| json!({ "id": format!("n{i}") }))
            .collect::<Vec<_>>()
            .into();
        let mut update = Collections::new();
        update.insert(Collection::Articles, five.clone());
        assert!(save_all(&storage, &update));
        assert_eq!(load_all(&storage, &defaults)[&Collection::Articles], five);

        update.insert(Collection::Articles, json!([]));
        assert!(save_all(&storage, &update));
        assert_eq!(load_all(&storage, &defaults)[&Collection::Articles], three_articles());
    }

    #[test]
    fn test_working_set_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let defaults = DefaultDataset::bundled();

        let set = WorkingSet::init(Storage::with_content_dir(tmp.path()), defaults).unwrap();
        let created = set
            .insert_record(Collection::Categories, json!({ "name": "Opinion" }))
            .unwrap();
        set.shutdown();

        let set = WorkingSet::init(Storage::with_content_dir(tmp.path()), defaults).unwrap();
        let categories = set.records(Collection::Categories).unwrap();
        assert_eq!(categories.len(), 4);
        assert_eq!(categories.last(), Some(&created));

        let news = set
            .query(Collection::Articles, &Query::new().filter("category", "news"))
            .unwrap();
        assert_eq!(news.total, 2);
    }

    #[test]
    fn test_partial_failure_updates_other_collections() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_content_dir(tmp.path());
        storage.ensure_directories().unwrap();
        let blocked = storage.collection_path(Collection::Research);
        std::fs::create_dir(&blocked).unwrap();

        let batch: Collections = Collection::ALL
            .into_iter()
            .map(|c| (c, json!([{ "id": "batch", "collection": c.name() }])))
            .collect();
        assert!(!save_all(&storage, &batch));

        let written = Collection::ALL
            .into_iter()
            .filter(|c| storage.load(*c, Value::Null) == batch[c])
            .count();
        assert_eq!(written, 14);
        assert!(blocked.is_dir());
    }
}
