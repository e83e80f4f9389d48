use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::warn;

use crate::collection::Collection;

static BUNDLED_JSON: &str = include_str!("../data/defaults.json");

static BUNDLED: Lazy<DefaultDataset> = Lazy::new(|| match serde_json::from_str(BUNDLED_JSON) {
    Ok(value) => DefaultDataset::from_value(value),
    Err(e) => {
        warn!(error = %e, "Bundled default dataset is not valid JSON, starting empty");
        DefaultDataset::default()
    }
});

/// Fallback content shipped with the binary, keyed by collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultDataset {
    entries: BTreeMap<Collection, Value>,
}

impl DefaultDataset {
    /// The dataset compiled into the binary, parsed on first use.
    pub fn bundled() -> &'static DefaultDataset {
        &BUNDLED
    }

    /// Builds a dataset from a JSON object keyed by collection name.
    /// Unknown keys and non-object input are ignored.
    pub fn from_value(value: Value) -> Self {
        let mut entries = BTreeMap::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                match key.parse::<Collection>() {
                    Ok(collection) => {
                        entries.insert(collection, value);
                    }
                    Err(_) => warn!(key = %key, "Ignoring unknown collection in default dataset"),
                }
            }
        }
        Self { entries }
    }

    pub fn with(mut self, collection: Collection, value: Value) -> Self {
        self.entries.insert(collection, value);
        self
    }

    pub fn get(&self, collection: Collection) -> Option<&Value> {
        self.entries.get(&collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundled_dataset_has_articles() {
        let defaults = DefaultDataset::bundled();
        let articles = defaults.get(Collection::Articles).unwrap();
        assert_eq!(articles.as_array().unwrap().len(), 3);
        assert!(defaults.get(Collection::Site).unwrap().is_object());
        assert!(defaults.get(Collection::Security).is_none());
    }

    #[test]
    fn test_from_value_skips_unknown_keys() {
        let defaults = DefaultDataset::from_value(json!({
            "articles": [{ "id": "x" }],
            "comments": []
        }));
        assert_eq!(defaults.get(Collection::Articles), Some(&json!([{ "id": "x" }])));
        assert_eq!(defaults, DefaultDataset::default().with(Collection::Articles, json!([{ "id": "x" }])));
    }
}
