use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::collection::Collection;
use crate::error::CmsError;
use crate::working_set::WorkingSet;

/// A record stored in one of the list collections.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expert {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A research paper, optionally with an uploaded PDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchPaper {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shape of the `site` singleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

macro_rules! impl_record {
    ($ty:ty, $collection:expr) => {
        impl Record for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

impl_record!(Article, Collection::Articles);
impl_record!(Category, Collection::Categories);
impl_record!(Expert, Collection::Experts);
impl_record!(ResearchPaper, Collection::Research);
impl_record!(Slide, Collection::Slides);
impl_record!(MediaItem, Collection::Media);

/// The `id` of a record as a string; numeric ids are accepted.
pub fn record_id(record: &Value) -> Option<String> {
    record.get("id").and_then(id_string)
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn now_stamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn require_list(collection: Collection) -> crate::Result<()> {
    if collection.is_list() {
        Ok(())
    } else {
        Err(CmsError::InvalidRecord(format!("{collection} does not hold records")))
    }
}

// A list collection holding anything but an array is reset to an empty one.
fn items_mut(value: &mut Value) -> &mut Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => {
            *other = Value::Array(Vec::new());
            items_mut(other)
        }
    }
}

fn not_found(collection: Collection, id: &str) -> CmsError {
    CmsError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

impl WorkingSet {
    /// Every record of a list collection, in stored order.
    pub fn records(&self, collection: Collection) -> crate::Result<Vec<Value>> {
        require_list(collection)?;
        Ok(match self.snapshot(collection)? {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }

    /// Records of `T`'s collection decoded as `T`. Entries that do not fit
    /// the type are skipped with a warning.
    pub fn typed_records<T: Record>(&self) -> crate::Result<Vec<T>> {
        let collection = T::COLLECTION;
        let records = self.records(collection)?;
        Ok(records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<T>(record) {
                Ok(typed) => Some(typed),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Skipping malformed record");
                    None
                }
            })
            .collect())
    }

    /// The `site` singleton decoded, or defaults when unset.
    pub fn site_settings(&self) -> crate::Result<SiteSettings> {
        match self.snapshot(Collection::Site)? {
            Value::Null => Ok(SiteSettings::default()),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    pub fn get_record(&self, collection: Collection, id: &str) -> crate::Result<Option<Value>> {
        Ok(self
            .records(collection)?
            .into_iter()
            .find(|record| record_id(record).as_deref() == Some(id)))
    }

    /// Appends a record, assigning an `id` and timestamps where missing.
    /// Returns the record as stored.
    pub fn insert_record(&self, collection: Collection, record: Value) -> crate::Result<Value> {
        require_list(collection)?;
        let Value::Object(mut fields) = record else {
            return Err(CmsError::InvalidRecord("record must be a JSON object".to_string()));
        };

        let id = match fields.get("id").and_then(id_string) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                fields.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let stamp = now_stamp();
        fields.entry("createdAt").or_insert_with(|| stamp.clone());
        fields.insert("updatedAt".to_string(), stamp);
        let record = Value::Object(fields);

        let stored = self.mutate(collection, |value| {
            let items = items_mut(value);
            if items.iter().any(|r| record_id(r).as_deref() == Some(id.as_str())) {
                return Err(CmsError::InvalidRecord(format!("duplicate id '{id}' in {collection}")));
            }
            items.push(record.clone());
            Ok(record)
        })?;

        info!(collection = %collection, id = %id, "Record created");
        Ok(stored)
    }

    /// Typed variant of [`WorkingSet::insert_record`].
    pub fn insert<T: Record>(&self, record: &T) -> crate::Result<T> {
        let stored = self.insert_record(T::COLLECTION, serde_json::to_value(record)?)?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Shallow-merges `patch` into the record with `id`. The `id` itself
    /// cannot be changed.
    pub fn update_record(&self, collection: Collection, id: &str, patch: Value) -> crate::Result<Value> {
        require_list(collection)?;
        let Value::Object(patch) = patch else {
            return Err(CmsError::InvalidRecord("patch must be a JSON object".to_string()));
        };

        let updated = self.mutate(collection, |value| {
            let record = items_mut(value)
                .iter_mut()
                .find(|r| record_id(r).as_deref() == Some(id))
                .ok_or_else(|| not_found(collection, id))?;
            if let Some(fields) = record.as_object_mut() {
                for (key, val) in patch {
                    if key != "id" {
                        fields.insert(key, val);
                    }
                }
                fields.insert("updatedAt".to_string(), now_stamp());
            }
            Ok(record.clone())
        })?;

        info!(collection = %collection, id = %id, "Record updated");
        Ok(updated)
    }

    /// Removes the record with `id`, returning it.
    pub fn delete_record(&self, collection: Collection, id: &str) -> crate::Result<Value> {
        require_list(collection)?;
        let removed = self.mutate(collection, |value| {
            let items = items_mut(value);
            let index = items
                .iter()
                .position(|r| record_id(r).as_deref() == Some(id))
                .ok_or_else(|| not_found(collection, id))?;
            Ok(items.remove(index))
        })?;

        info!(collection = %collection, id = %id, "Record deleted");
        Ok(removed)
    }
}
