//! The in-memory mirror of every collection and the aggregate load/save
//! rules that connect it to disk.
//!
//! Load precedence per collection is: the stored value when present (and,
//! for list collections, non-empty), otherwise the bundled default,
//! otherwise an empty list or `null`. A list that a user deliberately
//! emptied is therefore indistinguishable from one never populated and
//! comes back as the defaults on the next load. A list collection whose
//! stored value is not an array at all (say `{}` in `articles.json`) is
//! treated the same way.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::collection::{Collection, Shape};
use crate::defaults::DefaultDataset;
use crate::error::CmsError;
use crate::storage::Storage;

/// Collection name to value, as loaded from or destined for disk.
pub type Collections = BTreeMap<Collection, Value>;

/// Loads every collection, applying the default-value precedence rules.
pub fn load_all(storage: &Storage, defaults: &DefaultDataset) -> Collections {
    Collection::ALL
        .into_iter()
        .map(|collection| {
            let stored = storage.load(collection, collection.shape().empty_value());
            let value = resolve(collection, stored, defaults.get(collection));
            (collection, value)
        })
        .collect()
}

fn resolve(collection: Collection, stored: Value, fallback: Option<&Value>) -> Value {
    let present = match collection.shape() {
        Shape::List => stored.as_array().is_some_and(|items| !items.is_empty()),
        Shape::Singleton => !stored.is_null(),
    };
    if present {
        return stored;
    }
    match fallback {
        Some(value) => {
            debug!(collection = %collection, "Using bundled default");
            value.clone()
        }
        None => collection.shape().empty_value(),
    }
}

/// Saves every collection present in `collections`.
///
/// Missing or `null` entries are skipped and count as success. Every
/// remaining collection is attempted even after a failure; the result is
/// `true` only if all of them were written. Nothing is rolled back.
pub fn save_all(storage: &Storage, collections: &Collections) -> bool {
    let mut attempted = 0usize;
    let mut failed = Vec::new();

    for collection in Collection::ALL {
        match collections.get(&collection) {
            None | Some(Value::Null) => continue,
            Some(value) => {
                attempted += 1;
                if !storage.save(collection, value) {
                    failed.push(collection.name());
                }
            }
        }
    }

    let success = failed.is_empty();
    if success {
        info!(target: "audit", attempted, "Saved all collections");
    } else {
        warn!(target: "audit", attempted, failed = ?failed, "Saving collections partially failed");
    }
    success
}

/// The process-wide content state, shared with request handlers by
/// reference.
///
/// Each collection sits behind its own lock, held across the whole
/// read-modify-save in [`WorkingSet::mutate`], so concurrent writers to a
/// collection are applied one after another and none is lost.
pub struct WorkingSet {
    storage: Storage,
    slots: BTreeMap<Collection, Mutex<Value>>,
}

impl WorkingSet {
    /// Prepares the content directories and loads every collection.
    pub fn init(storage: Storage, defaults: &DefaultDataset) -> crate::Result<Self> {
        storage.ensure_directories()?;
        let slots = load_all(&storage, defaults)
            .into_iter()
            .map(|(collection, value)| (collection, Mutex::new(value)))
            .collect();
        info!(content_dir = %storage.config().content_dir.display(), "Working set loaded");
        Ok(Self { storage, slots })
    }

    /// Ends the working set, returning its final contents. Nothing is
    /// written: every mutation was already persisted when it happened.
    pub fn shutdown(self) -> Collections {
        let collections = self
            .slots
            .into_iter()
            .map(|(collection, slot)| {
                let value = slot.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
                (collection, value)
            })
            .collect();
        info!("Working set shut down");
        collections
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn lock(&self, collection: Collection) -> crate::Result<MutexGuard<'_, Value>> {
        let slot = self
            .slots
            .get(&collection)
            .ok_or_else(|| CmsError::UnknownCollection(collection.to_string()))?;
        // `mutate` only publishes a finished draft, so a panic while the lock
        // was held cannot have left the value half-written.
        Ok(slot.lock().unwrap_or_else(|poisoned| {
            warn!(collection = %collection, "Recovering collection lock after a panic");
            slot.clear_poison();
            poisoned.into_inner()
        }))
    }

    /// A copy of the current value of `collection`.
    pub fn snapshot(&self, collection: Collection) -> crate::Result<Value> {
        Ok(self.lock(collection)?.clone())
    }

    pub fn snapshot_all(&self) -> crate::Result<Collections> {
        Collection::ALL
            .into_iter()
            .map(|collection| Ok((collection, self.snapshot(collection)?)))
            .collect()
    }

    /// Applies `f` to a draft of `collection` and persists the result while
    /// holding the collection's lock.
    ///
    /// If `f` fails nothing changes. If the save fails the new value stays
    /// in memory and `CmsError::SaveFailed` is returned.
    pub fn mutate<F, R>(&self, collection: Collection, f: F) -> crate::Result<R>
    where
        F: FnOnce(&mut Value) -> crate::Result<R>,
    {
        let mut guard = self.lock(collection)?;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;

        if !self.storage.save(collection, &*guard) {
            return Err(CmsError::SaveFailed(collection.to_string()));
        }
        Ok(out)
    }

    /// Replaces `collection` wholesale and persists it.
    pub fn replace(&self, collection: Collection, value: Value) -> crate::Result<()> {
        self.mutate(collection, |current| {
            *current = value;
            Ok(())
        })
    }

    /// Persists every collection, each under its own lock.
    pub fn save_all(&self) -> crate::Result<bool> {
        let mut success = true;
        for collection in Collection::ALL {
            let guard = self.lock(collection)?;
            if guard.is_null() {
                continue;
            }
            if !self.storage.save(collection, &*guard) {
                success = false;
            }
        }
        if success {
            info!(target: "audit", "Saved working set");
        } else {
            warn!(target: "audit", "Saving working set partially failed");
        }
        Ok(success)
    }
}
