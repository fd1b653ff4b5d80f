//! Named, ordered record container over one backend slot.
//!
//! A [`Store`] either caches (the in-memory [`Entries`] are authoritative and
//! written through on every mutation) or reads through (every read re-parses
//! the slot, every write persists; the in-memory copy is only a return value).
//!
//! Every mutation builds the next view, persists it, and only then swaps it
//! in, so a failing backend leaves memory untouched and the error reaches the
//! caller. Successful mutations touch the store's [`ChangeNotifier`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::entries::Entries;
use crate::error::StoreResult;
use crate::notifier::{ChangeNotifier, DEFAULT_DEBOUNCE};
use crate::query::{self, Criteria, SearchOptions};

/// One or more keys to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyList(Vec<String>);

impl KeyList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for KeyList {
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

impl From<String> for KeyList {
    fn from(key: String) -> Self {
        Self(vec![key])
    }
}

impl From<Vec<String>> for KeyList {
    fn from(keys: Vec<String>) -> Self {
        Self(keys)
    }
}

impl From<Vec<&str>> for KeyList {
    fn from(keys: Vec<&str>) -> Self {
        Self(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for KeyList {
    fn from(keys: &[&str]) -> Self {
        Self(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyList {
    fn from(keys: [&str; N]) -> Self {
        Self(keys.iter().map(|k| k.to_string()).collect())
    }
}

// ── store ────────────────────────────────────────────────────────────

/// Ordered `key -> record` container persisted into one backend slot.
///
/// # Example
///
/// ```ignore
/// use keystash_store::{MemoryBackend, Store};
/// use serde_json::json;
///
/// let store = Store::builder("users").open(Arc::new(MemoryBackend::new()))?;
/// store.set("u1", json!({"name": "Ann"}))?.set("u2", json!({"name": "Bob"}))?;
/// assert_eq!(store.len(), 2);
/// ```
pub struct Store {
    name: Option<String>,
    caching: bool,
    backend: Arc<dyn Backend>,
    entries: Mutex<Entries>,
    size: AtomicUsize,
    notifier: ChangeNotifier,
}

impl Store {
    /// Start building a store persisted under `name`.
    pub fn builder(name: impl Into<String>) -> StoreBuilder {
        StoreBuilder {
            name: Some(name.into()),
            caching: true,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// A store with no slot. It never touches its backend.
    pub fn ephemeral(backend: Arc<dyn Backend>) -> Self {
        StoreBuilder {
            name: None,
            caching: true,
            debounce: DEFAULT_DEBOUNCE,
        }
        .build(backend, Entries::new())
    }

    /// Slot name, if the store persists.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn caching_enabled(&self) -> bool {
        self.caching
    }

    /// Number of entries in the most recently produced view.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── reads ────────────────────────────────────────────────────────

    /// Look up one record in the authoritative view.
    pub fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let entries = self.current()?;
        Ok(entries.get(key).cloned())
    }

    /// Snapshot of the authoritative view.
    ///
    /// For read-through stores this re-parses the slot and resynchronizes
    /// [`len`](Self::len).
    pub fn get_all(&self) -> StoreResult<Entries> {
        Ok(self.current()?.clone())
    }

    /// First record matching `criteria`, if any.
    pub fn find(&self, criteria: &Criteria, opts: SearchOptions) -> StoreResult<Option<Value>> {
        let hits = self.search(criteria, opts, 1)?;
        Ok(hits.into_iter().next().map(|(_, v)| v))
    }

    /// Records matching `criteria` in store order, at most `limit` (0 = all).
    pub fn search(
        &self,
        criteria: &Criteria,
        opts: SearchOptions,
        limit: usize,
    ) -> StoreResult<Entries> {
        let snapshot = self.get_all()?;
        Ok(query::search(&snapshot, criteria, opts).truncated(limit))
    }

    /// Reordered view of the store.
    ///
    /// With neither `field` nor `reverse` the current view is returned as is.
    /// With only `reverse` the order is flipped. With `field` records are
    /// sorted by that field, case-insensitively. `persist` writes the new
    /// order back through [`set_all`](Self::set_all).
    pub fn sort(&self, field: Option<&str>, reverse: bool, persist: bool) -> StoreResult<Entries> {
        let snapshot = self.get_all()?;
        let sorted = match field {
            None if !reverse => return Ok(snapshot),
            None => snapshot.reversed(),
            Some(field) => query::sort(&snapshot, field, reverse, true),
        };
        if persist {
            self.set_all(sorted.clone(), true)?;
        }
        Ok(sorted)
    }

    // ── writes ───────────────────────────────────────────────────────

    /// Insert or overwrite one record.
    pub fn set(&self, key: impl Into<String>, value: Value) -> StoreResult<&Self> {
        let key = key.into();
        self.mutate(|entries| {
            entries.insert(key.clone(), value);
            true
        })?;
        debug!(store = self.label(), key = %key, "record set");
        Ok(self)
    }

    /// Remove one or more records. Unknown keys are ignored.
    pub fn delete(&self, keys: impl Into<KeyList>) -> StoreResult<&Self> {
        let keys = keys.into();
        if keys.is_empty() {
            return Ok(self);
        }
        let removed = self.mutate(|entries| {
            keys.iter()
                .fold(false, |any, key| entries.shift_remove(key).is_some() || any)
        })?;
        if removed {
            debug!(store = self.label(), keys = ?keys, "records deleted");
        }
        Ok(self)
    }

    /// Replace the whole view with `records`, or merge them on top of it
    /// when `override_existing` is false (incoming records win).
    pub fn set_all(&self, records: Entries, override_existing: bool) -> StoreResult<&Self> {
        let count = records.len();
        self.mutate(move |entries| {
            if override_existing {
                *entries = records;
            } else {
                entries.extend(records);
            }
            true
        })?;
        debug!(
            store = self.label(),
            count,
            override_existing,
            "records replaced"
        );
        Ok(self)
    }

    /// [`set_all`](Self::set_all) for raw JSON.
    ///
    /// Anything other than a `[key, value]` pair list or an object is ignored.
    pub fn set_all_value(&self, records: &Value, override_existing: bool) -> StoreResult<&Self> {
        match Entries::from_json(records) {
            Some(entries) => self.set_all(entries, override_existing),
            None => {
                debug!(store = self.label(), "set_all ignored non-container input");
                Ok(self)
            }
        }
    }

    /// Read-modify-write of one record under the store lock.
    ///
    /// `f` sees the current record and returns the next one; `None` removes
    /// the key. Nothing is persisted when the record comes back unchanged.
    /// Returns the record now stored.
    pub fn update<F>(&self, key: &str, f: F) -> StoreResult<Option<Value>>
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        let mut stored = None;
        let changed = self.mutate(|entries| match f(entries.get(key)) {
            Some(next) => {
                stored = Some(next.clone());
                if entries.get(key) == Some(&next) {
                    return false;
                }
                entries.insert(key.to_string(), next);
                true
            }
            None => entries.shift_remove(key).is_some(),
        })?;
        if changed {
            debug!(store = self.label(), key, "record updated");
        }
        Ok(stored)
    }

    /// Edit the whole view under the store lock.
    ///
    /// `f` reports whether it changed anything; only then is the view
    /// persisted and a notification scheduled.
    pub fn update_all<F>(&self, f: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut Entries) -> bool,
    {
        let changed = self.mutate(f)?;
        if changed {
            debug!(store = self.label(), "records updated");
        }
        Ok(changed)
    }

    /// Re-hydrate from the backend, discarding the cached view.
    pub fn reload(&self) -> StoreResult<usize> {
        let len = self.reload_silently()?;
        self.notifier.touch();
        Ok(len)
    }

    // ── notifications ────────────────────────────────────────────────

    /// Subscribe to this store's change version.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }

    /// Current change version.
    pub fn version(&self) -> u64 {
        self.notifier.version()
    }

    /// Schedule a change notification without mutating anything.
    pub fn notify(&self) {
        self.notifier.touch();
    }

    // ── internals ────────────────────────────────────────────────────

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<ephemeral>")
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Entries>> {
        Ok(self.entries.lock()?)
    }

    /// Lock the in-memory view, refreshing it first for read-through stores.
    fn current(&self) -> StoreResult<MutexGuard<'_, Entries>> {
        let mut entries = self.lock()?;
        if !self.caching {
            *entries = self.load()?;
            self.size.store(entries.len(), Ordering::SeqCst);
        }
        Ok(entries)
    }

    /// Apply `f` to a copy of the view; persist and swap in if it reports a change.
    fn mutate<F>(&self, f: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut Entries) -> bool,
    {
        let mut entries = self.current()?;
        let mut next = entries.clone();
        if !f(&mut next) {
            return Ok(false);
        }
        self.persist(&next)?;
        self.size.store(next.len(), Ordering::SeqCst);
        *entries = next;
        drop(entries);
        self.notifier.touch();
        Ok(true)
    }

    /// Read and parse the slot. Absent or corrupt slots yield an empty view.
    fn load(&self) -> StoreResult<Entries> {
        let Some(name) = &self.name else {
            return Ok(Entries::new());
        };
        match self.backend.read(name)? {
            None => Ok(Entries::new()),
            Some(text) => match Entries::parse(&text) {
                Ok(entries) => Ok(entries),
                Err(err) => {
                    warn!(store = %name, %err, "slot is not a valid pair list, using empty view");
                    Ok(Entries::new())
                }
            },
        }
    }

    fn reload_silently(&self) -> StoreResult<usize> {
        let mut entries = self.lock()?;
        *entries = self.load()?;
        let len = entries.len();
        self.size.store(len, Ordering::SeqCst);
        debug!(store = self.label(), size = len, caching = self.caching, "store hydrated");
        Ok(len)
    }

    fn persist(&self, entries: &Entries) -> StoreResult<()> {
        if let Some(name) = &self.name {
            self.backend.write(name, &entries.to_text()?)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("caching", &self.caching)
            .field("backend", &self.backend.kind())
            .field("size", &self.len())
            .finish()
    }
}

// ── builder ──────────────────────────────────────────────────────────

/// Builder for [`Store`].
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    name: Option<String>,
    caching: bool,
    debounce: Duration,
}

impl StoreBuilder {
    /// Keep the view in memory (default) or re-read the slot on every access.
    pub fn caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Coalescing window for change notifications (default 10 ms).
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Open the store and hydrate it from `backend`.
    ///
    /// A corrupt slot hydrates as empty; a failing backend read is an error.
    pub fn open(self, backend: Arc<dyn Backend>) -> StoreResult<Store> {
        let store = self.build(backend, Entries::new());
        store.reload_silently()?;
        Ok(store)
    }

    fn build(self, backend: Arc<dyn Backend>, entries: Entries) -> Store {
        // Without a slot there is nothing to read through.
        let caching = self.caching || self.name.is_none();
        Store {
            size: AtomicUsize::new(entries.len()),
            entries: Mutex::new(entries),
            name: self.name,
            caching,
            backend,
            notifier: ChangeNotifier::new(self.debounce),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
