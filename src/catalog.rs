use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use crate::model::{CatalogRecord, QueueEntry};

/// Source of queue rows that have not been marked deprecated.
pub trait QueueSource {
    fn get_pending_entries(&self) -> Result<Vec<QueueEntry>>;
}

/// Persisted catalog plus the queue mutations the sync writer performs.
///
/// Every write is keyed by `movie_id`, so repeating a call is harmless.
pub trait Catalog {
    fn get_known_ids(&self) -> Result<HashSet<String>>;
    /// All-or-nothing: `Ok` confirms every record in `records`.
    fn upsert(&self, records: &[CatalogRecord]) -> Result<()>;
    fn delete_entries(&self, ids: &[String]) -> Result<()>;
    fn mark_deprecated(&self, ids: &[String]) -> Result<()>;
}

/// Read-through cache over [`Catalog::get_known_ids`].
///
/// The first read loads from the catalog. Later reads are served from memory
/// until [`KnownIdCache::invalidate`] is called.
#[derive(Debug, Default)]
pub struct KnownIdCache {
    ids: Mutex<Option<Arc<HashSet<String>>>>,
}

impl KnownIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known_ids<C: Catalog + ?Sized>(&self, catalog: &C) -> Result<Arc<HashSet<String>>> {
        let mut guard = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ids) = guard.as_ref() {
            return Ok(Arc::clone(ids));
        }
        let ids = Arc::new(catalog.get_known_ids()?);
        debug!("Loaded {} known movie ids", ids.len());
        *guard = Some(Arc::clone(&ids));
        Ok(ids)
    }

    pub fn invalidate(&self) {
        let mut guard = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    #[cfg(test)]
    pub fn is_loaded(&self) -> bool {
        self.ids
            .lock()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::model::ContentType;

    fn record(id: &str) -> CatalogRecord {
        CatalogRecord {
            movie_id: id.into(),
            url: format!("/film/{id}/"),
            title: id.into(),
            content_type: ContentType::Movie,
            release_year: 2000,
            runtime_minutes: 90,
            rating: 3.5,
            rating_count: 10,
            genre_bitmask: 0,
            country_code: 0,
            poster_url: String::new(),
        }
    }

    #[test]
    fn cache_reads_through_once() {
        let store = MemoryStore::default();
        let cache = KnownIdCache::new();
        assert!(!cache.is_loaded());

        cache.known_ids(&store).unwrap();
        cache.known_ids(&store).unwrap();
        assert_eq!(store.known_id_reads.get(), 1);
        assert!(cache.is_loaded());
    }

    #[test]
    fn invalidate_forces_a_fresh_read() {
        let store = MemoryStore::default();
        let cache = KnownIdCache::new();
        assert!(cache.known_ids(&store).unwrap().is_empty());

        store.upsert(&[record("7")]).unwrap();
        assert!(cache.known_ids(&store).unwrap().is_empty());

        cache.invalidate();
        assert!(cache.known_ids(&store).unwrap().contains("7"));
        assert_eq!(store.known_id_reads.get(), 2);
    }
}
