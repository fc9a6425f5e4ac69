//! Whitelist guard: the permit/deny gate consulted before every dispatch.
//!
//! Decisions are cached per `(subject, category)`. The cache lock is only
//! held to read or update the map, never across a storage call. A lookup
//! records the cache generation before going to the store and only caches
//! its answer if the generation is unchanged; grant and revoke bump the
//! generation after the store changed, so a lookup racing them can never
//! re-populate the cache with the old answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use snojobs_core::validation::validate_identifier;
use snojobs_db::models::job::Job;
use snojobs_db::models::whitelist::WhitelistEntry;
use snojobs_db::store::WhitelistStore;
use snojobs_db::Storage;
use tokio::sync::Mutex;

use crate::error::{timed, OrchestratorResult};

type CacheKey = (String, String);

#[derive(Default)]
struct DecisionCache {
    generation: u64,
    entries: HashMap<CacheKey, bool>,
}

pub struct WhitelistGuard {
    store: Arc<dyn Storage>,
    timeout: Duration,
    capacity: usize,
    cache: Mutex<DecisionCache>,
}

impl WhitelistGuard {
    /// `capacity == 0` disables caching.
    pub fn new(store: Arc<dyn Storage>, timeout: Duration, capacity: usize) -> Self {
        Self {
            store,
            timeout,
            capacity,
            cache: Mutex::new(DecisionCache::default()),
        }
    }

    /// Whether `subject` may dispatch `job`. Unknown subjects are denied.
    pub async fn authorize(&self, subject: &str, job: &Job) -> OrchestratorResult<bool> {
        self.is_permitted(subject, &job.category).await
    }

    /// Exact-match lookup of `(subject, category)`.
    pub async fn is_permitted(&self, subject: &str, category: &str) -> OrchestratorResult<bool> {
        if self.capacity == 0 {
            return self.lookup(subject, category).await;
        }

        let key = (subject.to_string(), category.to_string());
        let generation = {
            let cache = self.cache.lock().await;
            if let Some(&permitted) = cache.entries.get(&key) {
                return Ok(permitted);
            }
            cache.generation
        };

        let permitted = self.lookup(subject, category).await?;

        let mut cache = self.cache.lock().await;
        if cache.generation == generation {
            if cache.entries.len() >= self.capacity {
                tracing::debug!(entries = cache.entries.len(), "Whitelist cache full, clearing");
                cache.entries.clear();
            }
            cache.entries.insert(key, permitted);
        }
        Ok(permitted)
    }

    /// Authorize `subject` for `category`. Granting twice is a no-op.
    pub async fn grant(&self, subject: &str, category: &str) -> OrchestratorResult<WhitelistEntry> {
        validate_identifier("Subject", subject)?;
        validate_identifier("Category", category)?;

        let (entry, created) =
            timed(self.timeout, self.store.insert_entry(subject, category)).await?;
        self.invalidate(subject, category).await;

        if created {
            tracing::info!(subject, category, "Whitelist entry granted");
        }
        Ok(entry)
    }

    /// Withdraw `subject`'s access to `category`. Returns `true` if an entry
    /// was removed.
    pub async fn revoke(&self, subject: &str, category: &str) -> OrchestratorResult<bool> {
        let removed = timed(self.timeout, self.store.delete_entry(subject, category)).await?;
        self.invalidate(subject, category).await;

        if removed {
            tracing::info!(subject, category, "Whitelist entry revoked");
        }
        Ok(removed)
    }

    pub async fn list_entries(
        &self,
        subject: Option<&str>,
    ) -> OrchestratorResult<Vec<WhitelistEntry>> {
        timed(self.timeout, self.store.find_entries(subject)).await
    }

    async fn lookup(&self, subject: &str, category: &str) -> OrchestratorResult<bool> {
        let entry = timed(self.timeout, self.store.find_entry(subject, category)).await?;
        Ok(entry.is_some())
    }

    async fn invalidate(&self, subject: &str, category: &str) {
        let mut cache = self.cache.lock().await;
        cache.generation += 1;
        cache
            .entries
            .remove(&(subject.to_string(), category.to_string()));
    }

    #[cfg(test)]
    async fn cached_len(&self) -> usize {
        self.cache.lock().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use snojobs_core::error::CoreError;
    use snojobs_db::MemoryStore;

    use super::*;
    use crate::error::OrchestratorError;

    fn guard(capacity: usize) -> (Arc<MemoryStore>, WhitelistGuard) {
        let store = Arc::new(MemoryStore::new());
        let guard = WhitelistGuard::new(store.clone(), Duration::from_secs(1), capacity);
        (store, guard)
    }

    #[tokio::test]
    async fn unknown_subject_is_denied() {
        let (_, guard) = guard(16);
        assert!(!guard.is_permitted("userX", "restricted").await.unwrap());
    }

    #[tokio::test]
    async fn grant_and_revoke_take_effect_immediately() {
        let (_, guard) = guard(16);

        // Prime the cache with a denial.
        assert!(!guard.is_permitted("alice", "authoring").await.unwrap());

        guard.grant("alice", "authoring").await.unwrap();
        assert!(guard.is_permitted("alice", "authoring").await.unwrap());

        assert!(guard.revoke("alice", "authoring").await.unwrap());
        assert!(!guard.is_permitted("alice", "authoring").await.unwrap());
        assert!(!guard.revoke("alice", "authoring").await.unwrap());
    }

    #[tokio::test]
    async fn grant_is_idempotent() {
        let (_, guard) = guard(16);
        let first = guard.grant("alice", "authoring").await.unwrap();
        let second = guard.grant("alice", "authoring").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(guard.list_entries(Some("alice")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn category_match_is_exact() {
        let (_, guard) = guard(16);
        guard.grant("alice", "authoring").await.unwrap();
        assert!(!guard.is_permitted("alice", "Authoring").await.unwrap());
        assert!(!guard.is_permitted("alice", "reporting").await.unwrap());
    }

    #[tokio::test]
    async fn cache_is_cleared_when_full() {
        let (_, guard) = guard(2);
        guard.is_permitted("a", "x").await.unwrap();
        guard.is_permitted("b", "x").await.unwrap();
        assert_eq!(guard.cached_len().await, 2);

        guard.is_permitted("c", "x").await.unwrap();
        assert_eq!(guard.cached_len().await, 1);
    }

    #[tokio::test]
    async fn direct_store_changes_are_masked_by_cache() {
        // Only grant/revoke invalidate; out-of-band writes wait for eviction.
        let (store, guard) = guard(16);
        assert!(!guard.is_permitted("alice", "authoring").await.unwrap());
        store.insert_entry("alice", "authoring").await.unwrap();
        assert!(!guard.is_permitted("alice", "authoring").await.unwrap());

        let uncached = WhitelistGuard::new(store, Duration::from_secs(1), 0);
        assert!(uncached.is_permitted("alice", "authoring").await.unwrap());
    }

    #[tokio::test]
    async fn blank_subject_rejected() {
        let (_, guard) = guard(16);
        assert_matches!(
            guard.grant("  ", "authoring").await,
            Err(OrchestratorError::Core(CoreError::Validation(_)))
        );
    }
}
