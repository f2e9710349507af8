//! Bounded, TTL'd response cache layered over another transport.
//!
//! Only successful responses are cached. When full, the oldest entry is
//! evicted. Expired entries are dropped lazily on access and on insert.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use henmeta_core::{FetchedPage, TransportError};
use tokio::sync::Mutex;
use tracing::trace;

use crate::config::CacheConfig;
use crate::transport::Transport;

pub struct CachingTransport<T> {
    inner: T,
    entries: Mutex<HashMap<String, (Instant, FetchedPage)>>,
    max_entries: usize,
    ttl: Duration,
}

impl<T: Transport> CachingTransport<T> {
    pub fn new(inner: T, config: &CacheConfig) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            max_entries: config.max_entries,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    async fn get_fresh(&self, url: &str) -> Option<FetchedPage> {
        let mut entries = self.entries.lock().await;
        let cached = entries
            .get(url)
            .map(|(stored, page)| (stored.elapsed() < self.ttl, page.clone()));
        match cached {
            Some((true, page)) => Some(page),
            Some((false, _)) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    async fn store(&self, url: &str, page: &FetchedPage) {
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, (stored, _)| stored.elapsed() < ttl);

        if entries.len() >= self.max_entries && !entries.contains_key(url) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored, _))| *stored)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }
        entries.insert(url.to_string(), (Instant::now(), page.clone()));
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for CachingTransport<T> {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError> {
        if self.max_entries == 0 {
            return self.inner.fetch(url).await;
        }

        if let Some(page) = self.get_fresh(url).await {
            trace!(url = %url, "cache hit");
            return Ok(page);
        }

        let page = self.inner.fetch(url).await?;
        if page.is_success() {
            self.store(url, &page).await;
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FixtureTransport;

    fn config(max_entries: usize, ttl_secs: u64) -> CacheConfig {
        CacheConfig {
            max_entries,
            ttl_secs,
        }
    }

    #[tokio::test]
    async fn repeated_fetch_hits_cache() {
        let inner = FixtureTransport::new().with_page("http://a.test/1", "one");
        let cache = CachingTransport::new(inner, &config(8, 60));

        cache.fetch("http://a.test/1").await.unwrap();
        let page = cache.fetch("http://a.test/1").await.unwrap();

        assert_eq!(page.body, "one");
        assert_eq!(cache.inner().requests().len(), 1);

        cache.clear().await;
        cache.fetch("http://a.test/1").await.unwrap();
        assert_eq!(cache.inner().requests().len(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let inner = FixtureTransport::new();
        let cache = CachingTransport::new(inner, &config(8, 60));

        assert_eq!(cache.fetch("http://a.test/missing").await.unwrap().status, 404);
        cache.fetch("http://a.test/missing").await.unwrap();

        assert_eq!(cache.inner().requests().len(), 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn oldest_entry_is_evicted_when_full() {
        let inner = FixtureTransport::new()
            .with_page("http://a.test/1", "one")
            .with_page("http://a.test/2", "two")
            .with_page("http://a.test/3", "three");
        let cache = CachingTransport::new(inner, &config(2, 60));

        cache.fetch("http://a.test/1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.fetch("http://a.test/2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.fetch("http://a.test/3").await.unwrap();
        assert_eq!(cache.len().await, 2);

        // 1 was evicted, so it goes back to the inner transport
        cache.fetch("http://a.test/1").await.unwrap();
        assert_eq!(cache.inner().requests().len(), 4);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let inner = FixtureTransport::new().with_page("http://a.test/1", "one");
        let cache = CachingTransport::new(inner, &config(8, 0));

        cache.fetch("http://a.test/1").await.unwrap();
        cache.fetch("http://a.test/1").await.unwrap();
        assert_eq!(cache.inner().requests().len(), 2);
    }

    #[tokio::test]
    async fn zero_capacity_disables_cache() {
        let inner = FixtureTransport::new().with_page("http://a.test/1", "one");
        let cache = CachingTransport::new(inner, &config(0, 60));

        cache.fetch("http://a.test/1").await.unwrap();
        cache.fetch("http://a.test/1").await.unwrap();
        assert_eq!(cache.inner().requests().len(), 2);
    }
}
