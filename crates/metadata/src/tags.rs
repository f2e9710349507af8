//! Tag resolution.
//!
//! Performers are open vocabulary: an unknown performer name is created on
//! first sight. Categories are a controlled vocabulary loaded from a
//! dictionary: unknown category names are dropped unless the adapter is told
//! to create them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use henmeta_core::{LanguageCode, ResolverError, TagHandle, TagKind};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

/// Maps tag names to canonical identities.
#[async_trait::async_trait]
pub trait TagResolver: Send + Sync {
    /// Find an existing tag. `Ok(None)` means "not found".
    async fn lookup(
        &self,
        name: &str,
        kind: TagKind,
        language: &LanguageCode,
    ) -> Result<Option<TagHandle>, ResolverError>;

    /// Find an existing tag or create it. Repeated calls with the same name,
    /// kind and language return the same handle.
    async fn get_or_create(
        &self,
        name: &str,
        kind: TagKind,
        language: &LanguageCode,
    ) -> Result<TagHandle, ResolverError>;
}

#[derive(Clone)]
pub struct TagAdapter {
    resolver: Arc<dyn TagResolver>,
    auto_create_categories: bool,
}

impl TagAdapter {
    pub fn new(resolver: Arc<dyn TagResolver>, auto_create_categories: bool) -> Self {
        Self {
            resolver,
            auto_create_categories,
        }
    }

    /// Resolve raw names read from a page in `language` into a tag set.
    pub async fn resolve_tags(
        &self,
        category_names: &[String],
        performer_names: &[String],
        language: &LanguageCode,
    ) -> Result<BTreeSet<TagHandle>, ResolverError> {
        let mut tags = BTreeSet::new();

        for name in unique_names(performer_names) {
            let handle = self
                .resolver
                .get_or_create(name, TagKind::Performer, language)
                .await?;
            tags.insert(handle);
        }

        for name in unique_names(category_names) {
            let handle = if self.auto_create_categories {
                Some(
                    self.resolver
                        .get_or_create(name, TagKind::Category, language)
                        .await?,
                )
            } else {
                self.resolver
                    .lookup(name, TagKind::Category, language)
                    .await?
            };

            match handle {
                Some(handle) => {
                    tags.insert(handle);
                }
                None => debug!(name, language = %language, "unknown category dropped"),
            }
        }

        Ok(tags)
    }
}

/// Trimmed, non-empty names with exact repeats removed. Case folding is
/// left to the resolver.
fn unique_names(names: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(*n))
        .collect()
}

// ─── In-memory resolver ──────────────────────────────────────────────────────

type NameKey = (TagKind, LanguageCode, String);

#[derive(Default)]
struct MemoryInner {
    names: HashMap<NameKey, TagHandle>,
    next_id: i64,
    created: usize,
}

/// Resolver backed by a preloaded dictionary held in memory. Names compare
/// case-insensitively.
#[derive(Default)]
pub struct MemoryTagResolver {
    inner: Mutex<MemoryInner>,
}

impl MemoryTagResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dictionary tag with one spelling per language.
    pub async fn insert(&self, kind: TagKind, names: &[(&str, &str)]) -> TagHandle {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let handle = TagHandle(inner.next_id);
        for (language, name) in names {
            inner
                .names
                .insert(key(name, kind, &LanguageCode::new(language)), handle);
        }
        handle
    }

    /// Number of tags created through `get_or_create` (dictionary inserts
    /// excluded).
    pub async fn created_count(&self) -> usize {
        self.inner.lock().await.created
    }
}

fn key(name: &str, kind: TagKind, language: &LanguageCode) -> NameKey {
    (kind, language.clone(), name.trim().to_lowercase())
}

#[async_trait::async_trait]
impl TagResolver for MemoryTagResolver {
    async fn lookup(
        &self,
        name: &str,
        kind: TagKind,
        language: &LanguageCode,
    ) -> Result<Option<TagHandle>, ResolverError> {
        let inner = self.inner.lock().await;
        Ok(inner.names.get(&key(name, kind, language)).copied())
    }

    async fn get_or_create(
        &self,
        name: &str,
        kind: TagKind,
        language: &LanguageCode,
    ) -> Result<TagHandle, ResolverError> {
        let mut inner = self.inner.lock().await;
        let k = key(name, kind, language);
        if let Some(handle) = inner.names.get(&k) {
            return Ok(*handle);
        }
        inner.next_id += 1;
        inner.created += 1;
        let handle = TagHandle(inner.next_id);
        inner.names.insert(k, handle);
        debug!(name, kind = %kind, language = %language, %handle, "created tag");
        Ok(handle)
    }
}

// ─── SQLite resolver ─────────────────────────────────────────────────────────

/// Resolver backed by the `tag` / `tag_name` tables.
#[derive(Clone)]
pub struct SqliteTagResolver {
    pool: SqlitePool,
}

impl SqliteTagResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn backend(e: henmeta_db::DbError) -> ResolverError {
    ResolverError::Backend(e.to_string())
}

#[async_trait::async_trait]
impl TagResolver for SqliteTagResolver {
    async fn lookup(
        &self,
        name: &str,
        kind: TagKind,
        language: &LanguageCode,
    ) -> Result<Option<TagHandle>, ResolverError> {
        let id = henmeta_db::repo::tags::lookup(&self.pool, name, kind, language.as_str())
            .await
            .map_err(backend)?;
        Ok(id.map(TagHandle))
    }

    async fn get_or_create(
        &self,
        name: &str,
        kind: TagKind,
        language: &LanguageCode,
    ) -> Result<TagHandle, ResolverError> {
        let id = henmeta_db::repo::tags::get_or_create(&self.pool, name, kind, language.as_str())
            .await
            .map_err(backend)?;
        Ok(TagHandle(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en() -> LanguageCode {
        LanguageCode::new("en")
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn performers_are_created_once() {
        let resolver = Arc::new(MemoryTagResolver::new());
        let adapter = TagAdapter::new(resolver.clone(), false);

        let first = adapter
            .resolve_tags(&[], &names(&["Hatano Yui", "hatano yui"]), &en())
            .await
            .unwrap();
        let second = adapter
            .resolve_tags(&[], &names(&["Hatano Yui"]), &en())
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
        assert_eq!(resolver.created_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_categories_are_dropped() {
        let resolver = Arc::new(MemoryTagResolver::new());
        let drama = resolver.insert(TagKind::Category, &[("en", "Drama"), ("ja", "ドラマ")]).await;
        let adapter = TagAdapter::new(resolver.clone(), false);

        let tags = adapter
            .resolve_tags(&names(&["Drama", "Made Up Genre"]), &[], &en())
            .await
            .unwrap();

        assert_eq!(tags, BTreeSet::from([drama]));
        assert_eq!(resolver.created_count().await, 0);
    }

    #[tokio::test]
    async fn categories_can_be_auto_created() {
        let resolver = Arc::new(MemoryTagResolver::new());
        let adapter = TagAdapter::new(resolver.clone(), true);

        let tags = adapter
            .resolve_tags(&names(&["Made Up Genre"]), &[], &en())
            .await
            .unwrap();

        assert_eq!(tags.len(), 1);
        assert_eq!(resolver.created_count().await, 1);
    }

    #[tokio::test]
    async fn dictionary_spellings_share_identity_across_languages() {
        let resolver = Arc::new(MemoryTagResolver::new());
        let drama = resolver.insert(TagKind::Category, &[("en", "Drama"), ("ja", "ドラマ")]).await;
        let adapter = TagAdapter::new(resolver, false);

        let ja = adapter
            .resolve_tags(&names(&["ドラマ"]), &[], &LanguageCode::new("ja"))
            .await
            .unwrap();
        assert_eq!(ja, BTreeSet::from([drama]));
    }

    #[tokio::test]
    async fn tag_set_deduplicates_by_identity() {
        let resolver = Arc::new(MemoryTagResolver::new());
        // A dictionary may map two spellings in one language onto one tag
        let tag = resolver
            .insert(TagKind::Category, &[("en", "Big Tits"), ("en", "Big Breasts")])
            .await;
        let adapter = TagAdapter::new(resolver, false);

        let tags = adapter
            .resolve_tags(&names(&["Big Tits", "Big Breasts"]), &[], &en())
            .await
            .unwrap();
        assert_eq!(tags, BTreeSet::from([tag]));
    }

    /// Case-sensitive resolver that records every name it is asked about.
    #[derive(Default)]
    struct RecordingResolver {
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl TagResolver for RecordingResolver {
        async fn lookup(
            &self,
            name: &str,
            _: TagKind,
            _: &LanguageCode,
        ) -> Result<Option<TagHandle>, ResolverError> {
            self.seen.lock().unwrap().push(name.to_string());
            Ok(None)
        }

        async fn get_or_create(
            &self,
            name: &str,
            _: TagKind,
            _: &LanguageCode,
        ) -> Result<TagHandle, ResolverError> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(name.to_string());
            Ok(TagHandle(seen.len() as i64))
        }
    }

    #[tokio::test]
    async fn names_differing_only_in_case_reach_the_resolver() {
        let resolver = Arc::new(RecordingResolver::default());
        let adapter = TagAdapter::new(resolver.clone(), false);

        let tags = adapter
            .resolve_tags(&[], &names(&["AI", "Ai", " AI ", ""]), &en())
            .await
            .unwrap();

        assert_eq!(*resolver.seen.lock().unwrap(), vec!["AI", "Ai"]);
        assert_eq!(tags.len(), 2);
    }

    struct FailingResolver;

    #[async_trait::async_trait]
    impl TagResolver for FailingResolver {
        async fn lookup(
            &self,
            _: &str,
            _: TagKind,
            _: &LanguageCode,
        ) -> Result<Option<TagHandle>, ResolverError> {
            Err(ResolverError::Backend("down".into()))
        }

        async fn get_or_create(
            &self,
            _: &str,
            _: TagKind,
            _: &LanguageCode,
        ) -> Result<TagHandle, ResolverError> {
            Err(ResolverError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let adapter = TagAdapter::new(Arc::new(FailingResolver), false);
        let err = adapter
            .resolve_tags(&names(&["Drama"]), &[], &en())
            .await
            .unwrap_err();
        assert_eq!(err, ResolverError::Backend("down".into()));
    }

    #[tokio::test]
    async fn sqlite_resolver_is_idempotent() {
        let pool = henmeta_db::connect(":memory:").await.unwrap();
        henmeta_db::migrate::run(&pool).await.unwrap();
        let adapter = TagAdapter::new(Arc::new(SqliteTagResolver::new(pool.clone())), false);

        let first = adapter
            .resolve_tags(&names(&["Unknown"]), &names(&["Ozawa Maria"]), &en())
            .await
            .unwrap();
        let second = adapter
            .resolve_tags(&[], &names(&["Ozawa Maria"]), &en())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(henmeta_db::repo::tags::count_tags(&pool).await.unwrap(), 1);
    }
}
