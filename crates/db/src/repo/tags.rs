//! Tag identities with one spelling per language.
//!
//! A tag is a bare id plus kind; every spelling lives in `tag_name`, keyed by
//! `(kind, language, lowercased name)`. Two spellings in different languages
//! can point at the same tag, which is how preloaded dictionaries map e.g. an
//! English and a Japanese category name onto one identity.

use henmeta_core::TagKind;
use sqlx::SqlitePool;
use tracing::debug;

use crate::DbError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNameRow {
    pub tag_id: i64,
    pub kind: TagKind,
    pub language: String,
    pub name: String,
    pub display_name: String,
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Find the tag a name refers to in the given language, without creating it.
pub async fn lookup(
    pool: &SqlitePool,
    name: &str,
    kind: TagKind,
    language: &str,
) -> Result<Option<i64>, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT tag_id FROM tag_name WHERE kind = ? AND language = ? AND name_key = ?",
    )
    .bind(kind.as_str())
    .bind(language)
    .bind(name_key(name))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

/// Return the tag for a name, creating it (with this single spelling) when missing.
pub async fn get_or_create(
    pool: &SqlitePool,
    name: &str,
    kind: TagKind,
    language: &str,
) -> Result<i64, DbError> {
    if let Some(id) = lookup(pool, name, kind, language).await? {
        return Ok(id);
    }

    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let tag_id = sqlx::query("INSERT INTO tag (kind, created_ts) VALUES (?, ?)")
        .bind(kind.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO tag_name (tag_id, kind, language, name, name_key, display_name) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(tag_id)
    .bind(kind.as_str())
    .bind(language)
    .bind(name.trim())
    .bind(name_key(name))
    .bind(name.trim())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        // Another writer created the spelling between lookup and insert
        tx.rollback().await?;
        return lookup(pool, name, kind, language)
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound));
    }

    tx.commit().await?;
    debug!(tag_id, name, kind = %kind, language, "created tag");
    Ok(tag_id)
}

/// Create a tag from a dictionary entry with one spelling per language.
pub async fn insert_tag(
    pool: &SqlitePool,
    kind: TagKind,
    names: &[(&str, &str)],
) -> Result<i64, DbError> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let tag_id = sqlx::query("INSERT INTO tag (kind, created_ts) VALUES (?, ?)")
        .bind(kind.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for (language, name) in names {
        sqlx::query(
            "INSERT INTO tag_name (tag_id, kind, language, name, name_key, display_name) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(tag_id)
        .bind(kind.as_str())
        .bind(*language)
        .bind(name.trim())
        .bind(name_key(name))
        .bind(name.trim())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(tag_id)
}

/// Attach another spelling to an existing tag. Returns false if the spelling
/// was already taken.
pub async fn add_name(
    pool: &SqlitePool,
    tag_id: i64,
    kind: TagKind,
    language: &str,
    name: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO tag_name (tag_id, kind, language, name, name_key, display_name) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(tag_id)
    .bind(kind.as_str())
    .bind(language)
    .bind(name.trim())
    .bind(name_key(name))
    .bind(name.trim())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// All spellings of a tag, ordered by language.
pub async fn names(pool: &SqlitePool, tag_id: i64) -> Result<Vec<TagNameRow>, DbError> {
    let rows: Vec<(i64, String, String, String, String)> = sqlx::query_as(
        "SELECT tag_id, kind, language, name, display_name FROM tag_name \
         WHERE tag_id = ? ORDER BY language, name",
    )
    .bind(tag_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(tag_id, kind, language, name, display_name)| -> Result<TagNameRow, DbError> {
            let kind = TagKind::parse(&kind)
                .ok_or_else(|| DbError::Corrupt(format!("tag {tag_id} has unknown kind {kind:?}")))?;
            Ok(TagNameRow {
                tag_id,
                kind,
                language,
                name,
                display_name,
            })
        })
        .collect()
}

pub async fn count_tags(pool: &SqlitePool) -> Result<i64, DbError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tag")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = crate::connect(":memory:").await.unwrap();
        crate::migrate::run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let pool = test_pool().await;

        let first = get_or_create(&pool, "Hatano Yui", TagKind::Performer, "en")
            .await
            .unwrap();
        let second = get_or_create(&pool, "hatano yui ", TagKind::Performer, "en")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(count_tags(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn identity_is_scoped_by_kind_and_language() {
        let pool = test_pool().await;

        let en = get_or_create(&pool, "Drama", TagKind::Category, "en").await.unwrap();
        let ja = get_or_create(&pool, "Drama", TagKind::Category, "ja").await.unwrap();
        let star = get_or_create(&pool, "Drama", TagKind::Performer, "en").await.unwrap();

        assert_ne!(en, ja);
        assert_ne!(en, star);
        assert_eq!(count_tags(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn lookup_misses_without_creating() {
        let pool = test_pool().await;

        let found = lookup(&pool, "Unknown Genre", TagKind::Category, "en")
            .await
            .unwrap();
        assert_eq!(found, None);
        assert_eq!(count_tags(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dictionary_tag_resolves_in_every_language() {
        let pool = test_pool().await;

        let id = insert_tag(&pool, TagKind::Category, &[("en", "Affair"), ("ja", "不倫")])
            .await
            .unwrap();

        assert_eq!(
            lookup(&pool, "affair", TagKind::Category, "en").await.unwrap(),
            Some(id)
        );
        assert_eq!(
            lookup(&pool, "不倫", TagKind::Category, "ja").await.unwrap(),
            Some(id)
        );

        assert!(add_name(&pool, id, TagKind::Category, "zh", "婚外情").await.unwrap());
        assert!(!add_name(&pool, id, TagKind::Category, "zh", "婚外情").await.unwrap());

        let spellings = names(&pool, id).await.unwrap();
        let languages: Vec<&str> = spellings.iter().map(|n| n.language.as_str()).collect();
        assert_eq!(languages, vec!["en", "ja", "zh"]);
        assert!(spellings.iter().all(|n| n.kind == TagKind::Category));
    }

    #[tokio::test]
    async fn unknown_stored_kind_is_corrupt() {
        let pool = test_pool().await;
        let id = get_or_create(&pool, "Drama", TagKind::Category, "en").await.unwrap();
        sqlx::query("UPDATE tag_name SET kind = 'studio' WHERE tag_id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        let err = names(&pool, id).await.unwrap_err();
        assert!(matches!(err, DbError::Corrupt(_)));
    }
}
