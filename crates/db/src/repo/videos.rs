use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use henmeta_core::{LanguageCode, TagHandle, VideoRecord};
use sqlx::SqlitePool;

use crate::DbError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persist a record, replacing any stored record with the same code.
/// Returns the row id of the video.
pub async fn save(pool: &SqlitePool, record: &VideoRecord) -> Result<i64, DbError> {
    let now = chrono::Utc::now().timestamp();
    let release_date = record
        .release_date
        .map(|d| d.format(DATE_FORMAT).to_string());

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO video (code, release_date, director, maker, label, image_url, created_ts, updated_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(code) DO UPDATE SET \
           release_date = excluded.release_date, \
           director = excluded.director, \
           maker = excluded.maker, \
           label = excluded.label, \
           image_url = excluded.image_url, \
           updated_ts = excluded.updated_ts",
    )
    .bind(&record.code)
    .bind(&release_date)
    .bind(&record.director)
    .bind(&record.maker)
    .bind(&record.label)
    .bind(&record.image_url)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let (video_id,): (i64,) = sqlx::query_as("SELECT id FROM video WHERE code = ?")
        .bind(&record.code)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM video_title WHERE video_id = ?")
        .bind(video_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM video_tag WHERE video_id = ?")
        .bind(video_id)
        .execute(&mut *tx)
        .await?;

    for (language, title) in &record.titles {
        sqlx::query("INSERT INTO video_title (video_id, language, title) VALUES (?, ?, ?)")
            .bind(video_id)
            .bind(language.as_str())
            .bind(title)
            .execute(&mut *tx)
            .await?;
    }

    for tag in &record.tags {
        sqlx::query("INSERT INTO video_tag (video_id, tag_id) VALUES (?, ?)")
            .bind(video_id)
            .bind(tag.0)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(video_id)
}

pub async fn get_by_code(pool: &SqlitePool, code: &str) -> Result<Option<VideoRecord>, DbError> {
    let row: Option<(i64, String, Option<String>, String, String, String, String)> =
        sqlx::query_as(
            "SELECT id, code, release_date, director, maker, label, image_url \
             FROM video WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(pool)
        .await?;

    let Some((video_id, code, release_date, director, maker, label, image_url)) = row else {
        return Ok(None);
    };

    let release_date = release_date
        .map(|d| {
            NaiveDate::parse_from_str(&d, DATE_FORMAT)
                .map_err(|e| DbError::Corrupt(format!("video {code} release_date {d:?}: {e}")))
        })
        .transpose()?;

    let titles: Vec<(String, String)> =
        sqlx::query_as("SELECT language, title FROM video_title WHERE video_id = ?")
            .bind(video_id)
            .fetch_all(pool)
            .await?;

    let tags: Vec<(i64,)> = sqlx::query_as("SELECT tag_id FROM video_tag WHERE video_id = ?")
        .bind(video_id)
        .fetch_all(pool)
        .await?;

    Ok(Some(VideoRecord {
        code,
        release_date,
        tags: tags.into_iter().map(|(id,)| TagHandle(id)).collect::<BTreeSet<_>>(),
        director,
        maker,
        label,
        image_url,
        titles: titles
            .into_iter()
            .map(|(language, title)| (LanguageCode::new(language), title))
            .collect::<BTreeMap<_, _>>(),
    }))
}

pub async fn count_videos(pool: &SqlitePool) -> Result<i64, DbError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM video")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
