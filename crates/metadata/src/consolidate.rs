//! Multi-language consolidation.
//!
//! Merge rules:
//! 1. The base (first) language page is the only source of invariant fields:
//!    code, release date, people, organizations, image and tags.
//! 2. Every other language contributes its title and nothing else.
//! 3. A failed language fetch fails the whole record.

use chrono::NaiveDate;
use henmeta_core::{ExtractedFields, FetchedPage, LanguageCode, TransportError, VideoRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::SearchError;
use crate::dispatch::QueryDispatcher;
use crate::extract::extract;
use crate::tags::TagAdapter;

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Consolidator {
    dispatcher: QueryDispatcher,
    languages: Vec<LanguageCode>,
    tags: TagAdapter,
}

impl Consolidator {
    pub fn new(dispatcher: QueryDispatcher, languages: Vec<LanguageCode>, tags: TagAdapter) -> Self {
        Self {
            dispatcher,
            languages,
            tags,
        }
    }

    /// Build a record from the base-language entry page, fetching the same
    /// entry in every other configured language.
    pub async fn consolidate(
        &self,
        initial: FetchedPage,
        cancel: &CancellationToken,
    ) -> Result<VideoRecord, SearchError> {
        let Some((base, others)) = self.languages.split_first() else {
            return Err(SearchError::Config("no languages configured".into()));
        };

        let ExtractedFields {
            title,
            code,
            category_names,
            performer_names,
            maker_name,
            label_name,
            director_name,
            release_date,
            image_url,
        } = extract(&initial.body);

        let mut record = VideoRecord {
            code: code.to_uppercase(),
            release_date: parse_release_date(&release_date),
            director: director_name,
            maker: maker_name,
            label: label_name,
            image_url,
            ..Default::default()
        };
        record.titles.insert(base.clone(), title);

        for language in others {
            let title = self
                .fetch_title(&initial.final_url, base, language, cancel)
                .await
                .map_err(|source| SearchError::PartialConsolidation {
                    language: language.clone(),
                    source,
                })?;
            record.titles.insert(language.clone(), title);
        }

        // Only after every language succeeded, so a failed record creates no tags
        record.tags = self
            .tags
            .resolve_tags(&category_names, &performer_names, base)
            .await?;

        info!(
            code = %record.code,
            languages = record.titles.len(),
            tags = record.tags.len(),
            "consolidated record"
        );
        Ok(record)
    }

    async fn fetch_title(
        &self,
        base_url: &str,
        base: &LanguageCode,
        language: &LanguageCode,
        cancel: &CancellationToken,
    ) -> Result<String, TransportError> {
        let url = self
            .dispatcher
            .site()
            .localize(base_url, base, language)
            .ok_or_else(|| {
                TransportError::InvalidUrl(format!(
                    "{base_url} has no /{base}/ segment to swap for {language}"
                ))
            })?;

        debug!(language = %language, url = %url, "fetching localized page");
        let page = self.dispatcher.fetch_page(&url, cancel).await?;
        Ok(extract(&page.body).title)
    }
}

fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, RELEASE_DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(raw, error = %e, "unparsable release date");
            None
        }
    }
}
