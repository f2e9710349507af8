//! Caller-facing search API.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use henmeta_core::{FetchedPage, LanguageCode, SearchCandidate, TransportError, VideoRecord};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::SearchError;
use crate::config::SearchConfig;
use crate::consolidate::Consolidator;
use crate::disambiguate::{Classification, Disambiguator};
use crate::dispatch::QueryDispatcher;
use crate::tags::{TagAdapter, TagResolver};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// How many candidates of an ambiguous result to process when
    /// `return_multi` is set. Must be at least 1.
    pub top_n: usize,
    pub return_multi: bool,
    pub exact_match_only: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_n: 5,
            return_multi: false,
            exact_match_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Record(VideoRecord),
    Records(BulkOutcome),
    NoMatch,
    /// Unresolved candidates, in listing order.
    Ambiguous(Vec<SearchCandidate>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkOutcome {
    /// Consolidated records, in candidate order.
    pub records: Vec<VideoRecord>,
    pub failures: Vec<CandidateFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFailure {
    pub candidate: SearchCandidate,
    pub error: SearchError,
}

#[derive(Serialize)]
struct FailureView<'a> {
    code: &'a str,
    kind: &'static str,
    error: String,
}

impl BulkOutcome {
    /// Failures as `{ code, kind, error }` objects for reporting.
    pub fn failure_summary(&self) -> serde_json::Value {
        let view: Vec<FailureView<'_>> = self
            .failures
            .iter()
            .map(|f| FailureView {
                code: &f.candidate.code,
                kind: f.error.code(),
                error: f.error.to_string(),
            })
            .collect();
        serde_json::to_value(view).unwrap_or_default()
    }
}

/// Ties dispatch, disambiguation and consolidation together for one site.
pub struct SearchEngine {
    config: SearchConfig,
    dispatcher: QueryDispatcher,
    consolidator: Consolidator,
}

impl SearchEngine {
    pub fn new(
        config: SearchConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn TagResolver>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let dispatcher = QueryDispatcher::new(transport, config.site.clone());
        let consolidator = Consolidator::new(
            dispatcher.clone(),
            config.languages.clone(),
            TagAdapter::new(resolver, config.auto_create_categories),
        );
        Ok(Self {
            config,
            dispatcher,
            consolidator,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(
        &self,
        code: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SearchError::InvalidOptions("code must not be empty".into()));
        }
        if options.top_n == 0 {
            return Err(SearchError::InvalidOptions("top_n must be at least 1".into()));
        }

        let base = self.config.base_language();
        let page = self.dispatcher.search_by_code(code, base, cancel).await?;
        let disambiguator = Disambiguator::new(self.dispatcher.clone(), base.clone());

        let classification = disambiguator
            .classify(code, page, options.exact_match_only, cancel)
            .await
            .map_err(|e| cancelled_after_search(e, base))?;

        match classification {
            Classification::Single(entry) => {
                let record = self.consolidate_entry(entry, code, cancel).await?;
                if options.return_multi {
                    return Ok(SearchOutcome::Records(BulkOutcome {
                        records: vec![record],
                        failures: Vec::new(),
                    }));
                }
                Ok(SearchOutcome::Record(record))
            }
            Classification::NoMatch => {
                info!(code, "no match");
                Ok(SearchOutcome::NoMatch)
            }
            Classification::Multi(candidates) if options.return_multi => {
                info!(code, candidates = candidates.len(), top_n = options.top_n, "processing candidates");
                let outcome = self
                    .process_candidates(candidates, options.top_n, cancel)
                    .await;
                Ok(SearchOutcome::Records(outcome))
            }
            Classification::Multi(candidates) => {
                info!(code, candidates = candidates.len(), "ambiguous");
                Ok(SearchOutcome::Ambiguous(candidates))
            }
        }
    }

    /// Fetch and consolidate the first `top_n` candidates. Failures are
    /// collected per candidate and never abort the others.
    pub async fn process_candidates(
        &self,
        candidates: Vec<SearchCandidate>,
        top_n: usize,
        cancel: &CancellationToken,
    ) -> BulkOutcome {
        let results: Vec<(SearchCandidate, Result<VideoRecord, SearchError>)> =
            stream::iter(candidates.into_iter().take(top_n))
                .map(|candidate| async move {
                    let result = self.process_candidate(&candidate, cancel).await;
                    (candidate, result)
                })
                .buffered(self.config.max_concurrency)
                .collect()
                .await;

        let mut outcome = BulkOutcome::default();
        for (candidate, result) in results {
            match result {
                Ok(record) => outcome.records.push(record),
                Err(error) => {
                    warn!(code = %candidate.code, error = %error, "candidate failed");
                    outcome.failures.push(CandidateFailure { candidate, error });
                }
            }
        }
        outcome
    }

    async fn process_candidate(
        &self,
        candidate: &SearchCandidate,
        cancel: &CancellationToken,
    ) -> Result<VideoRecord, SearchError> {
        let url = self
            .dispatcher
            .site()
            .entry_url(self.config.base_language(), &candidate.entry_path);
        let entry = self
            .dispatcher
            .fetch_page(&url, cancel)
            .await
            .map_err(|e| {
                cancelled_after_search(SearchError::Transport(e), self.config.base_language())
            })?;
        self.consolidate_entry(entry, &candidate.code, cancel).await
    }

    async fn consolidate_entry(
        &self,
        entry: FetchedPage,
        fallback_code: &str,
        cancel: &CancellationToken,
    ) -> Result<VideoRecord, SearchError> {
        let mut record = self.consolidator.consolidate(entry, cancel).await?;
        if record.code.is_empty() {
            record.code = fallback_code.to_uppercase();
        }
        Ok(record)
    }
}

/// Once the search page has been fetched, cancellation leaves the record
/// unfinished in the base language rather than never started.
fn cancelled_after_search(error: SearchError, base: &LanguageCode) -> SearchError {
    match error {
        SearchError::Transport(TransportError::Cancelled) => SearchError::PartialConsolidation {
            language: base.clone(),
            source: TransportError::Cancelled,
        },
        other => other,
    }
}
