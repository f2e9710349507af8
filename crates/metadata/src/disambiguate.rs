//! Search-result disambiguation.
//!
//! The site redirects a search straight to the entry page when it has exactly
//! one hit. Otherwise it stays on a listing page whose body holds zero or more
//! candidates. Listings often contain stale or near-duplicate entries, so an
//! exact code match is tried before handing the list back to the caller.

use henmeta_core::{FetchedPage, LanguageCode, SearchCandidate};
use regex::Regex;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::SearchError;
use crate::dispatch::QueryDispatcher;

// <a href="./?v=javlikd6ma" title="..."><div class="id">LOVE-049</div><img src="//pics...jpg"
static RE_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"f="\.([^"]*)" title.*?<div class="id">([\w-]*)</div><img src="(//[\w+./-]+)"#)
        .unwrap()
});

/// Outcome of classifying a search response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The entry page of the single matching entry.
    Single(FetchedPage),
    /// Candidates the caller has to choose from, in listing order.
    Multi(Vec<SearchCandidate>),
    NoMatch,
}

/// Result of the tie-break over a parsed candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    NoMatch,
    One(SearchCandidate),
    Many(Vec<SearchCandidate>),
}

/// All candidate triples of a listing page, in document order.
pub fn parse_candidates(body: &str) -> Vec<SearchCandidate> {
    RE_CANDIDATE
        .captures_iter(body)
        .map(|c| SearchCandidate {
            entry_path: c[1].to_string(),
            code: c[2].to_string(),
            thumbnail_url: c[3].to_string(),
        })
        .collect()
}

/// Apply the tie-break policy. With `exact_match_only`, candidates whose code
/// equals `code` (case-sensitive) win; if none does, the full list is
/// returned unchanged.
pub fn select_candidates(
    code: &str,
    candidates: Vec<SearchCandidate>,
    exact_match_only: bool,
) -> Selection {
    if candidates.is_empty() {
        return Selection::NoMatch;
    }

    let mut remaining: Vec<SearchCandidate> = if exact_match_only {
        candidates.iter().filter(|c| c.code == code).cloned().collect()
    } else {
        candidates.clone()
    };

    match remaining.len() {
        1 => Selection::One(remaining.remove(0)),
        0 => Selection::Many(candidates),
        _ => Selection::Many(remaining),
    }
}

pub struct Disambiguator {
    dispatcher: QueryDispatcher,
    language: LanguageCode,
}

impl Disambiguator {
    /// `language` is the language the search was run in.
    pub fn new(dispatcher: QueryDispatcher, language: LanguageCode) -> Self {
        Self {
            dispatcher,
            language,
        }
    }

    pub async fn classify(
        &self,
        code: &str,
        page: FetchedPage,
        exact_match_only: bool,
        cancel: &CancellationToken,
    ) -> Result<Classification, SearchError> {
        let site = self.dispatcher.site();
        if !site.is_listing(&page.final_url, &self.language) {
            debug!(code, url = %page.final_url, "search landed on entry page");
            return Ok(Classification::Single(page));
        }

        let candidates = parse_candidates(&page.body);
        debug!(code, url = %page.final_url, candidates = candidates.len(), "search landed on listing");

        match select_candidates(code, candidates, exact_match_only) {
            Selection::NoMatch => Ok(Classification::NoMatch),
            Selection::One(candidate) => {
                let url = site.entry_url(&self.language, &candidate.entry_path);
                debug!(code, candidate = %candidate.code, url = %url, "resolved to single candidate");
                let entry = self.dispatcher.fetch_page(&url, cancel).await?;
                Ok(Classification::Single(entry))
            }
            Selection::Many(candidates) => Ok(Classification::Multi(candidates)),
        }
    }
}
