#![allow(clippy::type_complexity)]
pub mod cache;
pub mod config;
pub mod consolidate;
pub mod disambiguate;
pub mod dispatch;
pub mod extract;
pub mod search;
pub mod tags;
pub mod transport;

use henmeta_core::{LanguageCode, ResolverError, TransportError};
use thiserror::Error;

pub use config::{SearchConfig, SiteProfile};
pub use search::{BulkOutcome, CandidateFailure, SearchEngine, SearchOptions, SearchOutcome};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("consolidation failed for language {language}: {source}")]
    PartialConsolidation {
        language: LanguageCode,
        source: TransportError,
    },
    #[error(transparent)]
    TagResolver(#[from] ResolverError),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("config error: {0}")]
    Config(String),
}

impl SearchError {
    /// Language whose fetch broke consolidation, if that is what failed.
    pub fn failed_language(&self) -> Option<&LanguageCode> {
        match self {
            Self::PartialConsolidation { language, .. } => Some(language),
            _ => None,
        }
    }

    /// Stable machine-readable kind, used in bulk failure reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.code(),
            Self::PartialConsolidation { .. } => "partial_consolidation",
            Self::TagResolver(_) => "tag_resolver",
            Self::InvalidOptions(_) => "invalid_options",
            Self::Config(_) => "config",
        }
    }
}
