use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Language segment as used in catalog URLs (`en`, `ja`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Tag vocabulary a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Performer,
    Category,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Performer => "performer",
            Self::Category => "category",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "performer" => Some(Self::Performer),
            "category" => Some(Self::Category),
            _ => None,
        }
    }
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque tag identity handed out by a tag resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagHandle(pub i64);

impl std::fmt::Display for TagHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

/// One transport response: status, URL after redirects, and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub final_url: String,
    pub body: String,
    pub status: u16,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One entry of a multi-match listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCandidate {
    /// Site-relative path of the entry, including the leading slash.
    pub entry_path: String,
    pub code: String,
    pub thumbnail_url: String,
}

/// Raw fields read from a single entry page. Missing fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: String,
    pub code: String,
    pub category_names: Vec<String>,
    pub performer_names: Vec<String>,
    pub maker_name: String,
    pub label_name: String,
    pub director_name: String,
    pub release_date: String,
    pub image_url: String,
}

/// Canonical metadata for one catalog entry across all configured languages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub code: String,
    pub release_date: Option<NaiveDate>,
    pub tags: BTreeSet<TagHandle>,
    pub director: String,
    pub maker: String,
    pub label: String,
    pub image_url: String,
    pub titles: BTreeMap<LanguageCode, String>,
}

impl VideoRecord {
    pub fn title(&self, language: &LanguageCode) -> Option<&str> {
        self.titles.get(language).map(String::as_str)
    }
}
