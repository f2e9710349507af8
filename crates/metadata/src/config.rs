//! Engine configuration.
//!
//! Defaults target the javlibrary site with English as the base language and
//! Japanese as the second title language. Every value can be overridden from
//! `HENMETA_*` environment variables.

use henmeta_core::LanguageCode;
use reqwest::Url;

use crate::SearchError;

pub const DEFAULT_SITE_ROOT: &str = "http://www.javlibrary.com";

/// URL layout of the catalog site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    /// Scheme and host, without a trailing slash.
    pub root: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_ROOT)
    }
}

impl SiteProfile {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// Search-by-id URL for a code in one language.
    pub fn search_url(&self, language: &LanguageCode, code: &str) -> Result<String, SearchError> {
        let base = format!("{}/{}/vl_searchbyid.php", self.root, language);
        Url::parse_with_params(&base, &[("keyword", code)])
            .map(String::from)
            .map_err(|e| SearchError::Config(format!("invalid search url {base}: {e}")))
    }

    /// Prefix of every URL the site lands on when a search did not resolve to
    /// exactly one entry.
    pub fn listing_prefix(&self, language: &LanguageCode) -> String {
        format!("{}/{}/vl_search", self.root, language)
    }

    /// Direct URL of an entry from its site-relative path.
    pub fn entry_url(&self, language: &LanguageCode, entry_path: &str) -> String {
        format!("{}/{}{}", self.root, language, entry_path)
    }

    pub fn is_listing(&self, final_url: &str, language: &LanguageCode) -> bool {
        strip_scheme(final_url).starts_with(strip_scheme(&self.listing_prefix(language)))
    }

    /// Rewrite the language segment of an entry URL. The segment follows the
    /// root's own path, so `https://mirror/jav/en/...` becomes
    /// `https://mirror/jav/ja/...`. Returns `None` when the URL does not start
    /// with the `from` segment under the root.
    pub fn localize(&self, url: &str, from: &LanguageCode, to: &LanguageCode) -> Option<String> {
        let mut parsed = Url::parse(url).ok()?;
        let root_path = self.root_path();
        let path = parsed.path().to_string();
        let rest = path
            .strip_prefix(root_path.as_str())?
            .strip_prefix(&format!("/{from}"))?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        parsed.set_path(&format!("{root_path}/{to}{rest}"));
        Some(parsed.into())
    }

    /// Path component of the root without a trailing slash; empty for a bare host.
    fn root_path(&self) -> String {
        Url::parse(&self.root)
            .map(|u| u.path().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map(|(_, rest)| rest).unwrap_or(url)
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("henmeta/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_redirects: 10,
        }
    }
}

/// Response cache settings. `max_entries = 0` disables the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub site: SiteProfile,
    /// Title languages in visiting order. The first one is the base language
    /// and the only source of invariant fields.
    pub languages: Vec<LanguageCode>,
    pub auto_create_categories: bool,
    pub max_concurrency: usize,
    pub http: HttpConfig,
    pub cache: CacheConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            site: SiteProfile::default(),
            languages: vec![LanguageCode::new("en"), LanguageCode::new("ja")],
            auto_create_categories: false,
            max_concurrency: 4,
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Build a config from defaults overridden by `HENMETA_*` variables.
    pub fn from_env() -> Result<Self, SearchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SearchConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SearchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(root) = lookup("HENMETA_SITE_ROOT") {
            config.site = SiteProfile::new(root);
        }
        if let Some(langs) = lookup("HENMETA_LANGUAGES") {
            config.languages = langs
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(LanguageCode::new)
                .collect();
        }
        if let Some(v) = lookup("HENMETA_AUTO_CREATE_CATEGORIES") {
            config.auto_create_categories = parse_bool("HENMETA_AUTO_CREATE_CATEGORIES", &v)?;
        }
        if let Some(v) = lookup("HENMETA_MAX_CONCURRENCY") {
            config.max_concurrency = parse_num("HENMETA_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("HENMETA_USER_AGENT") {
            config.http.user_agent = v;
        }
        if let Some(v) = lookup("HENMETA_HTTP_TIMEOUT_SECS") {
            config.http.timeout_secs = parse_num("HENMETA_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("HENMETA_CACHE_ENTRIES") {
            config.cache.max_entries = parse_num("HENMETA_CACHE_ENTRIES", &v)?;
        }
        if let Some(v) = lookup("HENMETA_CACHE_TTL_SECS") {
            config.cache.ttl_secs = parse_num("HENMETA_CACHE_TTL_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.languages.is_empty() {
            return Err(SearchError::Config("at least one language is required".into()));
        }
        for (i, lang) in self.languages.iter().enumerate() {
            if lang.as_str().is_empty() || lang.as_str().contains('/') {
                return Err(SearchError::Config(format!("invalid language {lang:?}")));
            }
            if self.languages[..i].contains(lang) {
                return Err(SearchError::Config(format!("duplicate language {lang}")));
            }
        }
        if self.max_concurrency == 0 {
            return Err(SearchError::Config("max_concurrency must be at least 1".into()));
        }
        Url::parse(&self.site.root)
            .map_err(|e| SearchError::Config(format!("invalid site root {}: {e}", self.site.root)))?;
        Ok(())
    }

    pub fn base_language(&self) -> &LanguageCode {
        &self.languages[0]
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SearchError> {
    value
        .trim()
        .parse()
        .map_err(|_| SearchError::Config(format!("{key}: expected a number, got {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SearchError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SearchError::Config(format!(
            "{key}: expected a boolean, got {value:?}"
        ))),
    }
}
