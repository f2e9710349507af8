//! Field extraction for javlibrary entry pages.
//!
//! Each field has exactly one pattern against the site's markup. Extraction
//! never fails: a field whose pattern does not match comes back empty.

use henmeta_core::ExtractedFields;
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

// <meta property="og:title" content="LOVE-049 Some Title - JAVLibrary" />
// The first token is the code and is dropped.
static RE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta property="og:title" content=".*? (.*) - JAVLibrary" />"#).unwrap()
});

static RE_STAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"vl_star\.php\?s=[a-z0-9]{1,10}" rel="tag">(.{1,20})</a>"#).unwrap()
});

static RE_GENRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"vl_genre\.php\?g=[a-z0-9]+" rel="category tag">(.{1,20})</a>"#).unwrap()
});

static RE_DIRECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"vl_director\.php\?d=[a-z0-9]+" rel="tag">(.{1,20})</a>"#).unwrap()
});

static RE_MAKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"vl_maker\.php\?m=[a-z0-9]+"\srel="tag">(.{1,20})</a>"#).unwrap()
});

static RE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"vl_label\.php\?l=[a-z0-9]+"\srel="tag">(.{1,20})</a>"#).unwrap()
});

// The value cell sits four lines below the `video_date` marker.
static RE_RELEASE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"video_date.*\n.*\n.*\n.*\n.*"text">(.*)</td>"#).unwrap()
});

static RE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"video_jacket_img" src="(//[\w+./-]+)""#).unwrap()
});

static RE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ID:</td>\s+<td class="text">([\w-]+)</td>"#).unwrap()
});

/// Extract every known field from an entry page.
pub fn extract(markup: &str) -> ExtractedFields {
    let fields = ExtractedFields {
        title: first(&RE_TITLE, markup),
        code: first(&RE_CODE, markup),
        category_names: all(&RE_GENRE, markup),
        performer_names: all(&RE_STAR, markup),
        maker_name: first(&RE_MAKER, markup),
        label_name: first(&RE_LABEL, markup),
        director_name: first(&RE_DIRECTOR, markup),
        release_date: first(&RE_RELEASE_DATE, markup),
        image_url: first(&RE_IMAGE, markup),
    };
    log_degraded(&fields);
    fields
}

fn first(re: &Regex, markup: &str) -> String {
    re.captures(markup)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .unwrap_or_default()
}

fn all(re: &Regex, markup: &str) -> Vec<String> {
    re.captures_iter(markup)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .collect()
}

/// Decode the handful of entities the site emits inside names and titles.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn log_degraded(fields: &ExtractedFields) {
    let missing: Vec<&str> = [
        ("title", fields.title.is_empty()),
        ("code", fields.code.is_empty()),
        ("maker", fields.maker_name.is_empty()),
        ("label", fields.label_name.is_empty()),
        ("director", fields.director_name.is_empty()),
        ("release_date", fields.release_date.is_empty()),
        ("image_url", fields.image_url.is_empty()),
    ]
    .into_iter()
    .filter_map(|(name, empty)| empty.then_some(name))
    .collect();

    if !missing.is_empty() {
        trace!(?missing, code = %fields.code, "fields missing from markup");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
