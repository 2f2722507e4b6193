//! Catalog loading and position-based lookup.
//!
//! The catalog is a CSV export with one row per item. Row order matters:
//! the vector index is built in the same order, so an index position maps
//! directly to a row here.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::info;
use vitrine_core::error::{Result, VitrineError};
use vitrine_core::types::CatalogItem;

static BR_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static HTML_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Raw CSV row before normalization. Every cell is optional because catalog
/// exports routinely leave columns blank.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    photos: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Read-only catalog keyed by row position.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    items: Vec<CatalogItem>,
}

impl CatalogStore {
    /// Load a catalog from a CSV file with columns
    /// `title,category,text,price,photos,url`.
    ///
    /// The `photos` cell holds `;`-separated URLs. Markup in `text` is
    /// stripped here so render code never sees it.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| VitrineError::Catalog(format!("Open {}: {}", path.display(), e)))?;

        let mut items = Vec::new();
        for row in reader.deserialize::<RawRow>() {
            let raw = row.map_err(|e| {
                VitrineError::Catalog(format!("Row {} of {}: {}", items.len() + 1, path.display(), e))
            })?;
            items.push(normalize_row(raw));
        }

        info!(count = items.len(), path = %path.display(), "Loaded catalog");
        Ok(Self { items })
    }

    /// Build a store from already-normalized items. Used by tests and by
    /// callers that assemble catalogs programmatically.
    pub fn from_items(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// Look up an item by index position.
    ///
    /// Negative positions are sentinels from the vector index and resolve
    /// to None, as do positions past the end of the catalog.
    pub fn get(&self, position: i64) -> Option<&CatalogItem> {
        let idx = usize::try_from(position).ok()?;
        self.items.get(idx)
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Text encoded into the vector index for one item.
///
/// Concatenates the fields a shopper's query is likely to match.
pub fn embedding_text(item: &CatalogItem) -> String {
    let mut parts: Vec<&str> = vec![&item.title, &item.category, &item.description];
    parts.retain(|p| !p.is_empty());
    parts.join("\n")
}

fn normalize_row(raw: RawRow) -> CatalogItem {
    CatalogItem {
        title: cell(raw.title).unwrap_or_default(),
        category: cell(raw.category).unwrap_or_default(),
        description: clean_html(raw.text.as_deref().unwrap_or("")),
        price: cell(raw.price),
        photos: raw
            .photos
            .as_deref()
            .unwrap_or("")
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect(),
        url: cell(raw.url),
    }
}

/// Trim a cell and drop empty or "nan" placeholders left by exports.
fn cell(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strip HTML from a description cell.
///
/// `<br>` variants become newlines, remaining tags are dropped, and the
/// handful of entities catalog exports actually contain are decoded.
pub fn clean_html(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return String::new();
    }

    let text = BR_TAGS.replace_all(trimmed, "\n");
    let text = HTML_TAGS.replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}
