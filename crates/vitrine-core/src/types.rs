use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Pipeline stage at which a search attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
    /// Encoding the query text into a vector.
    Embedding,
    /// Nearest-neighbour lookup against the catalog index.
    Index,
}

impl SearchStage {
    /// Stable lowercase name used in logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            SearchStage::Embedding => "embedding",
            SearchStage::Index => "index",
        }
    }
}

/// Outcome of moving the result cursor by one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStep {
    /// Cursor moved to an adjacent result.
    Moved,
    /// Cursor was already on the first result. Nothing changed.
    AtLowerBound,
    /// Cursor was already on the last result. Nothing changed.
    AtUpperBound,
}

/// Outcome of a search pipeline run that completed without error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// At least one catalog item matched the query.
    Found(ResultSet),
    /// The pipeline ran to completion but nothing matched.
    NoResults,
}

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Opaque conversation identity assigned by the chat transport.
///
/// Compared by value only. The engine never parses or interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

/// Identifier of a message already delivered to a conversation.
///
/// Needed to edit a delivered message in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in seconds since epoch.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Renders as `YYYY-MM-DD HH:MM:SS` in UTC, the format report rows use.
    pub fn format_human(&self) -> String {
        self.to_datetime().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// =============================================================================
// Entity Structs (defined in vitrine-core for shared use)
// =============================================================================

/// A single sellable item loaded from the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub title: String,
    pub category: String,
    /// Description text with markup already stripped at load time.
    pub description: String,
    /// Display price. None when the source cell was empty.
    pub price: Option<String>,
    /// Photo URLs in display order.
    pub photos: Vec<String>,
    /// Product page URL, if the item has one.
    pub url: Option<String>,
}

impl CatalogItem {
    /// First photo URL, used as the card image.
    pub fn primary_photo(&self) -> Option<&str> {
        self.photos.first().map(|p| p.as_str())
    }
}

/// An ordered page of search results with a cursor over them.
///
/// Invariant: never empty, and the cursor always points at a valid index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    items: Vec<CatalogItem>,
    cursor: usize,
}

impl ResultSet {
    /// Builds a result set positioned on the first item.
    pub fn new(items: Vec<CatalogItem>) -> std::result::Result<Self, &'static str> {
        if items.is_empty() {
            return Err("ResultSet requires at least one item");
        }
        Ok(Self { items, cursor: 0 })
    }

    /// The item under the cursor.
    pub fn current(&self) -> &CatalogItem {
        &self.items[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// All matched items in rank order.
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Moves to the next result. On the last item the cursor stays put.
    pub fn advance(&mut self) -> PageStep {
        if self.cursor + 1 >= self.items.len() {
            PageStep::AtUpperBound
        } else {
            self.cursor += 1;
            PageStep::Moved
        }
    }

    /// Moves to the previous result. On the first item the cursor stays put.
    pub fn retreat(&mut self) -> PageStep {
        if self.cursor == 0 {
            PageStep::AtLowerBound
        } else {
            self.cursor -= 1;
            PageStep::Moved
        }
    }

    /// Returns the cursor to the first item.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// A completed problem report collected from one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemReport {
    pub name: String,
    pub contact: String,
    pub problem: String,
    pub submitted_at: Timestamp,
}

impl ProblemReport {
    /// Stamps the report with the current time.
    pub fn new(name: String, contact: String, problem: String) -> Self {
        Self {
            name,
            contact,
            problem,
            submitted_at: Timestamp::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
