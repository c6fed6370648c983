//! Tag ledger entries and tag normalization

use serde::{Deserialize, Serialize};

use crate::identity::Timestamp;

/// Maximum length of a tag value, in characters.
pub const MAX_TAG_LENGTH: usize = 50;

/// High code point appended to a prefix to form the exclusive upper bound of
/// a prefix range scan.
pub const TAG_PREFIX_SENTINEL: char = '\u{f8ff}';

/// Ledger entry: how often a normalized tag value has been used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub value: String,
    pub count: u64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl Tag {
    /// First use of a tag.
    pub fn first_use(value: impl Into<String>, now: Timestamp) -> Self {
        Self {
            value: value.into(),
            count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The same entry with one more use recorded.
    pub fn incremented(&self, now: Timestamp) -> Self {
        Self {
            value: self.value.clone(),
            count: self.count.saturating_add(1),
            created_at: self.created_at,
            updated_at: now,
        }
    }
}

/// Trim and lower-case a raw tag value. Returns `None` for blank input.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Exclusive upper bound for values starting with `prefix`.
pub fn prefix_upper_bound(prefix: &str) -> String {
    let mut bound = String::with_capacity(prefix.len() + TAG_PREFIX_SENTINEL.len_utf8());
    bound.push_str(prefix);
    bound.push(TAG_PREFIX_SENTINEL);
    bound
}
