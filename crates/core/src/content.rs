//! Content gating metadata and admin list-of-values items.

use serde::{Deserialize, Serialize};

/// Unlock metadata attached to a content item.
///
/// `unlock_day` is only consulted when `is_hidden_until_unlocked` is set.
/// A document without `isActive` is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUnlockSpec {
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_hidden_until_unlocked: bool,
    #[serde(default)]
    pub unlock_day: Option<i64>,
}

impl Default for ContentUnlockSpec {
    fn default() -> Self {
        Self {
            is_active: true,
            is_hidden_until_unlocked: false,
            unlock_day: None,
        }
    }
}

/// A content item as listed to members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub unlock: ContentUnlockSpec,
}

/// An entry in an admin-managed list of values.
///
/// Plain value lists hold bare strings; content-group lists hold objects with
/// their own gating. The shape is decided once when the list is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListItem {
    PlainValue(String),
    #[serde(rename_all = "camelCase")]
    ContentGroupItem {
        id: String,
        label: String,
        #[serde(default)]
        unlock_day: Option<i64>,
        #[serde(default = "default_true")]
        is_active: bool,
        #[serde(default)]
        is_hidden_until_unlocked: bool,
    },
}

fn default_true() -> bool {
    true
}

impl ListItem {
    pub fn label(&self) -> &str {
        match self {
            ListItem::PlainValue(value) => value,
            ListItem::ContentGroupItem { label, .. } => label,
        }
    }

    /// Gating for content-group items. Plain values are never gated.
    pub fn unlock_spec(&self) -> Option<ContentUnlockSpec> {
        match self {
            ListItem::PlainValue(_) => None,
            ListItem::ContentGroupItem {
                unlock_day,
                is_active,
                is_hidden_until_unlocked,
                ..
            } => Some(ContentUnlockSpec {
                is_active: *is_active,
                is_hidden_until_unlocked: *is_hidden_until_unlocked,
                unlock_day: *unlock_day,
            }),
        }
    }
}
