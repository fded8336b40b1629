//! Day-gated content visibility.

use chrono::{DateTime, Utc};

use cohort_core::content::{ContentItem, ContentUnlockSpec, ListItem};
use cohort_core::{DocumentStore, Result};

use crate::clock::ClockResolver;

/// Whether content with `spec` is visible on program day `day`.
///
/// Inactive content is never visible. Content that is not hidden-until-
/// unlocked is always visible. Hidden content with no unlock day never
/// unlocks; otherwise it unlocks once `day` reaches its unlock day. A user
/// without a day index sees no hidden content.
pub fn is_unlocked(spec: &ContentUnlockSpec, day: Option<i64>) -> bool {
    if !spec.is_active {
        return false;
    }
    if !spec.is_hidden_until_unlocked {
        return true;
    }
    match (spec.unlock_day, day) {
        (Some(unlock_day), Some(day)) => day >= unlock_day,
        _ => false,
    }
}

/// Content items visible on `day`, in their original order.
pub fn visible_items(items: &[ContentItem], day: Option<i64>) -> Vec<&ContentItem> {
    items.iter().filter(|i| is_unlocked(&i.unlock, day)).collect()
}

/// List-of-values entries visible on `day`. Plain values are never gated.
pub fn visible_list_items(items: &[ListItem], day: Option<i64>) -> Vec<&ListItem> {
    items
        .iter()
        .filter(|i| i.unlock_spec().map_or(true, |spec| is_unlocked(&spec, day)))
        .collect()
}

/// Read-path resolver: the content a given user can see right now.
#[derive(Debug, Clone, Copy)]
pub struct UnlockResolver {
    clock: ClockResolver,
}

impl UnlockResolver {
    pub fn new(clock: ClockResolver) -> Self {
        Self { clock }
    }

    pub async fn content_for_user(
        &self,
        store: &dyn DocumentStore,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>> {
        let day = self.clock.day_for_user(store, user_id, now).await?;
        let items = store.content_items().await?;
        let visible: Vec<ContentItem> = visible_items(&items, day).into_iter().cloned().collect();
        tracing::debug!(user_id, ?day, visible = visible.len(), total = items.len(), "resolved content");
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(active: bool, hidden: bool, unlock_day: Option<i64>) -> ContentUnlockSpec {
        ContentUnlockSpec {
            is_active: active,
            is_hidden_until_unlocked: hidden,
            unlock_day,
        }
    }

    #[test]
    fn inactive_is_never_unlocked() {
        assert!(!is_unlocked(&spec(false, false, None), Some(100)));
        assert!(!is_unlocked(&spec(false, true, Some(1)), Some(100)));
    }

    #[test]
    fn not_hidden_ignores_unlock_day() {
        assert!(is_unlocked(&spec(true, false, Some(50)), Some(1)));
        assert!(is_unlocked(&spec(true, false, None), None));
    }

    #[test]
    fn hidden_without_day_never_unlocks() {
        assert!(!is_unlocked(&spec(true, true, None), Some(10_000)));
    }

    #[test]
    fn hidden_unlocks_on_its_day() {
        let s = spec(true, true, Some(3));
        assert!(!is_unlocked(&s, Some(2)));
        assert!(is_unlocked(&s, Some(3)));
        assert!(is_unlocked(&s, Some(4)));
        assert!(!is_unlocked(&s, None));
    }

    #[test]
    fn ungated_document_without_flags_is_visible() {
        let item: ContentItem = serde_json::from_str(r#"{"id": "intro", "title": "Intro"}"#).unwrap();
        assert!(is_unlocked(&item.unlock, Some(1)));
        assert!(is_unlocked(&item.unlock, None));
    }

    #[test]
    fn list_items_filter_by_gating() {
        let items = vec![
            ListItem::PlainValue("Always".into()),
            ListItem::ContentGroupItem {
                id: "g1".into(),
                label: "Week 2".into(),
                unlock_day: Some(8),
                is_active: true,
                is_hidden_until_unlocked: true,
            },
        ];
        assert_eq!(visible_list_items(&items, Some(1)).len(), 1);
        assert_eq!(visible_list_items(&items, Some(8)).len(), 2);
    }
}
