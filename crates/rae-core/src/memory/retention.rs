//! Retention policies for pruning stale or low-value memory items.

use chrono::{DateTime, TimeDelta, Utc};
use rae_state::{MemoryFilter, MemoryStore, Scope};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::RaeResult;

/// Policy controlling which items are eligible for removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Remove items created more than this many days ago.
    pub max_age_days: Option<u64>,
    /// Keep at most this many items (oldest removed first).
    pub max_items: Option<usize>,
    /// Remove items whose importance fell below this value.
    pub min_importance: Option<f64>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: Some(365),
            max_items: None,
            min_importance: None,
        }
    }
}

/// Result of a retention pass over one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub removed_count: usize,
    pub remaining_count: usize,
    pub removed_ids: Vec<Uuid>,
}

/// Creation time before which items are too old. `None` when `days` reaches
/// past the representable range, in which case nothing is old enough.
fn age_cutoff(now: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    i64::try_from(days)
        .ok()
        .and_then(TimeDelta::try_days)
        .and_then(|age| now.checked_sub_signed(age))
}

/// Apply `policy` to one scope, removing items in order:
/// 1. Importance below `min_importance`
/// 2. Older than `max_age_days`
/// 3. Excess items beyond `max_items` (oldest first)
pub async fn apply_retention(
    store: &dyn MemoryStore,
    scope: &Scope,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> RaeResult<RetentionReport> {
    let mut remaining = store.query(scope, &MemoryFilter::all()).await?;
    let mut doomed: Vec<Uuid> = Vec::new();

    if let Some(min) = policy.min_importance {
        remaining.retain(|item| {
            let keep = item.importance >= min;
            if !keep {
                doomed.push(item.id);
            }
            keep
        });
    }

    if let Some(cutoff) = policy.max_age_days.and_then(|days| age_cutoff(now, days)) {
        remaining.retain(|item| {
            let keep = item.created_at >= cutoff;
            if !keep {
                doomed.push(item.id);
            }
            keep
        });
    }

    if let Some(max_items) = policy.max_items {
        if remaining.len() > max_items {
            // Oldest first, then id for deterministic tie-breaking.
            remaining.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            let excess = remaining.len() - max_items;
            doomed.extend(remaining.drain(..excess).map(|item| item.id));
        }
    }

    for id in &doomed {
        store.delete(scope, *id).await?;
    }

    if !doomed.is_empty() {
        info!(
            event = "memory.retention",
            scope = %scope,
            removed = doomed.len(),
            remaining = remaining.len(),
        );
    }

    Ok(RetentionReport {
        removed_count: doomed.len(),
        remaining_count: remaining.len(),
        removed_ids: doomed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rae_state::fakes::InMemoryMemoryBackend;
    use rae_state::{MemoryItem, MemoryLayer};

    fn scope() -> Scope {
        Scope::new("t", "p")
    }

    async fn seed(store: &InMemoryMemoryBackend, age_days: i64, importance: f64) -> Uuid {
        let item = MemoryItem::new(&scope(), MemoryLayer::Episodic, format!("event {age_days} {importance}"))
            .with_created_at(Utc::now() - Duration::days(age_days))
            .with_importance(importance);
        let id = item.id;
        store.insert(item).await.unwrap();
        id
    }

    fn policy(max_age_days: Option<u64>, max_items: Option<usize>, min_importance: Option<f64>) -> RetentionPolicy {
        RetentionPolicy {
            max_age_days,
            max_items,
            min_importance,
        }
    }

    #[tokio::test]
    async fn test_noop_policy() {
        let store = InMemoryMemoryBackend::new();
        seed(&store, 1, 0.5).await;
        let r = apply_retention(&store, &scope(), &policy(None, None, None), Utc::now())
            .await
            .unwrap();
        assert_eq!(r.removed_count, 0);
        assert_eq!(r.remaining_count, 1);
    }

    #[tokio::test]
    async fn test_age_removal() {
        let store = InMemoryMemoryBackend::new();
        seed(&store, 1, 0.5).await;
        let old = seed(&store, 100, 0.5).await;
        let r = apply_retention(&store, &scope(), &policy(Some(30), None, None), Utc::now())
            .await
            .unwrap();
        assert_eq!(r.removed_ids, vec![old]);
        assert!(store.get(&scope(), old).await.is_err());
    }

    #[tokio::test]
    async fn test_importance_floor() {
        let store = InMemoryMemoryBackend::new();
        let weak = seed(&store, 1, 0.05).await;
        seed(&store, 1, 0.6).await;
        let r = apply_retention(&store, &scope(), &policy(None, None, Some(0.1)), Utc::now())
            .await
            .unwrap();
        assert_eq!(r.removed_ids, vec![weak]);
        assert_eq!(r.remaining_count, 1);
    }

    #[tokio::test]
    async fn test_count_trimming_removes_oldest() {
        let store = InMemoryMemoryBackend::new();
        let mut ids = Vec::new();
        for age in 0..5 {
            ids.push(seed(&store, age, 0.5).await);
        }
        let r = apply_retention(&store, &scope(), &policy(None, Some(3), None), Utc::now())
            .await
            .unwrap();
        assert_eq!(r.removed_count, 2);
        assert_eq!(r.remaining_count, 3);
        assert!(r.removed_ids.contains(&ids[4]));
        assert!(r.removed_ids.contains(&ids[3]));
    }

    #[tokio::test]
    async fn test_huge_max_age_removes_nothing() {
        let store = InMemoryMemoryBackend::new();
        seed(&store, 1, 0.5).await;
        seed(&store, 4_000, 0.5).await;
        for days in [u64::MAX, i64::MAX as u64, 1_000_000_000_000_000] {
            let r = apply_retention(&store, &scope(), &policy(Some(days), None, None), Utc::now())
                .await
                .unwrap();
            assert_eq!(r.removed_count, 0, "max_age_days = {days}");
            assert_eq!(r.remaining_count, 2);
        }
    }

    #[test]
    fn test_age_cutoff_bounds() {
        let now = Utc::now();
        assert_eq!(age_cutoff(now, 0), Some(now));
        assert_eq!(age_cutoff(now, 2), Some(now - Duration::days(2)));
        assert_eq!(age_cutoff(now, u64::MAX), None);
        assert_eq!(age_cutoff(now, 1_000_000_000_000_000), None);
    }
}
