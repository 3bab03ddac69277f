//! Scheduler-agnostic periodic tasks.
//!
//! A `PeriodicTask` knows its preferred interval and how to run one tick.
//! Whoever drives it (a tokio interval in `raed`, a cron job, a test) owns
//! the clock; the task never sleeps or spawns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rae_state::{MemoryFilter, MemoryStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::importance::{recompute_importance, ImportanceDecayPolicy};
use crate::domain::RaeResult;

/// One unit of recurring background work.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    type Report: Send;

    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn tick(&self, now: DateTime<Utc>) -> RaeResult<Self::Report>;
}

/// Outcome of one decay tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayReport {
    pub scopes: usize,
    pub examined: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Applies `recompute_importance` to every item of every scope.
pub struct DecayTask {
    store: Arc<dyn MemoryStore>,
    policy: ImportanceDecayPolicy,
    interval: Duration,
}

impl DecayTask {
    pub fn new(store: Arc<dyn MemoryStore>, policy: ImportanceDecayPolicy, interval: Duration) -> Self {
        Self {
            store,
            policy,
            interval,
        }
    }

    pub fn policy(&self) -> &ImportanceDecayPolicy {
        &self.policy
    }
}

#[async_trait]
impl PeriodicTask for DecayTask {
    type Report = DecayReport;

    fn name(&self) -> &'static str {
        "importance_decay"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    #[instrument(skip(self), name = "decay_tick")]
    async fn tick(&self, now: DateTime<Utc>) -> RaeResult<DecayReport> {
        let mut report = DecayReport::default();
        for scope in self.store.scopes().await? {
            report.scopes += 1;
            let items = self.store.query(&scope, &MemoryFilter::all()).await?;
            for item in items {
                report.examined += 1;
                let Some(next) = recompute_importance(&item, &self.policy, now) else {
                    continue;
                };
                // A single failed write must not stop the sweep.
                match self.store.set_importance(&scope, item.id, next).await {
                    Ok(()) => report.updated += 1,
                    Err(err) => {
                        report.failed += 1;
                        warn!(event = "decay.update_failed", scope = %scope, id = %item.id, error = %err);
                    }
                }
            }
        }
        debug!(
            event = "decay.tick",
            scopes = report.scopes,
            examined = report.examined,
            updated = report.updated,
        );
        crate::obs::emit_decay_completed(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rae_state::fakes::InMemoryMemoryBackend;
    use rae_state::{MemoryItem, MemoryLayer, Scope};

    #[tokio::test]
    async fn test_tick_decays_every_scope() {
        let store = Arc::new(InMemoryMemoryBackend::new());
        let now = Utc::now();
        let old = now - ChronoDuration::days(10);
        for tenant in ["a", "b"] {
            let item = MemoryItem::new(&Scope::new(tenant, "p"), MemoryLayer::Semantic, "fact")
                .with_importance(0.5)
                .with_created_at(old);
            store.insert(item).await.unwrap();
        }
        let floor_item = MemoryItem::new(&Scope::new("a", "p"), MemoryLayer::Semantic, "low")
            .with_importance(0.01)
            .with_created_at(old);
        store.insert(floor_item).await.unwrap();

        let task = DecayTask::new(
            store.clone(),
            ImportanceDecayPolicy::default(),
            Duration::from_secs(60),
        );
        let report = task.tick(now).await.unwrap();

        assert_eq!(report.scopes, 2);
        assert_eq!(report.examined, 3);
        assert_eq!(report.updated, 2);
        let items = store
            .query(&Scope::new("b", "p"), &MemoryFilter::all())
            .await
            .unwrap();
        assert!((items[0].importance - 0.495).abs() < 1e-12);
    }
}
