use crate::draft::AdDraftController;
use crate::upload::CancelSignal;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::info;
use uuid::Uuid;

pub type SharedDraft = Arc<Mutex<AdDraftController>>;

struct DraftEntry {
    owner: String,
    draft: SharedDraft,
    cancel: CancelSignal,
    last_touched: Instant,
}

/// Open authoring sessions keyed by draft id. Each draft belongs to the
/// token that opened it and is invisible to every other token.
#[derive(Clone, Default)]
pub struct DraftStore {
    drafts: Arc<Mutex<HashMap<Uuid, DraftEntry>>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(
        &self,
        owner: &str,
        controller: AdDraftController,
    ) -> (Uuid, SharedDraft) {
        let id = Uuid::new_v4();
        let cancel = controller.cancel_signal();
        let shared = Arc::new(Mutex::new(controller));
        let mut guard = self.drafts.lock().await;
        guard.insert(
            id,
            DraftEntry {
                owner: owner.to_string(),
                draft: shared.clone(),
                cancel,
                last_touched: Instant::now(),
            },
        );
        crate::metrics::drafts_open(guard.len());
        (id, shared)
    }

    /// Returns the draft when `owner` opened it, and marks it as used.
    pub async fn get(&self, id: Uuid, owner: &str) -> Option<SharedDraft> {
        let mut guard = self.drafts.lock().await;
        let entry = guard.get_mut(&id).filter(|entry| entry.owner == owner)?;
        entry.last_touched = Instant::now();
        Some(entry.draft.clone())
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.drafts.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.drafts.lock().await.len()
    }

    /// Removes the draft and cancels any submit running on it. An idle draft
    /// releases its images right away; a busy one releases them when the
    /// submit stops.
    pub async fn discard(&self, id: Uuid, owner: &str) -> bool {
        let removed = {
            let mut guard = self.drafts.lock().await;
            if !guard.get(&id).is_some_and(|entry| entry.owner == owner) {
                return false;
            }
            let removed = guard.remove(&id);
            crate::metrics::drafts_open(guard.len());
            removed
        };
        let Some(entry) = removed else {
            return false;
        };
        release(id, entry);
        true
    }

    /// Drops every idle draft untouched for longer than `ttl`. Drafts with a
    /// submit in progress are kept.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let expired: Vec<(Uuid, DraftEntry)> = {
            let mut guard = self.drafts.lock().await;
            let ids: Vec<Uuid> = guard
                .iter()
                .filter(|(_, entry)| {
                    entry.last_touched.elapsed() > ttl && entry.draft.try_lock().is_ok()
                })
                .map(|(id, _)| *id)
                .collect();
            let expired = ids
                .into_iter()
                .filter_map(|id| guard.remove(&id).map(|entry| (id, entry)))
                .collect();
            crate::metrics::drafts_open(guard.len());
            expired
        };
        let count = expired.len();
        for (id, entry) in expired {
            release(id, entry);
        }
        if count > 0 {
            info!(target = "domix.api", count, "expired drafts swept");
        }
        count
    }

    /// Sweeps expired drafts every `period` until the returned task is aborted.
    pub fn spawn_sweeper(&self, ttl: Duration, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                store.sweep_expired(ttl).await;
            }
        })
    }
}

fn release(id: Uuid, entry: DraftEntry) {
    entry.cancel.cancel();
    match entry.draft.try_lock() {
        Ok(mut controller) => controller.reset(),
        Err(_) => info!(target = "domix.api", draft_id = %id, "discarded while busy"),
    }
}

/// Idle lifetime of a draft, from `DRAFT_IDLE_TTL_SECS` (default 30 minutes).
pub fn idle_ttl_from_env() -> Duration {
    secs_from_env("DRAFT_IDLE_TTL_SECS", 30 * 60)
}

/// Interval between sweeps, from `DRAFT_SWEEP_SECS` (default 60 seconds).
pub fn sweep_period_from_env() -> Duration {
    secs_from_env("DRAFT_SWEEP_SECS", 60)
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::DraftPolicy;
    use crate::session::AuthSession;
    use crate::staging::PreviewRegistry;
    use crate::testing::{FakeAdService, FakeBlobStore, jpegs};

    fn controller(previews: &Arc<PreviewRegistry>) -> AdDraftController {
        AdDraftController::new(
            AuthSession::with_token("tok"),
            previews.clone(),
            FakeBlobStore::new(),
            FakeAdService::new(),
            DraftPolicy::default(),
        )
    }

    #[tokio::test]
    async fn discard_releases_previews() {
        let previews = PreviewRegistry::new();
        let store = DraftStore::new();
        let (id, shared) = store.insert("tok", controller(&previews)).await;
        shared.lock().await.add_images(jpegs(&["a", "b"])).unwrap();
        drop(shared);
        assert_eq!(previews.live_count(), 2);

        assert!(store.discard(id, "tok").await);
        assert_eq!(previews.live_count(), 0);
        assert!(!store.contains(id).await);
        assert!(!store.discard(id, "tok").await);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn other_tokens_cannot_see_or_discard() {
        let previews = PreviewRegistry::new();
        let store = DraftStore::new();
        let (id, _) = store.insert("tok", controller(&previews)).await;

        assert!(store.get(id, "someone-else").await.is_none());
        assert!(!store.discard(id, "someone-else").await);
        assert!(store.get(id, "tok").await.is_some());
    }

    #[tokio::test]
    async fn busy_draft_is_cancelled_and_released_on_last_reference() {
        let previews = PreviewRegistry::new();
        let store = DraftStore::new();
        let (id, shared) = store.insert("tok", controller(&previews)).await;
        let mut held = shared.lock().await;
        held.add_images(jpegs(&["a"])).unwrap();
        let cancel = held.cancel_signal();

        assert!(store.discard(id, "tok").await);
        assert!(cancel.is_cancelled());
        assert_eq!(previews.live_count(), 1);
        drop(held);
        drop(shared);
        assert_eq!(previews.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_drafts_expire() {
        let previews = PreviewRegistry::new();
        let store = DraftStore::new();
        let (stale, shared) = store.insert("tok", controller(&previews)).await;
        shared.lock().await.add_images(jpegs(&["a"])).unwrap();
        drop(shared);
        let (fresh, _) = store.insert("tok", controller(&previews)).await;

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.get(fresh, "tok").await.is_some());
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(store.sweep_expired(Duration::from_secs(60)).await, 1);
        assert!(!store.contains(stale).await);
        assert!(store.contains(fresh).await);
        assert_eq!(previews.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_removes_abandoned_drafts() {
        let previews = PreviewRegistry::new();
        let store = DraftStore::new();
        let (id, shared) = store.insert("tok", controller(&previews)).await;
        shared.lock().await.add_images(jpegs(&["a", "b"])).unwrap();
        drop(shared);

        let sweeper = store.spawn_sweeper(Duration::from_secs(60), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(75)).await;

        assert!(!store.contains(id).await);
        assert_eq!(previews.live_count(), 0);
        sweeper.abort();
    }
}
