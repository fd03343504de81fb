mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::league_store::LeagueStore, error::ServiceError};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

/// Capacity of the public round events channel.
const EVENTS_CAPACITY: usize = 64;

/// Central application state: storage handle, configuration and broadcast hubs.
pub struct AppState {
    store: RwLock<Option<Arc<dyn LeagueStore>>>,
    events: SseHub,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    finalizing: DashMap<Uuid, ()>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            events: SseHub::new(EVENTS_CAPACITY),
            degraded: degraded_tx,
            config,
            finalizing: DashMap::new(),
        })
    }

    /// Build a state with `store` already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn LeagueStore>) -> SharedState {
        let state = Self::new(config);
        state.set_store(store).await;
        state
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn LeagueStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Return the installed store or a degraded-mode error.
    pub async fn require_store(&self) -> Result<Arc<dyn LeagueStore>, ServiceError> {
        if *self.degraded.borrow() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn LeagueStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Broadcast hub used for the public round events stream.
    pub fn events(&self) -> &SseHub {
        &self.events
    }

    /// Mark `round_id` as being finalized by this process until the returned
    /// guard is dropped. Returns `None` when another task already holds it.
    pub fn begin_finalizing(&self, round_id: Uuid) -> Option<FinalizingGuard<'_>> {
        if self.finalizing.insert(round_id, ()).is_some() {
            return None;
        }
        Some(FinalizingGuard {
            state: self,
            round_id,
        })
    }

    /// Whether a task of this process is finalizing `round_id`.
    pub fn is_finalizing(&self, round_id: Uuid) -> bool {
        self.finalizing.contains_key(&round_id)
    }
}

/// Releases an in-flight finalization mark when dropped, even on panic.
#[must_use = "the round is released as soon as the guard is dropped"]
pub struct FinalizingGuard<'a> {
    state: &'a AppState,
    round_id: Uuid,
}

impl Drop for FinalizingGuard<'_> {
    fn drop(&mut self) {
        self.state.finalizing.remove(&self.round_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalizing_mark_is_released_on_drop() {
        let state = AppState::new(AppConfig::default());
        let id = Uuid::new_v4();

        let guard = state.begin_finalizing(id);
        assert!(guard.is_some());
        assert!(state.begin_finalizing(id).is_none());
        assert!(state.is_finalizing(id));

        drop(guard);
        assert!(!state.is_finalizing(id));
        assert!(state.begin_finalizing(id).is_some());
    }
}
