use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{league_store::LeagueStore, storage::StorageError},
    state::SharedState,
};

const CONNECT_BACKOFF_START: Duration = Duration::from_secs(1);
const CONNECT_BACKOFF_MAX: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(5);
const RECONNECT_ATTEMPTS: u32 = 3;

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(CONNECT_BACKOFF_MAX)
}

/// Try to bring an installed store back after a failed ping.
/// Degraded mode is entered on the first failed attempt.
async fn recover(state: &SharedState, store: &Arc<dyn LeagueStore>) -> bool {
    let mut backoff = CONNECT_BACKOFF_START;
    for attempt in 1..=RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "league store reconnected");
                return true;
            }
            Err(err) => {
                if attempt == 1 {
                    warn!(error = %err, "league store unreachable; entering degraded mode");
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "league store reconnect failed");
                }
                sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
    false
}

/// Keep the league store connected, switching the shared state to degraded
/// mode while it is unreachable.
///
/// `connect` builds a fresh store; it is called again whenever an installed
/// store cannot be recovered.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn LeagueStore>, StorageError>> + Send,
{
    let mut backoff = CONNECT_BACKOFF_START;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, ?backoff, "league store connection failed");
                sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };

        state.set_store(store.clone()).await;
        info!("league store connected; leaving degraded mode");
        backoff = CONNECT_BACKOFF_START;

        loop {
            if store.health_check().await.is_ok() {
                if state.is_degraded().await {
                    info!("league store healthy again");
                    state.update_degraded(false).await;
                }
            } else if recover(&state, &store).await {
                state.update_degraded(false).await;
            } else {
                warn!("league store lost; reconnecting from scratch");
                break;
            }
            sleep(PING_INTERVAL).await;
        }

        sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}
