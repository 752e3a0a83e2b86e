//! Cross-subsystem scenarios.

pub mod caching;
pub mod consistency;
pub mod event_bus;
pub mod rate_limiting;

use std::future::Future;
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(10);

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(DEADLINE, async {
        while !condition() {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// [`eventually`] for conditions that need to await.
///
/// `condition` must return an owned future; clone what it needs into it.
pub async fn eventually_async<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(DEADLINE, async {
        while !condition().await {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
