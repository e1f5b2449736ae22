//! Fan-out of one query to every registered upstream.
//!
//! A round takes a single snapshot of the registry, spawns one task per
//! address and waits for all of them.  Each task owns its own result slot
//! (its `JoinHandle`), so nothing is shared between tasks except the
//! registry itself.  Upstreams whose query fails are evicted from the
//! registry by their own task, which means the eviction still happens if
//! the caller stops waiting on the round.

use std::fmt::Display;
use std::future::Future;

use futures_util::future::join_all;
use log::{debug, warn};

use crate::registry::Registry;
use crate::types::{AggregateResult, UpstreamAddress};

/// Runs one fan-out round of `query` against `registry`.
///
/// Returns one [`AggregateResult`] per upstream that answered successfully,
/// in no guaranteed order.  An empty registry yields an empty vector.
/// Addresses added to the registry after the round started are not queried.
pub async fn fan_out<F, Fut, T, E>(registry: &Registry, query: F) -> Vec<AggregateResult<T>>
where
    F: Fn(UpstreamAddress) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let snapshot = registry.snapshot().await;
    if snapshot.is_empty() {
        return Vec::new();
    }
    let queried = snapshot.len();

    let tasks: Vec<_> = snapshot
        .into_iter()
        .map(|addr| {
            let call = query(addr.clone());
            let registry = registry.clone();
            let task_addr = addr.clone();
            let handle = tokio::spawn(async move {
                match call.await {
                    Ok(document) => Some(document),
                    Err(e) => {
                        warn!("upstream {} failed, evicting: {}", task_addr, e);
                        registry.remove(&task_addr).await;
                        None
                    }
                }
            });
            (addr, handle)
        })
        .collect();

    let (addrs, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let outcomes = join_all(handles).await;

    let mut results = Vec::with_capacity(queried);
    for (address, outcome) in addrs.into_iter().zip(outcomes) {
        match outcome {
            Ok(Some(document)) => results.push(AggregateResult { address, document }),
            Ok(None) => {}
            Err(e) => {
                warn!("query task for {} did not complete, evicting: {}", address, e);
                registry.remove(&address).await;
            }
        }
    }

    debug!(
        "fan-out round finished: {} of {} upstreams answered",
        results.len(),
        queried
    );
    results
}
