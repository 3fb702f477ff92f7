use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Wall-clock time as nanoseconds since the unix epoch. Matches the
/// timestamp domain of ingested events.
pub fn unix_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

struct Entry<V> {
    value: V,
    timestamp_ns: u64,
}

/// Concurrent key-value store whose entries are swept after a fixed TTL.
///
/// Pending start events wait here for their end counterpart. Lookups
/// never check expiry themselves; a background task sweeps once per TTL
/// period, so an entry can outlive its TTL by at most one sweep
/// interval. Within the TTL window the map grows without bound.
///
/// Construction spawns the sweep task and so requires a tokio runtime.
pub struct ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Arc<DashMap<K, Entry<V>>>,
    ttl: Duration,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, capacity: usize) -> Result<Self> {
        if ttl.is_zero() {
            bail!("cache ttl must be non-zero");
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            bail!("cache sweeper requires a tokio runtime");
        };

        let entries = Arc::new(DashMap::with_capacity(capacity));
        let cancel = CancellationToken::new();
        let sweeper = handle.spawn(sweep_loop(
            Arc::clone(&entries),
            ttl,
            cancel.clone(),
        ));

        Ok(Self {
            entries,
            ttl,
            cancel,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Insert or overwrite the entry for `key`.
    ///
    /// `timestamp_ns` positions the entry in the expiry window; `None`
    /// stamps it with the current wall clock.
    pub fn set(&self, key: K, value: V, timestamp_ns: Option<u64>) {
        let timestamp_ns = timestamp_ns.unwrap_or_else(unix_now_ns);
        self.entries.insert(
            key,
            Entry {
                value,
                timestamp_ns,
            },
        );
    }

    /// Look up `key` without consuming it.
    pub fn get(&self, key: &K) -> Option<(V, u64)> {
        self.entries
            .get(key)
            .map(|e| (e.value.clone(), e.timestamp_ns))
    }

    /// Remove and return the entry for `key`. A second call for the
    /// same key returns `None`.
    pub fn remove(&self, key: &K) -> Option<(V, u64)> {
        self.entries
            .remove(key)
            .map(|(_, e)| (e.value, e.timestamp_ns))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stop the sweep task. Entries stay readable but no longer expire.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Stop the sweep task and wait briefly for it to finish.
    pub async fn close_joined(&self) {
        self.cancel.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }
    }
}

impl<K, V> Drop for ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn sweep_loop<K, V>(
    entries: Arc<DashMap<K, Entry<V>>>,
    ttl: Duration,
    cancel: CancellationToken,
) where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(ttl);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                trace!("cache sweeper stopped");
                break;
            }
            _ = interval.tick() => {
                let cutoff = unix_now_ns().saturating_sub(ttl.as_nanos() as u64);

                // Snapshot keys first so removal never runs under the
                // shard locks held by iteration.
                let expired: Vec<K> = entries
                    .iter()
                    .filter(|e| e.value().timestamp_ns < cutoff)
                    .map(|e| e.key().clone())
                    .collect();

                if expired.is_empty() {
                    continue;
                }

                let mut swept = 0usize;
                for key in &expired {
                    // A fresher overwrite between snapshot and removal
                    // must survive.
                    if entries
                        .remove_if(key, |_, e| e.timestamp_ns < cutoff)
                        .is_some()
                    {
                        swept += 1;
                    }
                }
                debug!(swept, remaining = entries.len(), "swept expired entries");
            }
        }
    }
}
