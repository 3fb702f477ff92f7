use std::hash::Hash;
use std::time::Duration;

use anyhow::Result;

use super::cache::ExpiringCache;
use super::sampling::{SampleEvery, SamplingRate};
use crate::ingest::event::RawEvent;

/// Default time an unmatched start event may wait for its end
/// counterpart before the sweeper drops it.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(5 * 60);

/// Classification of one event fed through a [`PairTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// The event carried the start id. Whether a pending entry was
    /// retained depends on sampling; either way the operation began.
    Start,
    /// The event carried the end id and consumed a pending start.
    FinalWithDuration,
    /// The event carried the end id but no pending start was found:
    /// sampled out, swept, or started before this process attached.
    FinalWithoutDuration,
    /// Neither the start nor the end id.
    Unrecognized,
}

/// Pairs start and end events sharing a correlation key into a
/// duration.
///
/// Start events pass through the sampler and wait in the TTL cache
/// stamped with their own timestamp; end events consume their pending
/// entry exactly once. Matching depends only on key equality within
/// the TTL window, so interleaved and out-of-order pairs resolve
/// correctly. `D` is carried from the start event to its completion.
pub struct PairTimer<K, D = ()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    start_id: u16,
    end_id: u16,
    key_fn: fn(&RawEvent) -> K,
    data_fn: fn(&RawEvent) -> D,
    sampler: SamplingRate,
    pending: ExpiringCache<K, D>,
}

impl<K, D> PairTimer<K, D>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    /// Pair timer that carries `data_fn`'s extract from the start event
    /// through to the matching end event.
    pub fn with_data(
        start_id: u16,
        end_id: u16,
        key_fn: fn(&RawEvent) -> K,
        data_fn: fn(&RawEvent) -> D,
        sample_every: SampleEvery,
        ttl: Duration,
        capacity: usize,
    ) -> Result<Self> {
        Ok(Self {
            start_id,
            end_id,
            key_fn,
            data_fn,
            sampler: SamplingRate::new(sample_every),
            pending: ExpiringCache::new(ttl, capacity)?,
        })
    }

    /// Classify one event and, for a matched pair, return the elapsed
    /// time between the start and end timestamps plus the retained
    /// start data.
    pub fn observe(&self, event: &RawEvent) -> (PairOutcome, Duration, Option<D>) {
        if event.event_id == self.start_id {
            if self.sampler.should_sample() {
                let key = (self.key_fn)(event);
                let data = (self.data_fn)(event);
                self.pending.set(key, data, Some(event.timestamp_ns));
            }
            return (PairOutcome::Start, Duration::ZERO, None);
        }

        if event.event_id == self.end_id {
            let key = (self.key_fn)(event);
            return match self.pending.remove(&key) {
                Some((data, started_ns)) => {
                    let nanos = event.timestamp_ns.saturating_sub(started_ns);
                    (
                        PairOutcome::FinalWithDuration,
                        Duration::from_nanos(nanos),
                        Some(data),
                    )
                }
                None => (PairOutcome::FinalWithoutDuration, Duration::ZERO, None),
            };
        }

        (PairOutcome::Unrecognized, Duration::ZERO, None)
    }

    /// The sampling divisor; consumers scale aggregated totals by this
    /// to recover the unsampled magnitude.
    pub fn sample_every(&self) -> SampleEvery {
        self.sampler.sample_every()
    }

    /// Number of starts currently awaiting an end event.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Stop the pending cache's sweep task.
    pub fn close(&self) {
        self.pending.close();
    }
}

impl<K> PairTimer<K, ()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Pair timer that retains nothing beyond the start timestamp.
    pub fn new(
        start_id: u16,
        end_id: u16,
        key_fn: fn(&RawEvent) -> K,
        sample_every: SampleEvery,
        ttl: Duration,
        capacity: usize,
    ) -> Result<Self> {
        Self::with_data(start_id, end_id, key_fn, |_| (), sample_every, ttl, capacity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const START: u16 = 81;
    const END: u16 = 91;
    const MS: u64 = 1_000_000;

    fn event(id: u16, timestamp_ns: u64, thread_id: u64) -> RawEvent {
        RawEvent::new(id, timestamp_ns, thread_id, 100, &[])
    }

    fn timer() -> PairTimer<u64> {
        PairTimer::new(
            START,
            END,
            |e| e.thread_id,
            SampleEvery::One,
            Duration::from_secs(300),
            64,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_ids_are_unrecognized() {
        let timer = timer();

        let (outcome, duration, _) = timer.observe(&event(7, 1000, 1));

        assert_eq!(outcome, PairOutcome::Unrecognized);
        assert_eq!(duration, Duration::ZERO);
        assert_eq!(timer.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_start_retains_pending_entry() {
        let timer = timer();

        let (outcome, duration, _) = timer.observe(&event(START, 1000, 1));

        assert_eq!(outcome, PairOutcome::Start);
        assert_eq!(duration, Duration::ZERO);
        assert_eq!(timer.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_end_without_start() {
        let timer = timer();

        let (outcome, duration, _) = timer.observe(&event(END, 1000, 1));

        assert_eq!(outcome, PairOutcome::FinalWithoutDuration);
        assert_eq!(duration, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_matched_pair_yields_duration() {
        let timer = timer();

        timer.observe(&event(START, 0, 1));
        let (outcome, duration, _) = timer.observe(&event(END, 100 * MS, 1));

        assert_eq!(outcome, PairOutcome::FinalWithDuration);
        assert_eq!(duration, Duration::from_millis(100));
        assert_eq!(timer.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_simultaneous_pair_yields_zero() {
        let timer = timer();

        timer.observe(&event(START, 5000, 1));
        let (outcome, duration, _) = timer.observe(&event(END, 5000, 1));

        assert_eq!(outcome, PairOutcome::FinalWithDuration);
        assert_eq!(duration, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_end_before_start_saturates_to_zero() {
        let timer = timer();

        timer.observe(&event(START, 9000, 1));
        let (outcome, duration, _) = timer.observe(&event(END, 8000, 1));

        assert_eq!(outcome, PairOutcome::FinalWithDuration);
        assert_eq!(duration, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_interleaved_pairs_resolve_by_key() {
        let timer = timer();

        // Three operations start, then finish in reverse order.
        for key in 1..=3u64 {
            timer.observe(&event(START, 0, key));
        }
        for key in (1..=3u64).rev() {
            let at = (4 - key) * 100 * MS;
            let (outcome, duration, _) = timer.observe(&event(END, at, key));
            assert_eq!(outcome, PairOutcome::FinalWithDuration);
            assert_eq!(duration, Duration::from_nanos(at));
        }
        assert_eq!(timer.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_restarted_key_measures_from_latest_start() {
        let timer = timer();

        timer.observe(&event(START, 0, 1));
        timer.observe(&event(START, 50 * MS, 1));
        let (outcome, duration, _) = timer.observe(&event(END, 150 * MS, 1));

        assert_eq!(outcome, PairOutcome::FinalWithDuration);
        assert_eq!(duration, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_every_second_start_tracked() {
        let timer: PairTimer<u64> = PairTimer::new(
            START,
            END,
            |e| e.thread_id,
            SampleEvery::Two,
            Duration::from_secs(300),
            64,
        )
        .unwrap();

        // First pair is sampled out.
        assert_eq!(timer.observe(&event(START, 0, 1)).0, PairOutcome::Start);
        assert_eq!(
            timer.observe(&event(END, 100 * MS, 1)).0,
            PairOutcome::FinalWithoutDuration
        );

        // Second pair is tracked.
        assert_eq!(timer.observe(&event(START, 0, 2)).0, PairOutcome::Start);
        let (outcome, duration, _) = timer.observe(&event(END, 100 * MS, 2));
        assert_eq!(outcome, PairOutcome::FinalWithDuration);
        assert_eq!(duration, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_sampled_fraction_of_starts_retained() {
        let timer: PairTimer<u64> = PairTimer::new(
            START,
            END,
            |e| e.thread_id,
            SampleEvery::Five,
            Duration::from_secs(300),
            2048,
        )
        .unwrap();

        for key in 0..1000u64 {
            timer.observe(&event(START, 0, key));
        }

        assert_eq!(timer.pending_len(), 200);
        assert_eq!(timer.sample_every(), SampleEvery::Five);
    }

    #[tokio::test]
    async fn test_start_data_carried_to_completion() {
        let timer: PairTimer<u64, u64> = PairTimer::with_data(
            START,
            END,
            |e| e.thread_id,
            |e| e.payload().first().copied().unwrap_or(0),
            SampleEvery::One,
            Duration::from_secs(300),
            64,
        )
        .unwrap();

        let start = RawEvent::new(START, 0, 1, 100, &[1234]);
        timer.observe(&start);
        let (outcome, _, data) = timer.observe(&event(END, 100 * MS, 1));

        assert_eq!(outcome, PairOutcome::FinalWithDuration);
        assert_eq!(data, Some(1234));
    }
}
