use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Supported decimation factors: track 1 of every N occurrences of a
/// high-frequency event pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SampleEvery {
    One = 1,
    Two = 2,
    Five = 5,
    Ten = 10,
    Twenty = 20,
    Fifty = 50,
    Hundred = 100,
}

impl SampleEvery {
    /// The divisor N.
    pub const fn divisor(self) -> u64 {
        self as u32 as u64
    }

    /// Convert from a raw divisor value.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            5 => Some(Self::Five),
            10 => Some(Self::Ten),
            20 => Some(Self::Twenty),
            50 => Some(Self::Fifty),
            100 => Some(Self::Hundred),
            _ => None,
        }
    }

    /// All supported divisors in ascending order.
    pub fn all() -> &'static [Self] {
        &[
            Self::One,
            Self::Two,
            Self::Five,
            Self::Ten,
            Self::Twenty,
            Self::Fifty,
            Self::Hundred,
        ]
    }
}

impl fmt::Display for SampleEvery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.divisor())
    }
}

/// Deterministic 1-in-N sampler, safe to call from any number of
/// threads.
///
/// Within every window of N consecutive calls exactly one returns true:
/// the Nth. The decision depends only on call order, never on chance,
/// so downsampled totals can be extrapolated by multiplying by N.
pub struct SamplingRate {
    every: SampleEvery,
    next: AtomicU64,
}

impl SamplingRate {
    pub fn new(every: SampleEvery) -> Self {
        Self {
            every,
            next: AtomicU64::new(0),
        }
    }

    /// The configured decimation factor.
    pub fn sample_every(&self) -> SampleEvery {
        self.every
    }

    /// Whether this occurrence should be tracked.
    ///
    /// N=1 skips the counter entirely.
    pub fn should_sample(&self) -> bool {
        if self.every == SampleEvery::One {
            return true;
        }

        let n = self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        n % self.every.divisor() == 0
    }
}

impl fmt::Debug for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingRate")
            .field("every", &self.every)
            .finish()
    }
}
