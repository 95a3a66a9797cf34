//! Time sources consulted by the ledger.
//!
//! Expiry is a pure function of "now", so the ledger never reads the host
//! clock directly. It asks a [`Clock`], which lets tests and the replay tool
//! spend days in microseconds and lets deployments guard against a host
//! clock stepping backwards.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

/// Unix time in seconds.
pub type Timestamp = u64;

pub const SECONDS_PER_DAY: u64 = 86_400;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Wraps a clock so that readings never go backwards.
///
/// The high-water mark starts at `floor`, typically the time the persisted
/// state was last written, so a restarted process cannot observe an
/// earlier instant than the one its batches were stamped with.
#[derive(Debug)]
pub struct MonotonicClock<C> {
    inner: C,
    high_water: AtomicU64,
}

impl<C: Clock> MonotonicClock<C> {
    pub fn new(inner: C) -> Self {
        Self::with_floor(inner, 0)
    }

    pub fn with_floor(inner: C, floor: Timestamp) -> Self {
        Self {
            inner,
            high_water: AtomicU64::new(floor),
        }
    }
}

impl<C: Clock> Clock for MonotonicClock<C> {
    fn now(&self) -> Timestamp {
        let reading = self.inner.now();
        let previous = self.high_water.fetch_max(reading, Ordering::AcqRel);
        previous.max(reading)
    }
}

/// Settable clock shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::Release);
    }

    pub fn advance(&self, secs: u64) {
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                Some(t.saturating_add(secs))
            });
    }

    pub fn advance_days(&self, days: u64) {
        self.advance(days.saturating_mul(SECONDS_PER_DAY));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::Acquire)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
