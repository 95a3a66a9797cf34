//! Per-account deposit batches.
//!
//! A store is a FIFO of batches kept in receipt order: new batches are
//! always pushed at the tail with the then-current time, spending consumes
//! from the head, and pruning drops expired batches from the head, past any
//! exempt reserve batch. Nothing is ever re-sorted.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Timestamp, SECONDS_PER_DAY};
use crate::ledger::Amount;

/// A deposit of `amount` received at `received_at`.
///
/// `exempt` batches never age; the genesis reserve is credited as one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    #[serde(with = "crate::ledger::serde_amount")]
    pub amount: Amount,
    pub received_at: Timestamp,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exempt: bool,
}

impl Batch {
    pub fn new(amount: Amount, received_at: Timestamp) -> Self {
        Self {
            amount,
            received_at,
            exempt: false,
        }
    }
}

/// How long a batch counts towards its holder's balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryWindow(u64);

impl ExpiryWindow {
    pub const DEFAULT_DAYS: u64 = 10;

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn from_days(days: u64) -> Self {
        Self(days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Live iff `now - received_at < window`. A batch stamped after `now`
    /// has age zero.
    pub fn is_live(&self, batch: &Batch, now: Timestamp) -> bool {
        batch.exempt || now.saturating_sub(batch.received_at) < self.0
    }

    /// First instant at which `batch` no longer counts, `None` if exempt.
    pub fn expires_at(&self, batch: &Batch) -> Option<Timestamp> {
        if batch.exempt {
            None
        } else {
            Some(batch.received_at.saturating_add(self.0))
        }
    }
}

impl Default for ExpiryWindow {
    fn default() -> Self {
        Self::from_days(Self::DEFAULT_DAYS)
    }
}

/// What a call to [`BatchStore::prune_expired`] removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pruned {
    pub batches: usize,
    pub amount: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchStore {
    batches: VecDeque<Batch>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted batches. Returns `None` when the
    /// batches are not in receipt order.
    pub fn from_batches(batches: Vec<Batch>) -> Option<Self> {
        if batches
            .windows(2)
            .any(|pair| pair[1].received_at < pair[0].received_at)
        {
            return None;
        }
        Some(Self {
            batches: batches.into(),
        })
    }

    pub fn append(&mut self, amount: Amount, now: Timestamp) {
        self.push(Batch::new(amount, now));
    }

    pub fn append_exempt(&mut self, amount: Amount, now: Timestamp) {
        self.push(Batch {
            amount,
            received_at: now,
            exempt: true,
        });
    }

    fn push(&mut self, mut batch: Batch) {
        // a clock that stepped back must not break receipt order
        if let Some(tail) = self.batches.back() {
            batch.received_at = batch.received_at.max(tail.received_at);
        }
        self.batches.push_back(batch);
    }

    /// Drops expired batches from the front of the store, stopping at the
    /// first live one. Exempt batches at the head never expire and are
    /// stepped over, so the genesis reserve does not shield later deposits.
    pub fn prune_expired(&mut self, now: Timestamp, window: ExpiryWindow) -> Pruned {
        let mut pruned = Pruned::default();
        let start = self.batches.iter().take_while(|batch| batch.exempt).count();
        while let Some(batch) = self.batches.get(start) {
            if window.is_live(batch, now) {
                break;
            }
            pruned.amount = pruned.amount.saturating_add(batch.amount);
            pruned.batches += 1;
            self.batches.remove(start);
        }
        if pruned.batches > 0 {
            debug!(
                batches = pruned.batches,
                amount = %pruned.amount,
                "pruned expired batches"
            );
        }
        pruned
    }

    /// Spendable value at `now`. Does not touch the store.
    pub fn live_sum(&self, now: Timestamp, window: ExpiryWindow) -> Amount {
        self.batches
            .iter()
            .filter(|batch| window.is_live(batch, now))
            .fold(0, |acc: Amount, batch| acc.saturating_add(batch.amount))
    }

    /// Everything still held in storage, expired or not.
    pub fn raw_total(&self) -> Amount {
        self.batches
            .iter()
            .fold(0, |acc: Amount, batch| acc.saturating_add(batch.amount))
    }

    /// Spends `amount` from live batches, oldest first.
    ///
    /// Fully covered batches are removed; the batch that only partially
    /// covers the remainder keeps its original `received_at` and shrinks in
    /// place. Expired batches are skipped and left for pruning. Returns the
    /// amount actually consumed, which equals `amount` whenever
    /// `amount <= live_sum(now, window)`.
    pub fn consume(&mut self, amount: Amount, now: Timestamp, window: ExpiryWindow) -> Amount {
        let mut remaining = amount;
        let mut idx = 0;
        while remaining > 0 {
            let Some(batch) = self.batches.get_mut(idx) else {
                break;
            };
            if !window.is_live(batch, now) {
                idx += 1;
                continue;
            }
            if batch.amount <= remaining {
                remaining -= batch.amount;
                self.batches.remove(idx);
            } else {
                batch.amount -= remaining;
                remaining = 0;
            }
        }
        amount - remaining
    }

    /// Earliest instant at which a currently live batch expires.
    pub fn next_expiry(&self, now: Timestamp, window: ExpiryWindow) -> Option<Timestamp> {
        self.batches
            .iter()
            .filter(|batch| window.is_live(batch, now))
            .filter_map(|batch| window.expires_at(batch))
            .min()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = SECONDS_PER_DAY;

    fn store_of(batches: &[(Amount, Timestamp)]) -> BatchStore {
        let mut store = BatchStore::new();
        for (amount, at) in batches {
            store.append(*amount, *at);
        }
        store
    }

    fn contents(store: &BatchStore) -> Vec<(Amount, Timestamp)> {
        store.iter().map(|b| (b.amount, b.received_at)).collect()
    }

    #[test]
    fn liveness_boundary_is_exclusive() {
        let window = ExpiryWindow::from_days(10);
        let batch = Batch::new(5, 0);
        assert!(window.is_live(&batch, 10 * DAY - 1));
        assert!(!window.is_live(&batch, 10 * DAY));
        assert_eq!(window.expires_at(&batch), Some(10 * DAY));
    }

    #[test]
    fn future_batches_count_as_fresh() {
        let window = ExpiryWindow::from_days(1);
        assert!(window.is_live(&Batch::new(1, 500), 10));
    }

    #[test]
    fn live_sum_skips_expired_without_pruning() {
        let window = ExpiryWindow::default();
        let store = store_of(&[(10, 0), (20, 5 * DAY)]);
        assert_eq!(store.live_sum(11 * DAY, window), 20);
        assert_eq!(store.len(), 2);
        assert_eq!(store.raw_total(), 30);
    }

    #[test]
    fn prune_stops_at_first_live_batch() {
        let window = ExpiryWindow::default();
        let mut store = store_of(&[(1, 0), (2, DAY), (3, 8 * DAY), (4, 9 * DAY)]);
        let pruned = store.prune_expired(12 * DAY, window);
        assert_eq!(pruned, Pruned { batches: 2, amount: 3 });
        assert_eq!(contents(&store), vec![(3, 8 * DAY), (4, 9 * DAY)]);
        assert_eq!(store.prune_expired(12 * DAY, window), Pruned::default());
    }

    #[test]
    fn fifo_debit_removes_exactly_the_oldest_batch() {
        let window = ExpiryWindow::default();
        let mut store = store_of(&[(7, 100), (11, 200), (13, 300)]);
        assert_eq!(store.consume(7, 400, window), 7);
        assert_eq!(contents(&store), vec![(11, 200), (13, 300)]);
    }

    #[test]
    fn split_keeps_original_receipt_time() {
        let window = ExpiryWindow::default();
        let mut store = store_of(&[(10, 0), (20, 5 * DAY)]);
        assert_eq!(store.consume(15, 5 * DAY, window), 15);
        assert_eq!(contents(&store), vec![(15, 5 * DAY)]);

        let mut store = store_of(&[(10, 0), (20, 5 * DAY)]);
        assert_eq!(store.consume(5, 5 * DAY, window), 5);
        assert_eq!(contents(&store), vec![(5, 0), (20, 5 * DAY)]);
    }

    #[test]
    fn consume_skips_expired_batches() {
        let window = ExpiryWindow::default();
        let mut store = BatchStore::new();
        store.append_exempt(5, 0);
        store.append(100, DAY);
        store.append(8, 9 * DAY);
        assert_eq!(store.live_sum(12 * DAY, window), 13);
        assert_eq!(store.consume(10, 12 * DAY, window), 10);
        assert_eq!(contents(&store), vec![(100, DAY), (3, 9 * DAY)]);
        assert_eq!(store.prune_expired(12 * DAY, window).amount, 100);
    }

    #[test]
    fn prune_steps_over_exempt_head() {
        let window = ExpiryWindow::default();
        let mut store = BatchStore::new();
        store.append_exempt(50, 0);
        store.append(1, DAY);
        store.append(2, 2 * DAY);
        store.append(4, 8 * DAY);
        let pruned = store.prune_expired(12 * DAY, window);
        assert_eq!(pruned, Pruned { batches: 2, amount: 3 });
        assert_eq!(contents(&store), vec![(50, 0), (4, 8 * DAY)]);
        assert!(store.iter().next().is_some_and(|batch| batch.exempt));
        assert_eq!(store.raw_total(), 54);
    }

    #[test]
    fn consume_reports_shortfall() {
        let window = ExpiryWindow::default();
        let mut store = store_of(&[(4, 0)]);
        assert_eq!(store.consume(9, 0, window), 4);
        assert!(store.is_empty());
    }

    #[test]
    fn append_never_goes_before_tail() {
        let mut store = store_of(&[(1, 50)]);
        store.append(2, 40);
        assert_eq!(contents(&store), vec![(1, 50), (2, 50)]);
    }

    #[test]
    fn exempt_batches_never_expire() {
        let window = ExpiryWindow::from_days(1);
        let mut store = BatchStore::new();
        store.append_exempt(50, 0);
        assert_eq!(store.live_sum(1_000 * DAY, window), 50);
        assert_eq!(store.next_expiry(1_000 * DAY, window), None);
    }

    #[test]
    fn next_expiry_reports_oldest_live_batch() {
        let window = ExpiryWindow::default();
        let store = store_of(&[(1, 0), (1, 3 * DAY), (1, 4 * DAY)]);
        assert_eq!(store.next_expiry(11 * DAY, window), Some(13 * DAY));
        assert_eq!(store.next_expiry(20 * DAY, window), None);
    }

    #[test]
    fn from_batches_rejects_unordered_input() {
        assert!(BatchStore::from_batches(vec![Batch::new(1, 9), Batch::new(1, 3)]).is_none());
        let store = BatchStore::from_batches(vec![Batch::new(1, 3), Batch::new(2, 9)]).unwrap();
        assert_eq!(store.raw_total(), 3);
    }
}
