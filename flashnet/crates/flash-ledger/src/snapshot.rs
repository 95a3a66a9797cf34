//! Serialisable ledger state.
//!
//! A snapshot carries every non-empty batch store, the supply counters and
//! the event log, committed to by a SHA-256 binary Merkle root over the
//! account and supply leaves. Restoring checks the root and that stored
//! batches plus decayed supply still add up to total supply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::auth::MintAuthority;
use crate::batch::{Batch, BatchStore};
use crate::clock::{Clock, Timestamp};
use crate::config::{LedgerConfig, TokenConfig};
use crate::error::SnapshotError;
use crate::ledger::{serde_amount, AccountId, Amount, Ledger, LedgerEvent, Supply};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub token: TokenConfig,
    pub taken_at: Timestamp,
    #[serde(with = "serde_amount")]
    pub total_supply: Amount,
    #[serde(with = "serde_amount")]
    pub decayed_supply: Amount,
    pub expiry_window_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMeta,
    pub accounts: BTreeMap<AccountId, Vec<Batch>>,
    pub events: Vec<LedgerEvent>,
    #[serde(with = "serde_root")]
    pub state_root: [u8; 32],
}

impl LedgerSnapshot {
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root)
    }

    /// Recomputes the root from the snapshot's own contents.
    pub fn computed_root(&self) -> [u8; 32] {
        compute_state_root(&self.accounts, self.meta.total_supply, self.meta.decayed_supply)
    }

    pub fn verify(&self) -> Result<(), SnapshotError> {
        let computed = self.computed_root();
        if computed != self.state_root {
            return Err(SnapshotError::RootMismatch {
                recorded: self.state_root_hex(),
                computed: hex::encode(computed),
            });
        }
        let stored = self
            .accounts
            .values()
            .flatten()
            .try_fold(0 as Amount, |acc, batch| acc.checked_add(batch.amount));
        let accounted = stored.and_then(|s| s.checked_add(self.meta.decayed_supply));
        if accounted != Some(self.meta.total_supply) {
            return Err(SnapshotError::SupplyMismatch {
                total_supply: self.meta.total_supply,
                accounted: accounted.unwrap_or(Amount::MAX),
            });
        }
        Ok(())
    }
}

impl<C: Clock, A: MintAuthority> Ledger<C, A> {
    pub fn snapshot(&self) -> LedgerSnapshot {
        let taken_at = self.now();
        let window = self.expiry_window();
        self.frozen(|stores, supply, events| {
            let accounts: BTreeMap<AccountId, Vec<Batch>> = stores
                .iter()
                .map(|(id, store)| (id.clone(), store.iter().cloned().collect()))
                .collect();
            let state_root = compute_state_root(&accounts, supply.total, supply.decayed);
            LedgerSnapshot {
                meta: SnapshotMeta {
                    token: self.token().clone(),
                    taken_at,
                    total_supply: supply.total,
                    decayed_supply: supply.decayed,
                    expiry_window_secs: window.as_secs(),
                },
                accounts,
                events: events.to_vec(),
                state_root,
            }
        })
    }

    /// Rebuilds a ledger from a verified snapshot. The genesis reserve is
    /// not credited again.
    pub fn restore(
        config: LedgerConfig,
        snapshot: LedgerSnapshot,
        clock: C,
        authority: A,
    ) -> Result<Self, SnapshotError> {
        config.validate()?;
        if snapshot.meta.expiry_window_secs != config.expiry_window_secs {
            return Err(SnapshotError::WindowMismatch {
                snapshot: snapshot.meta.expiry_window_secs,
                configured: config.expiry_window_secs,
            });
        }
        snapshot.verify()?;

        let supply = Supply {
            total: snapshot.meta.total_supply,
            decayed: snapshot.meta.decayed_supply,
        };
        let mut stores = BTreeMap::new();
        for (id, batches) in snapshot.accounts {
            let store = BatchStore::from_batches(batches)
                .ok_or_else(|| SnapshotError::UnorderedBatches(id.clone()))?;
            stores.insert(id, store);
        }
        let accounts = stores.len();
        let mut ledger = Ledger::empty(config, clock, authority);
        ledger.install(stores, supply, snapshot.events);
        info!(
            accounts,
            total_supply = %supply.total,
            root = %hex::encode(snapshot.state_root),
            "ledger restored from snapshot"
        );
        Ok(ledger)
    }
}

fn compute_state_root(
    accounts: &BTreeMap<AccountId, Vec<Batch>>,
    total_supply: Amount,
    decayed_supply: Amount,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(accounts.len() + 1);
    for (account, batches) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update((account.len() as u64).to_le_bytes());
        hasher.update(account.as_bytes());
        for batch in batches {
            hasher.update(batch.amount.to_le_bytes());
            hasher.update(batch.received_at.to_le_bytes());
            hasher.update([u8::from(batch.exempt)]);
        }
        leaves.push(hasher.finalize().into());
    }
    let mut hasher = Sha256::new();
    hasher.update(b"supply");
    hasher.update(total_supply.to_le_bytes());
    hasher.update(decayed_supply.to_le_bytes());
    leaves.push(hasher.finalize().into());
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"flash-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

mod serde_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("state root must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SingleIssuer;
    use crate::clock::ManualClock;

    fn config() -> LedgerConfig {
        LedgerConfig {
            token: TokenConfig {
                decimals: 2,
                ..TokenConfig::default()
            },
            initial_reserve: 100,
            ..LedgerConfig::default()
        }
    }

    fn populated() -> (Ledger<ManualClock, SingleIssuer>, ManualClock) {
        let clock = ManualClock::new(1_000);
        let ledger = Ledger::new(config(), clock.clone(), SingleIssuer::new("deployer")).unwrap();
        let issuer = "deployer".to_string();
        ledger.mint(&issuer, &"alice".to_string(), 500).unwrap();
        clock.advance_days(3);
        ledger
            .transfer(&"alice".to_string(), &"bob".to_string(), 120)
            .unwrap();
        (ledger, clock)
    }

    #[test]
    fn state_root_is_deterministic() {
        let (ledger, _) = populated();
        assert_eq!(ledger.snapshot().state_root, ledger.snapshot().state_root);
    }

    #[test]
    fn restore_reproduces_balances_and_root() {
        let (ledger, clock) = populated();
        let snapshot = ledger.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        let restored =
            Ledger::restore(config(), decoded, clock.clone(), SingleIssuer::new("deployer"))
                .unwrap();

        for account in ["alice", "bob", "flash-reserve"] {
            let account = account.to_string();
            assert_eq!(restored.balance_of(&account), ledger.balance_of(&account));
            assert_eq!(restored.batches_of(&account), ledger.batches_of(&account));
        }
        assert_eq!(restored.total_supply(), 10_000 + 500);
        assert_eq!(restored.events(), ledger.events());
        assert_eq!(restored.snapshot().state_root, snapshot.state_root);
    }

    #[test]
    fn tampered_batch_is_detected() {
        let (ledger, clock) = populated();
        let mut snapshot = ledger.snapshot();
        if let Some(batches) = snapshot.accounts.get_mut("bob") {
            batches[0].amount += 1;
        }
        let err = Ledger::restore(config(), snapshot, clock, SingleIssuer::new("deployer"))
            .err()
            .unwrap();
        assert!(matches!(err, SnapshotError::RootMismatch { .. }));
    }

    #[test]
    fn supply_mismatch_is_detected_even_with_fresh_root() {
        let (ledger, _) = populated();
        let mut snapshot = ledger.snapshot();
        snapshot.meta.total_supply += 7;
        snapshot.state_root = snapshot.computed_root();
        assert!(matches!(
            snapshot.verify(),
            Err(SnapshotError::SupplyMismatch { .. })
        ));
    }

    #[test]
    fn window_change_is_refused() {
        let (ledger, clock) = populated();
        let snapshot = ledger.snapshot();
        let config = LedgerConfig {
            expiry_window_secs: 60,
            ..config()
        };
        let err = Ledger::restore(config, snapshot, clock, SingleIssuer::new("deployer"))
            .err()
            .unwrap();
        assert!(matches!(err, SnapshotError::WindowMismatch { .. }));
    }

    #[test]
    fn unordered_batches_are_refused() {
        let (ledger, clock) = populated();
        let mut snapshot = ledger.snapshot();
        if let Some(batches) = snapshot.accounts.get_mut("alice") {
            batches.push(Batch::new(0, 0));
        }
        snapshot.state_root = snapshot.computed_root();
        let err = Ledger::restore(config(), snapshot, clock, SingleIssuer::new("deployer"))
            .err()
            .unwrap();
        assert!(matches!(err, SnapshotError::UnorderedBatches(account) if account == "alice"));
    }
}
