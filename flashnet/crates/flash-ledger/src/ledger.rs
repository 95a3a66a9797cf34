use std::{collections::BTreeMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::MintAuthority;
use crate::batch::{Batch, BatchStore, ExpiryWindow, Pruned};
use crate::clock::{Clock, Timestamp};
use crate::config::{LedgerConfig, SelfTransferPolicy, TokenConfig};
use crate::error::{ConfigError, MintError, TransferError};

pub type AccountId = String;
pub type Amount = u128;

type SharedStore = Arc<RwLock<BatchStore>>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Minted {
        to: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
        at: Timestamp,
    },
    Transferred {
        from: AccountId,
        to: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
        at: Timestamp,
    },
    /// Expired batches physically removed from an account's store.
    Expired {
        account: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
        batches: usize,
        at: Timestamp,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Supply {
    pub total: Amount,
    /// Amount pruned after expiring. Still part of `total`.
    pub decayed: Amount,
}

/// The expiring-deposit ledger.
///
/// Each account owns one [`BatchStore`] behind its own lock. Mutations lock
/// the stores they touch (two stores are always locked in account order),
/// then the supply counters, then the event log. Balance queries take a
/// shared lock on a single store and never mutate it.
pub struct Ledger<C, A> {
    config: LedgerConfig,
    window: ExpiryWindow,
    clock: C,
    authority: A,
    accounts: RwLock<BTreeMap<AccountId, SharedStore>>,
    supply: Mutex<Supply>,
    events: Mutex<Vec<LedgerEvent>>,
}

impl<C: Clock, A: MintAuthority> Ledger<C, A> {
    /// Creates the ledger and credits the genesis issuance to the reserve
    /// account.
    pub fn new(config: LedgerConfig, clock: C, authority: A) -> Result<Self, ConfigError> {
        config.validate()?;
        let reserve = config.initial_reserve_units()?;
        let ledger = Self::empty(config, clock, authority);
        if reserve > 0 {
            let now = ledger.clock.now();
            let mut store = BatchStore::new();
            if ledger.config.reserve_exempt {
                store.append_exempt(reserve, now);
            } else {
                store.append(reserve, now);
            }
            ledger.accounts.write().insert(
                ledger.config.reserve_account.clone(),
                Arc::new(RwLock::new(store)),
            );
            ledger.supply.lock().total = reserve;
            ledger.events.lock().push(LedgerEvent::Minted {
                to: ledger.config.reserve_account.clone(),
                amount: reserve,
                at: now,
            });
            info!(
                reserve_account = %ledger.config.reserve_account,
                amount = %reserve,
                exempt = ledger.config.reserve_exempt,
                "genesis reserve credited"
            );
        }
        Ok(ledger)
    }

    pub(crate) fn empty(config: LedgerConfig, clock: C, authority: A) -> Self {
        Self {
            window: config.expiry_window(),
            config,
            clock,
            authority,
            accounts: RwLock::new(BTreeMap::new()),
            supply: Mutex::new(Supply::default()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn install(
        &mut self,
        accounts: BTreeMap<AccountId, BatchStore>,
        supply: Supply,
        events: Vec<LedgerEvent>,
    ) {
        *self.accounts.get_mut() = accounts
            .into_iter()
            .map(|(id, store)| (id, Arc::new(RwLock::new(store))))
            .collect();
        *self.supply.get_mut() = supply;
        *self.events.get_mut() = events;
    }

    /// Credits `amount` to `recipient` as a fresh batch. Only callers the
    /// authority admits may mint.
    pub fn mint(
        &self,
        caller: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<(), MintError> {
        if !self.authority.may_mint(caller) {
            warn!(%caller, "mint refused: caller is not the issuer");
            return Err(MintError::Unauthorized {
                caller: caller.clone(),
            });
        }
        if amount == 0 {
            return Err(MintError::InvalidAmount);
        }

        let store = self.store_or_create(recipient);
        let mut store = store.write();
        let mut supply = self.supply.lock();
        let total = supply
            .total
            .checked_add(amount)
            .ok_or(MintError::SupplyOverflow {
                total_supply: supply.total,
                amount,
            })?;

        let now = self.clock.now();
        let pruned = store.prune_expired(now, self.window);
        store.append(amount, now);
        supply.total = total;
        supply.decayed = supply.decayed.saturating_add(pruned.amount);
        drop(supply);

        let mut events = self.events.lock();
        push_expired(&mut events, recipient, pruned, now);
        events.push(LedgerEvent::Minted {
            to: recipient.clone(),
            amount,
            at: now,
        });
        info!(%recipient, amount = %amount, at = now, "minted");
        Ok(())
    }

    /// Moves `amount` of live value from `sender` to `recipient`.
    ///
    /// The sender's live batches are spent oldest first and a partially
    /// spent batch keeps its receipt time. The recipient always gets one new
    /// batch stamped now. Every check runs before the first mutation, so a
    /// failed transfer leaves both stores as they were.
    pub fn transfer(
        &self,
        sender: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if amount == 0 {
            return Err(TransferError::InvalidAmount);
        }
        if sender == recipient {
            return self.self_transfer(sender, amount);
        }

        // refuse underfunded senders before any store is created
        let Some(from) = self.existing_store(sender) else {
            return Err(refuse(sender, amount, 0));
        };
        let available = from.read().live_sum(self.clock.now(), self.window);
        if amount > available {
            return Err(refuse(sender, amount, available));
        }

        let to = self.store_or_create(recipient);
        let (mut from_guard, mut to_guard) = if sender < recipient {
            let from_guard = from.write();
            (from_guard, to.write())
        } else {
            let to_guard = to.write();
            (from.write(), to_guard)
        };
        let (from_store, to_store) = (&mut *from_guard, &mut *to_guard);

        // authoritative check under both locks
        let now = self.clock.now();
        let available = from_store.live_sum(now, self.window);
        if amount > available {
            return Err(refuse(sender, amount, available));
        }

        let pruned_from = from_store.prune_expired(now, self.window);
        let consumed = from_store.consume(amount, now, self.window);
        debug_assert_eq!(consumed, amount);
        let pruned_to = to_store.prune_expired(now, self.window);
        to_store.append(amount, now);

        {
            let mut supply = self.supply.lock();
            supply.decayed = supply
                .decayed
                .saturating_add(pruned_from.amount)
                .saturating_add(pruned_to.amount);
        }
        let mut events = self.events.lock();
        push_expired(&mut events, sender, pruned_from, now);
        push_expired(&mut events, recipient, pruned_to, now);
        events.push(LedgerEvent::Transferred {
            from: sender.clone(),
            to: recipient.clone(),
            amount,
            at: now,
        });
        info!(%sender, %recipient, amount = %amount, at = now, "transferred");
        Ok(())
    }

    fn self_transfer(&self, account: &AccountId, amount: Amount) -> Result<(), TransferError> {
        match self.config.self_transfer {
            SelfTransferPolicy::Reject => Err(TransferError::SameAccount {
                account: account.clone(),
            }),
            SelfTransferPolicy::NoOp => {
                let available = self.balance_of(account);
                if amount > available {
                    return Err(TransferError::InsufficientBalance {
                        account: account.clone(),
                        requested: amount,
                        available,
                    });
                }
                debug!(%account, amount = %amount, "self transfer ignored");
                Ok(())
            }
        }
    }

    /// Sum of the account's live batches right now. Unknown accounts hold 0.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.with_store(account, |store| {
            store.live_sum(self.clock.now(), self.window)
        })
        .unwrap_or(0)
    }

    /// Everything held in the account's store, expired batches included.
    pub fn stored_balance_of(&self, account: &AccountId) -> Amount {
        self.with_store(account, BatchStore::raw_total).unwrap_or(0)
    }

    pub fn batches_of(&self, account: &AccountId) -> Vec<Batch> {
        self.with_store(account, |store| store.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// When the account's oldest live batch stops counting.
    pub fn next_expiry(&self, account: &AccountId) -> Option<Timestamp> {
        self.with_store(account, |store| {
            store.next_expiry(self.clock.now(), self.window)
        })
        .flatten()
    }

    pub fn total_supply(&self) -> Amount {
        self.supply.lock().total
    }

    /// Supply that expired and has been pruned from storage.
    pub fn decayed_supply(&self) -> Amount {
        self.supply.lock().decayed
    }

    /// Accounts currently holding at least one batch.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.accounts
            .read()
            .iter()
            .filter(|(_, store)| !store.read().is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().clone()
    }

    pub fn token(&self) -> &TokenConfig {
        &self.config.token
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn expiry_window(&self) -> ExpiryWindow {
        self.window
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Locks every store in account order plus the supply counters, giving
    /// a consistent view of the whole ledger. Empty stores are left out.
    pub(crate) fn frozen<R>(
        &self,
        f: impl FnOnce(&BTreeMap<AccountId, BatchStore>, Supply, &[LedgerEvent]) -> R,
    ) -> R {
        let accounts = self.accounts.read();
        let guards: Vec<_> = accounts
            .iter()
            .map(|(id, store)| (id, store.read()))
            .collect();
        let supply = *self.supply.lock();
        let events = self.events.lock();
        let stores: BTreeMap<AccountId, BatchStore> = guards
            .iter()
            .filter(|(_, store)| !store.is_empty())
            .map(|(id, store)| ((*id).clone(), (**store).clone()))
            .collect();
        f(&stores, supply, &events)
    }

    fn with_store<R>(&self, account: &AccountId, f: impl FnOnce(&BatchStore) -> R) -> Option<R> {
        let store = self.existing_store(account)?;
        let guard = store.read();
        Some(f(&guard))
    }

    fn existing_store(&self, account: &AccountId) -> Option<SharedStore> {
        self.accounts.read().get(account).cloned()
    }

    fn store_or_create(&self, account: &AccountId) -> SharedStore {
        if let Some(store) = self.accounts.read().get(account) {
            return Arc::clone(store);
        }
        Arc::clone(
            self.accounts
                .write()
                .entry(account.clone())
                .or_insert_with(|| Arc::new(RwLock::new(BatchStore::new()))),
        )
    }
}

/// Amounts travel as decimal strings: they exceed what JSON numbers carry
/// reliably and internally tagged enums cannot buffer 128-bit integers.
pub(crate) mod serde_amount {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

fn refuse(sender: &AccountId, requested: Amount, available: Amount) -> TransferError {
    warn!(%sender, requested = %requested, available = %available, "transfer refused");
    TransferError::InsufficientBalance {
        account: sender.clone(),
        requested,
        available,
    }
}

fn push_expired(events: &mut Vec<LedgerEvent>, account: &AccountId, pruned: Pruned, at: Timestamp) {
    if pruned.batches > 0 {
        events.push(LedgerEvent::Expired {
            account: account.clone(),
            amount: pruned.amount,
            batches: pruned.batches,
            at,
        });
    }
}
