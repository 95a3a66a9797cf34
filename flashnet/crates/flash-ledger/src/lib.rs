//! Expiring-deposit ledger for the Flash token.
//!
//! Balances are not running totals. Every credit lands in the receiving
//! account as a time-stamped batch, and a batch stops counting towards the
//! holder's balance once it is older than the ledger's expiry window, even
//! though no transaction removed it. The crate is split into:
//!
//! * [`clock`] — time sources (wall, monotonic, manual).
//! * [`batch`] — the per-account batch store and the expiry window.
//! * [`auth`] — the issuer capability check consulted by mint.
//! * [`config`] — token metadata and ledger policy.
//! * [`ledger`] — mint, transfer and the balance read path.
//! * [`snapshot`] — serialisable state with a SHA-256 state root.
//! * [`units`] — whole-token/smallest-unit conversion.

pub mod auth;
pub mod batch;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod snapshot;
pub mod units;

mod error;

pub use auth::{MintAuthority, OpenMint, SingleIssuer};
pub use batch::{Batch, BatchStore, ExpiryWindow, Pruned};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock, Timestamp, SECONDS_PER_DAY};
pub use config::{LedgerConfig, SelfTransferPolicy, TokenConfig};
pub use error::{ConfigError, MintError, SnapshotError, TransferError, UnitsError};
pub use ledger::{AccountId, Amount, Ledger, LedgerEvent};
pub use snapshot::{LedgerSnapshot, SnapshotMeta};
pub use units::{format_units, parse_units};
