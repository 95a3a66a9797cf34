use thiserror::Error;

use crate::ledger::{AccountId, Amount};

/// Reasons a mint is refused. A refused mint leaves the ledger untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MintError {
    /// The caller does not hold the issuer capability.
    #[error("account {caller} is not allowed to mint")]
    Unauthorized { caller: AccountId },

    /// Zero amounts are rejected.
    #[error("mint amount must be greater than zero")]
    InvalidAmount,

    /// Total supply would no longer fit the amount representation.
    #[error("minting {amount} would overflow total supply {total_supply}")]
    SupplyOverflow { total_supply: Amount, amount: Amount },
}

/// Reasons a transfer is refused. Neither store is modified on failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer amount must be greater than zero")]
    InvalidAmount,

    /// Sender and recipient are the same account under the reject policy.
    #[error("account {account} cannot transfer to itself")]
    SameAccount { account: AccountId },

    /// Only live batches are spendable.
    #[error("account {account} holds {available} spendable, {requested} requested")]
    InsufficientBalance {
        account: AccountId,
        requested: Amount,
        available: Amount,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid ledger config: {0}")]
    Invalid(String),

    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config decode: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,

    #[error("malformed amount {0:?}")]
    Malformed(String),

    #[error("amount {text:?} has more than {decimals} fractional digits")]
    TooPrecise { text: String, decimals: u8 },

    #[error("amount {0:?} does not fit the ledger's amount type")]
    Overflow(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("state root mismatch: recorded {recorded}, computed {computed}")]
    RootMismatch { recorded: String, computed: String },

    /// Stored batches plus decayed amount must add up to total supply.
    #[error("supply mismatch: total supply {total_supply}, accounted {accounted}")]
    SupplyMismatch { total_supply: Amount, accounted: Amount },

    #[error("snapshot expiry window {snapshot}s differs from configured {configured}s")]
    WindowMismatch { snapshot: u64, configured: u64 },

    #[error("batches of account {0} are not ordered by receipt time")]
    UnorderedBatches(AccountId),

    #[error("snapshot config: {0}")]
    Config(#[from] ConfigError),
}
