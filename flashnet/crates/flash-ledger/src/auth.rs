//! Issuer capability check consulted by [`Ledger::mint`](crate::Ledger::mint).
//!
//! The ledger does not authenticate anyone. Whoever fronts it resolves the
//! caller's identity and the authority only answers whether that identity
//! may create supply.

use crate::ledger::AccountId;

pub trait MintAuthority: Send + Sync {
    fn may_mint(&self, caller: &AccountId) -> bool;
}

/// Exactly one account may mint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleIssuer(AccountId);

impl SingleIssuer {
    pub fn new(issuer: impl Into<AccountId>) -> Self {
        Self(issuer.into())
    }

    pub fn issuer(&self) -> &AccountId {
        &self.0
    }
}

impl MintAuthority for SingleIssuer {
    fn may_mint(&self, caller: &AccountId) -> bool {
        *caller == self.0
    }
}

/// Lets every caller mint. Tooling only.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenMint;

impl MintAuthority for OpenMint {
    fn may_mint(&self, _caller: &AccountId) -> bool {
        true
    }
}
