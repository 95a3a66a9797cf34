//! Token metadata and ledger policy.
//!
//! Every field has a default matching the deployed FlashToken, so an empty
//! JSON object is a valid config.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::batch::ExpiryWindow;
use crate::error::ConfigError;
use crate::ledger::{AccountId, Amount};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "FlashToken".into(),
            symbol: "FT".into(),
            decimals: 18,
        }
    }
}

/// What a transfer from an account to itself does.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelfTransferPolicy {
    /// Fail with `SameAccount`.
    #[default]
    Reject,
    /// Validate amount and live balance, then change nothing.
    NoOp,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    pub token: TokenConfig,
    /// The only identity allowed to mint.
    pub issuer: AccountId,
    /// Receives the genesis issuance.
    pub reserve_account: AccountId,
    /// Genesis issuance in whole tokens.
    pub initial_reserve: u64,
    /// Credit the genesis issuance as a batch that never expires.
    pub reserve_exempt: bool,
    pub expiry_window_secs: u64,
    pub self_transfer: SelfTransferPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            issuer: "deployer".into(),
            reserve_account: "flash-reserve".into(),
            initial_reserve: 50_000_000,
            reserve_exempt: true,
            expiry_window_secs: ExpiryWindow::default().as_secs(),
            self_transfer: SelfTransferPolicy::Reject,
        }
    }
}

impl LedgerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expiry_window_secs == 0 {
            return Err(ConfigError::Invalid("expiry window must be non-zero".into()));
        }
        if self.token.decimals > 38 {
            return Err(ConfigError::Invalid(format!(
                "{} decimals exceed the amount range",
                self.token.decimals
            )));
        }
        if self.issuer.is_empty() || self.reserve_account.is_empty() {
            return Err(ConfigError::Invalid(
                "issuer and reserve account must be named".into(),
            ));
        }
        self.initial_reserve_units()?;
        Ok(())
    }

    pub fn expiry_window(&self) -> ExpiryWindow {
        ExpiryWindow::from_secs(self.expiry_window_secs)
    }

    /// Genesis issuance in smallest units.
    pub fn initial_reserve_units(&self) -> Result<Amount, ConfigError> {
        (10 as Amount)
            .checked_pow(u32::from(self.token.decimals))
            .and_then(|scale| Amount::from(self.initial_reserve).checked_mul(scale))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "initial reserve {} does not fit with {} decimals",
                    self.initial_reserve, self.token.decimals
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: LedgerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.expiry_window_secs, 10 * 86_400);
        config.validate().unwrap();
    }

    #[test]
    fn reserve_units_scale_by_decimals() {
        let config = LedgerConfig::default();
        assert_eq!(
            config.initial_reserve_units().unwrap(),
            50_000_000 * 10u128.pow(18)
        );
    }

    #[test]
    fn partial_json_overrides_selected_fields() {
        let config: LedgerConfig = serde_json::from_str(
            r#"{"token":{"symbol":"FT***"},"expiry_window_secs":60,"self_transfer":"no_op"}"#,
        )
        .unwrap();
        assert_eq!(config.token.symbol, "FT***");
        assert_eq!(config.token.name, "FlashToken");
        assert_eq!(config.expiry_window().as_secs(), 60);
        assert_eq!(config.self_transfer, SelfTransferPolicy::NoOp);
    }

    #[test]
    fn zero_window_is_rejected() {
        let config = LedgerConfig {
            expiry_window_secs: 0,
            ..LedgerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn oversized_reserve_is_rejected() {
        let config = LedgerConfig {
            initial_reserve: u64::MAX,
            token: TokenConfig {
                decimals: 38,
                ..TokenConfig::default()
            },
            ..LedgerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
