//! Runtime configuration for the processor binary: the well-known accounts,
//! cashback parameters, and the token balances/allowances to seed.

use crate::domain::{AccountId, TokenAmount};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Account the backend submits operations as; receives the
    /// payment-execution and observer-management capabilities.
    pub operator_account: AccountId,
    /// The ledger's holding account for unconfirmed remainders.
    pub ledger_account: AccountId,
    /// Destination of confirmed amounts.
    pub cashout_account: AccountId,
    /// Funding account cashback is drawn from and reclaimed to.
    pub treasury_account: AccountId,
    /// The cashback engine's flow-through account; also the vault
    /// distributor and the holder of the cashback-correction capability.
    pub cashback_operator_account: AccountId,
    pub vault_account: AccountId,
    /// Holder of the vault-claim capability.
    pub vault_manager_account: AccountId,
    /// When set, granted cashback lands in the vault instead of being
    /// transferred to the payer immediately.
    pub claimable_cashback: bool,
    pub max_cashback_rate: u16,
    pub default_cashback_rate: u16,
    pub cashback_rounding_coef: TokenAmount,
    pub cashback_cap_amount: TokenAmount,
    pub cashback_cap_period_secs: u64,
    /// Token balances minted before processing, as `[account, amount]` pairs.
    pub initial_balances: Vec<(AccountId, TokenAmount)>,
    /// Allowances granted to the core, as `[owner, amount]` pairs;
    /// `u64::MAX` means unlimited.
    pub initial_allowances: Vec<(AccountId, TokenAmount)>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            operator_account: 1,
            ledger_account: 100,
            cashout_account: 101,
            treasury_account: 102,
            cashback_operator_account: 103,
            vault_account: 104,
            vault_manager_account: 105,
            claimable_cashback: false,
            max_cashback_rate: 500,
            default_cashback_rate: 0,
            cashback_rounding_coef: 1,
            cashback_cap_amount: 300_000_000,
            cashback_cap_period_secs: 30 * 24 * 60 * 60,
            initial_balances: Vec::new(),
            initial_allowances: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let json = r#"{
            "claimable_cashback": true,
            "default_cashback_rate": 200,
            "initial_balances": [[2, 1000000], [102, 500000]]
        }"#;
        let config: ProcessorConfig = serde_json::from_str(json).unwrap();
        assert!(config.claimable_cashback);
        assert_eq!(config.default_cashback_rate, 200);
        assert_eq!(config.initial_balances, vec![(2, 1_000_000), (102, 500_000)]);
        // Untouched fields keep their defaults.
        assert_eq!(config.operator_account, 1);
        assert_eq!(config.max_cashback_rate, 500);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = ProcessorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProcessorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cashback_cap_period_secs, config.cashback_cap_period_secs);
        assert_eq!(back.vault_account, config.vault_account);
    }
}
