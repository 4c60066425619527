//! The claimable balance vault: holds claim-later cashback per account.
//!
//! Grants and revocations are driven only by the cashback engine's operator
//! account; claims are driven by the operational manager.

use crate::domain::ports::{Authorizer, Capability, Clock, TokenLedger};
use crate::domain::{AccountId, TokenAmount};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAccount {
    /// Claimable right now.
    pub balance: TokenAmount,
    /// Cumulative amount ever granted.
    pub total_amount: TokenAmount,
    pub total_claimed: TokenAmount,
    pub last_grant_time: Option<DateTime<Utc>>,
    pub last_claim_time: Option<DateTime<Utc>>,
}

impl VaultAccount {
    fn empty() -> Self {
        Self {
            balance: 0,
            total_amount: 0,
            total_claimed: 0,
            last_grant_time: None,
            last_claim_time: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// The vault's own pool account.
    pub vault_account: AccountId,
    /// The only account allowed to grant and revoke: the cashback engine's
    /// operator account.
    pub distributor: AccountId,
}

pub struct CashbackVault {
    config: VaultConfig,
    token: Arc<dyn TokenLedger>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    accounts: RwLock<HashMap<AccountId, VaultAccount>>,
}

impl CashbackVault {
    pub fn new(
        config: VaultConfig,
        token: Arc<dyn TokenLedger>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            token,
            authorizer,
            clock,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Compatibility probe for swap-in checks. Must not fail.
    pub fn probe(&self) -> Result<()> {
        Ok(())
    }

    pub fn balance_of(&self, account: AccountId) -> TokenAmount {
        self.accounts
            .read()
            .expect("vault lock poisoned")
            .get(&account)
            .map_or(0, |a| a.balance)
    }

    pub fn account(&self, account: AccountId) -> Option<VaultAccount> {
        self.accounts
            .read()
            .expect("vault lock poisoned")
            .get(&account)
            .cloned()
    }

    /// Pulls `amount` from the caller into the vault pool and records it as
    /// claimable by `account`.
    pub fn grant(&self, caller: AccountId, account: AccountId, amount: TokenAmount) -> Result<()> {
        self.require_distributor(caller)?;
        if account == 0 {
            return Err(PaymentError::ZeroAccount);
        }
        if amount == 0 {
            return Err(PaymentError::ZeroAmount);
        }
        self.token.transfer(caller, self.config.vault_account, amount)?;
        let mut accounts = self.accounts.write().expect("vault lock poisoned");
        let entry = accounts.entry(account).or_insert_with(VaultAccount::empty);
        entry.balance += amount;
        entry.total_amount += amount;
        entry.last_grant_time = Some(self.clock.now());
        log::debug!("vault granted {amount} to account {account}");
        Ok(())
    }

    /// Pushes `amount` from the vault pool back to the caller, reducing the
    /// account's claimable balance.
    pub fn revoke(&self, caller: AccountId, account: AccountId, amount: TokenAmount) -> Result<()> {
        self.require_distributor(caller)?;
        if amount == 0 {
            return Err(PaymentError::ZeroAmount);
        }
        let mut accounts = self.accounts.write().expect("vault lock poisoned");
        let entry = accounts.get_mut(&account).ok_or(PaymentError::VaultBalanceTooLow {
            amount,
            balance: 0,
        })?;
        if entry.balance < amount {
            return Err(PaymentError::VaultBalanceTooLow {
                amount,
                balance: entry.balance,
            });
        }
        self.token.transfer(self.config.vault_account, caller, amount)?;
        entry.balance -= amount;
        log::debug!("vault revoked {amount} from account {account}");
        Ok(())
    }

    /// Pays out part of the account's claimable balance directly to it.
    pub fn claim(&self, caller: AccountId, account: AccountId, amount: TokenAmount) -> Result<()> {
        self.authorize_manager(caller)?;
        if amount == 0 {
            return Err(PaymentError::ZeroAmount);
        }
        self.claim_inner(account, amount)
    }

    /// Pays out the account's whole claimable balance; fails when there is
    /// nothing to claim.
    pub fn claim_all(&self, caller: AccountId, account: AccountId) -> Result<TokenAmount> {
        self.authorize_manager(caller)?;
        let balance = self.balance_of(account);
        if balance == 0 {
            return Err(PaymentError::NothingToClaim);
        }
        self.claim_inner(account, balance)?;
        Ok(balance)
    }

    fn claim_inner(&self, account: AccountId, amount: TokenAmount) -> Result<()> {
        let mut accounts = self.accounts.write().expect("vault lock poisoned");
        let entry = accounts.get_mut(&account).ok_or(PaymentError::VaultBalanceTooLow {
            amount,
            balance: 0,
        })?;
        if entry.balance < amount {
            return Err(PaymentError::VaultBalanceTooLow {
                amount,
                balance: entry.balance,
            });
        }
        self.token.transfer(self.config.vault_account, account, amount)?;
        entry.balance -= amount;
        entry.total_claimed += amount;
        entry.last_claim_time = Some(self.clock.now());
        log::debug!("vault paid out {amount} to account {account}");
        Ok(())
    }

    fn require_distributor(&self, caller: AccountId) -> Result<()> {
        if caller == self.config.distributor {
            Ok(())
        } else {
            Err(PaymentError::Unauthorized {
                caller,
                capability: Capability::DistributeCashback,
            })
        }
    }

    fn authorize_manager(&self, caller: AccountId) -> Result<()> {
        if self.authorizer.authorize(caller, Capability::ManageVault) {
            Ok(())
        } else {
            Err(PaymentError::Unauthorized {
                caller,
                capability: Capability::ManageVault,
            })
        }
    }
}
