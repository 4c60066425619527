//! The cashback accounting engine, registered as a lifecycle observer.
//!
//! On every ledger notification the engine recomputes the cashback a payment
//! should carry from the new snapshot and settles the delta against the
//! stored balance: increases flow from the treasury (directly to the payer
//! or into the vault in claimable mode) under the rolling per-account cap;
//! decreases reclaim previously granted funds and always succeed in full.

use crate::application::dispatcher::{
    CanceledHandler, LifecycleObserver, MadeHandler, UpdatedHandler,
};
use crate::application::vault::CashbackVault;
use crate::domain::cashback::{
    AccountCashback, CashbackOutcome, CashbackStatus, PaymentCashback, cashback_amount,
};
use crate::domain::payment::PaymentSnapshot;
use crate::domain::ports::{Authorizer, Capability, Clock, TokenLedger};
use crate::domain::{AccountId, PaymentId, TokenAmount};
use crate::error::{PaymentError, Result};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct CashbackConfig {
    /// Funding account cashback is drawn from and reclaimed to.
    pub treasury: AccountId,
    /// The engine's own flow-through account; also the vault distributor.
    pub operator_account: AccountId,
    /// Granted amounts are rounded half-up to a multiple of this.
    pub rounding_coef: TokenAmount,
    /// Maximum cashback an account may collect within one cap window.
    pub cap_amount: TokenAmount,
    pub cap_period: Duration,
}

#[derive(Default)]
struct CashbackBook {
    payments: HashMap<PaymentId, PaymentCashback>,
    accounts: HashMap<AccountId, AccountCashback>,
}

pub struct CashbackEngine {
    config: CashbackConfig,
    token: Arc<dyn TokenLedger>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    /// Present in claimable mode: grants land here instead of the payer.
    vault: Option<Arc<CashbackVault>>,
    book: RwLock<CashbackBook>,
}

impl CashbackEngine {
    pub fn new(
        config: CashbackConfig,
        token: Arc<dyn TokenLedger>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        vault: Option<Arc<CashbackVault>>,
    ) -> Self {
        Self {
            config,
            token,
            authorizer,
            clock,
            vault,
            book: RwLock::new(CashbackBook::default()),
        }
    }

    pub fn payment_cashback(&self, id: PaymentId) -> Option<PaymentCashback> {
        self.book
            .read()
            .expect("cashback book lock poisoned")
            .payments
            .get(&id)
            .copied()
    }

    pub fn account_cashback(&self, account: AccountId) -> Option<AccountCashback> {
        self.book
            .read()
            .expect("cashback book lock poisoned")
            .accounts
            .get(&account)
            .cloned()
    }

    /// Manual override: sets the payment's cashback balance to `new_amount`
    /// through the regular increase/decrease machinery. Requires an existing
    /// cashback record.
    pub fn correct_cashback_amount(
        &self,
        caller: AccountId,
        id: PaymentId,
        new_amount: TokenAmount,
    ) -> Result<CashbackOutcome> {
        if !self.authorizer.authorize(caller, Capability::DistributeCashback) {
            return Err(PaymentError::Unauthorized {
                caller,
                capability: Capability::DistributeCashback,
            });
        }
        let stored = self
            .payment_cashback(id)
            .ok_or(PaymentError::CashbackNotFound(id))?;
        if new_amount > stored.balance {
            self.increase(id, stored.recipient, new_amount - stored.balance)
        } else if new_amount < stored.balance {
            self.decrease(id, stored.balance - new_amount)?;
            Ok(CashbackOutcome {
                status: CashbackStatus::Success,
                amount: stored.balance - new_amount,
            })
        } else {
            Ok(CashbackOutcome {
                status: CashbackStatus::Success,
                amount: 0,
            })
        }
    }

    /// Cashback the snapshot should carry under its own rate.
    fn desired(&self, snapshot: &PaymentSnapshot) -> TokenAmount {
        cashback_amount(
            snapshot.cashback_base(),
            snapshot.cashback_rate,
            self.config.rounding_coef,
        )
    }

    /// Settles `desired - stored` for the payment, in either direction.
    fn reconcile(&self, id: PaymentId, snapshot: &PaymentSnapshot) -> Result<()> {
        let desired = self.desired(snapshot);
        let stored = self.payment_cashback(id).map_or(0, |p| p.balance);
        if desired > stored {
            self.increase(id, snapshot.payer, desired - stored)?;
        } else if desired < stored {
            self.decrease(id, stored - desired)?;
        }
        Ok(())
    }

    /// Grants up to `amount` more cashback against the payment, subject to
    /// the rolling cap and treasury funding. Capping and treasury shortfall
    /// are business outcomes, not errors.
    fn increase(
        &self,
        id: PaymentId,
        recipient: AccountId,
        amount: TokenAmount,
    ) -> Result<CashbackOutcome> {
        let now = self.clock.now();
        let mut book = self.book.write().expect("cashback book lock poisoned");
        let book = &mut *book;
        let account = book
            .accounts
            .entry(recipient)
            .or_insert_with(|| AccountCashback::new(now));
        let saved = account.clone();
        let outcome = account.admit(amount, self.config.cap_amount, self.config.cap_period, now);
        if outcome.amount == 0 {
            log::warn!("cashback for payment {id} fully capped (requested {amount})");
            return Ok(outcome);
        }
        let accepted = outcome.amount;
        if self.token.balance_of(self.config.treasury) < accepted
            || self.token.allowance_of(self.config.treasury) < accepted
        {
            // Roll the cap window back to before the attempt.
            *account = saved;
            log::warn!("cashback treasury cannot fund {accepted} for payment {id}");
            return Ok(CashbackOutcome {
                status: CashbackStatus::OutOfFunds,
                amount: 0,
            });
        }
        match &self.vault {
            None => {
                self.token
                    .transfer_from(self.config.treasury, recipient, accepted)?;
            }
            Some(vault) => {
                self.token
                    .transfer_from(self.config.treasury, self.config.operator_account, accepted)?;
                vault.grant(self.config.operator_account, recipient, accepted)?;
            }
        }
        account.total_amount += accepted;
        let entry = book
            .payments
            .entry(id)
            .or_insert(PaymentCashback {
                balance: 0,
                recipient,
            });
        entry.balance += accepted;
        if outcome.status == CashbackStatus::Partial {
            log::warn!("cashback for payment {id} partially capped: {accepted} of {amount}");
        } else {
            log::debug!("cashback for payment {id} increased by {accepted}");
        }
        Ok(outcome)
    }

    /// Reverses `amount` of previously granted cashback: reclaims from the
    /// vault balance first, then from the recipient, and pushes the full
    /// amount back to the treasury. A decrease has no partial outcome; the
    /// funds were verifiably granted, so failure to find them is fatal.
    fn decrease(&self, id: PaymentId, amount: TokenAmount) -> Result<()> {
        let mut book = self.book.write().expect("cashback book lock poisoned");
        let book = &mut *book;
        let entry = book
            .payments
            .get_mut(&id)
            .ok_or(PaymentError::CashbackNotFound(id))?;
        let recipient = entry.recipient;

        let from_vault = match &self.vault {
            Some(vault) => vault.balance_of(recipient).min(amount),
            None => 0,
        };
        if let Some(vault) = &self.vault
            && from_vault > 0
        {
            vault.revoke(self.config.operator_account, recipient, from_vault)?;
        }
        let from_recipient = amount - from_vault;
        if from_recipient > 0 {
            self.token
                .transfer_from(recipient, self.config.operator_account, from_recipient)?;
        }
        self.token
            .transfer(self.config.operator_account, self.config.treasury, amount)?;

        entry.balance = entry.balance.saturating_sub(amount);
        if let Some(account) = book.accounts.get_mut(&recipient) {
            account.total_amount = account.total_amount.saturating_sub(amount);
        }
        log::debug!("cashback for payment {id} decreased by {amount}");
        Ok(())
    }
}

impl LifecycleObserver for CashbackEngine {
    fn name(&self) -> &str {
        "cashback-engine"
    }

    fn as_made(&self) -> Option<&dyn MadeHandler> {
        Some(self)
    }

    fn as_updated(&self) -> Option<&dyn UpdatedHandler> {
        Some(self)
    }

    fn as_canceled(&self) -> Option<&dyn CanceledHandler> {
        Some(self)
    }
}

impl MadeHandler for CashbackEngine {
    fn on_payment_made(&self, id: PaymentId, new: &PaymentSnapshot) -> Result<()> {
        if new.cashback_rate == 0 {
            return Ok(());
        }
        // Record the recipient even when nothing is owed yet, so a later
        // update finds it; the recipient stays fixed across remakes.
        {
            let mut book = self.book.write().expect("cashback book lock poisoned");
            book.payments.entry(id).or_insert(PaymentCashback {
                balance: 0,
                recipient: new.payer,
            });
        }
        let desired = self.desired(new);
        if desired > 0 {
            let recipient = self
                .payment_cashback(id)
                .map_or(new.payer, |p| p.recipient);
            self.increase(id, recipient, desired)?;
        }
        Ok(())
    }
}

impl UpdatedHandler for CashbackEngine {
    fn on_payment_updated(
        &self,
        id: PaymentId,
        _old: &PaymentSnapshot,
        new: &PaymentSnapshot,
    ) -> Result<()> {
        self.reconcile(id, new)
    }
}

impl CanceledHandler for CashbackEngine {
    fn on_payment_canceled(
        &self,
        id: PaymentId,
        _old: &PaymentSnapshot,
        new: &PaymentSnapshot,
    ) -> Result<()> {
        self.reconcile(id, new)
    }
}
