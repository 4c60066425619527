//! Ports to the external collaborators: the fungible token ledger, the
//! authorization policy, wall-clock time, and the audit trail.

use crate::domain::notification::NotificationRecord;
use crate::domain::{AccountId, TokenAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance: account {account} holds {balance}, needs {needed}")]
    InsufficientBalance {
        account: AccountId,
        balance: TokenAmount,
        needed: TokenAmount,
    },
    #[error("insufficient allowance: owner {owner} allows {allowance}, needs {needed}")]
    InsufficientAllowance {
        owner: AccountId,
        allowance: TokenAmount,
        needed: TokenAmount,
    },
}

/// The balance/allowance-based transfer primitive the core settles through.
/// A failed transfer is never retried; it aborts the enclosing operation.
pub trait TokenLedger: Send + Sync {
    /// Moves tokens between accounts the core controls.
    fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: TokenAmount,
    ) -> Result<(), TokenError>;

    /// Pulls tokens from `owner` under the allowance granted to the core.
    fn transfer_from(
        &self,
        owner: AccountId,
        to: AccountId,
        amount: TokenAmount,
    ) -> Result<(), TokenError>;

    fn balance_of(&self, account: AccountId) -> TokenAmount;

    /// Remaining allowance `owner` has granted to the core.
    fn allowance_of(&self, owner: AccountId) -> TokenAmount;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Submit payment lifecycle operations.
    ExecutePayments,
    /// Register and unregister lifecycle observers.
    ManageObservers,
    /// Correct cashback amounts and drive vault grants.
    DistributeCashback,
    /// Claim vault balances on behalf of accounts.
    ManageVault,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ExecutePayments => write!(f, "execute-payments"),
            Capability::ManageObservers => write!(f, "manage-observers"),
            Capability::DistributeCashback => write!(f, "distribute-cashback"),
            Capability::ManageVault => write!(f, "manage-vault"),
        }
    }
}

/// Opaque capability check consulted before any core logic runs.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, caller: AccountId, capability: Capability) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Destination of the durable lifecycle audit trail.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &NotificationRecord) -> crate::error::Result<()>;
}
