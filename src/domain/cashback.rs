//! Cashback bookkeeping: the rounding rule, the rolling cap window, and the
//! per-payment / per-account records.

use crate::domain::payment::RATE_FACTOR;
use crate::domain::{AccountId, TokenAmount};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashbackStatus {
    /// The full requested amount was granted.
    Success,
    /// Only part of the requested amount fit under the cap.
    Partial,
    /// Nothing fit under the cap.
    Capped,
    /// The treasury could not fund the grant; nothing was granted.
    OutOfFunds,
}

/// The business outcome of a cashback increase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashbackOutcome {
    pub status: CashbackStatus,
    pub amount: TokenAmount,
}

/// Rounds half-up to the nearest multiple of the rounding coefficient.
pub fn round_to_coef(amount: TokenAmount, coef: TokenAmount) -> TokenAmount {
    if coef <= 1 {
        return amount;
    }
    let rounded = (u128::from(amount) + u128::from(coef / 2)) / u128::from(coef) * u128::from(coef);
    rounded as TokenAmount
}

/// Cashback owed on a cashback-bearing amount at the given per-mille rate,
/// rounded to the coefficient.
pub fn cashback_amount(cashback_base: TokenAmount, rate: u16, coef: TokenAmount) -> TokenAmount {
    let raw = u128::from(cashback_base) * u128::from(rate) / u128::from(RATE_FACTOR);
    round_to_coef(raw as TokenAmount, coef)
}

/// Cumulative cashback granted against one payment id. Survives revocation
/// and remake of the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCashback {
    pub balance: TokenAmount,
    /// The payer the cashback is owed to, fixed when first recorded.
    pub recipient: AccountId,
}

/// Per-account cashback totals and the state of the rolling cap window.
///
/// The cap is a fixed window with rebaseline, not a true sliding window: a
/// burst straddling the window boundary can collect close to twice the
/// nominal cap. Consumers depend on this boundary behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCashback {
    /// Cumulative cashback ever granted to the account.
    pub total_amount: TokenAmount,
    /// `total_amount` as of the start of the current cap window.
    pub cap_period_start_amount: TokenAmount,
    pub cap_period_start: DateTime<Utc>,
}

impl AccountCashback {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_amount: 0,
            cap_period_start_amount: 0,
            cap_period_start: now,
        }
    }

    /// Admits up to `requested` under the rolling cap, rebaselining the
    /// window first when it has elapsed. Does not touch `total_amount`; the
    /// caller adds what it actually settles.
    pub fn admit(
        &mut self,
        requested: TokenAmount,
        cap: TokenAmount,
        period: Duration,
        now: DateTime<Utc>,
    ) -> CashbackOutcome {
        if now.signed_duration_since(self.cap_period_start) > period {
            self.cap_period_start = now;
            self.cap_period_start_amount = self.total_amount;
        }
        let collected = self.total_amount.saturating_sub(self.cap_period_start_amount);
        let available = cap.saturating_sub(collected);
        if available == 0 {
            return CashbackOutcome {
                status: CashbackStatus::Capped,
                amount: 0,
            };
        }
        let accepted = requested.min(available);
        let status = if accepted == requested {
            CashbackStatus::Success
        } else {
            CashbackStatus::Partial
        };
        CashbackOutcome {
            status,
            amount: accepted,
        }
    }
}
