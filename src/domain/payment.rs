//! Payment records and the payer/sponsor settlement arithmetic.
//!
//! All splits are derived, never stored: the record keeps the cumulative
//! base/extra/refund/confirmed amounts and every payer/sponsor share is
//! recomputed from them on demand.

use crate::domain::{AccountId, TokenAmount};
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cashback rates are expressed per-mille of the rewarded base amount.
pub const RATE_FACTOR: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Active,
    Revoked,
    Reversed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Active => write!(f, "active"),
            PaymentStatus::Revoked => write!(f, "revoked"),
            PaymentStatus::Reversed => write!(f, "reversed"),
        }
    }
}

/// Terminal state selected when canceling a payment. A revoked payment may
/// be remade under the same id; a reversed one is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTarget {
    Revoked,
    Reversed,
}

impl CancelTarget {
    pub fn status(self) -> PaymentStatus {
        match self {
            CancelTarget::Revoked => PaymentStatus::Revoked,
            CancelTarget::Reversed => PaymentStatus::Reversed,
        }
    }
}

/// Sponsor terms attached to a subsidized payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorTerms {
    pub sponsor: AccountId,
    /// Maximum amount the sponsor is willing to cover.
    pub subsidy_limit: TokenAmount,
}

/// Split of an amount between the payer and the sponsor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmountSplit {
    pub payer: TokenAmount,
    pub sponsor: TokenAmount,
}

/// Adds the two face-value components, rejecting sums that leave the 64-bit
/// amount domain.
pub fn checked_sum(base_amount: TokenAmount, extra_amount: TokenAmount) -> Result<TokenAmount> {
    base_amount
        .checked_add(extra_amount)
        .ok_or(PaymentError::SumAmountOverflow)
}

/// Splits a payment sum: the sponsor covers up to the subsidy limit, the
/// payer covers the rest.
pub fn split_sum(sum_amount: TokenAmount, subsidy_limit: TokenAmount) -> AmountSplit {
    let sponsor = subsidy_limit.min(sum_amount);
    AmountSplit {
        payer: sum_amount - sponsor,
        sponsor,
    }
}

/// Splits a cumulative refund. When the base amount exceeds the subsidy
/// limit the sponsor share is proportional to its share of the base amount;
/// otherwise the sponsor absorbs the refund up to the limit.
pub fn split_refund(
    refund_amount: TokenAmount,
    base_amount: TokenAmount,
    subsidy_limit: TokenAmount,
) -> AmountSplit {
    let sponsor = if subsidy_limit == 0 {
        0
    } else if base_amount > subsidy_limit {
        let proportional =
            (u128::from(refund_amount) * u128::from(subsidy_limit) / u128::from(base_amount)) as TokenAmount;
        subsidy_limit.min(proportional)
    } else {
        refund_amount.min(subsidy_limit)
    };
    AmountSplit {
        payer: refund_amount - sponsor,
        sponsor,
    }
}

/// A payment record as stored in the ledger's keyed map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub status: PaymentStatus,
    pub payer: AccountId,
    pub sponsor: Option<SponsorTerms>,
    pub base_amount: TokenAmount,
    pub extra_amount: TokenAmount,
    /// Cumulative amount refunded so far.
    pub refund_amount: TokenAmount,
    /// Cumulative amount moved to the cash-out account.
    pub confirmed_amount: TokenAmount,
    /// Rate in effect for this payment, fixed at creation.
    pub cashback_rate: u16,
}

impl Payment {
    pub fn sum_amount(&self) -> TokenAmount {
        // The constructor checked the sum, so this cannot wrap.
        self.base_amount + self.extra_amount
    }

    pub fn subsidy_limit(&self) -> TokenAmount {
        self.sponsor.map_or(0, |terms| terms.subsidy_limit)
    }

    /// Portion of the payment not yet refunded.
    pub fn remainder(&self) -> TokenAmount {
        self.sum_amount() - self.refund_amount
    }

    pub fn split_sum(&self) -> AmountSplit {
        split_sum(self.sum_amount(), self.subsidy_limit())
    }

    pub fn split_refund(&self) -> AmountSplit {
        split_refund(self.refund_amount, self.base_amount, self.subsidy_limit())
    }

    /// Per-party remainders. The refund split never exceeds the sum split
    /// party-by-party, so the subtractions cannot wrap.
    pub fn remainders(&self) -> AmountSplit {
        let sum = self.split_sum();
        let refund = self.split_refund();
        AmountSplit {
            payer: sum.payer - refund.payer,
            sponsor: sum.sponsor - refund.sponsor,
        }
    }

    pub fn snapshot(&self) -> PaymentSnapshot {
        PaymentSnapshot {
            payer: self.payer,
            sponsor: self.sponsor,
            base_amount: self.base_amount,
            extra_amount: self.extra_amount,
            refund_amount: self.refund_amount,
            confirmed_amount: self.confirmed_amount,
            cashback_rate: self.cashback_rate,
        }
    }
}

/// Immutable copy of a payment's observable fields, handed to lifecycle
/// observers as the pre- and post-operation views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub payer: AccountId,
    pub sponsor: Option<SponsorTerms>,
    pub base_amount: TokenAmount,
    pub extra_amount: TokenAmount,
    pub refund_amount: TokenAmount,
    pub confirmed_amount: TokenAmount,
    pub cashback_rate: u16,
}

impl PaymentSnapshot {
    pub fn subsidy_limit(&self) -> TokenAmount {
        self.sponsor.map_or(0, |terms| terms.subsidy_limit)
    }

    pub fn split_refund(&self) -> AmountSplit {
        split_refund(self.refund_amount, self.base_amount, self.subsidy_limit())
    }

    /// The payer-funded, non-subsidized part of the base amount that is
    /// still live; this is the cashback-bearing amount. The extra amount
    /// never accrues cashback.
    pub fn cashback_base(&self) -> TokenAmount {
        self.base_amount
            .saturating_sub(self.subsidy_limit())
            .saturating_sub(self.split_refund().payer)
    }

    /// The post-cancel view: identities are retained, every amount is zero.
    pub fn zeroed(&self) -> PaymentSnapshot {
        PaymentSnapshot {
            payer: self.payer,
            sponsor: self.sponsor.map(|terms| SponsorTerms {
                sponsor: terms.sponsor,
                subsidy_limit: 0,
            }),
            base_amount: 0,
            extra_amount: 0,
            refund_amount: 0,
            confirmed_amount: 0,
            cashback_rate: self.cashback_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(base: u64, extra: u64, subsidy: u64) -> Payment {
        let sponsor = (subsidy > 0).then_some(SponsorTerms {
            sponsor: 3,
            subsidy_limit: subsidy,
        });
        Payment {
            status: PaymentStatus::Active,
            payer: 2,
            sponsor,
            base_amount: base,
            extra_amount: extra,
            refund_amount: 0,
            confirmed_amount: 0,
            cashback_rate: 0,
        }
    }

    #[test]
    fn test_split_sum_partial_subsidy() {
        let split = split_sum(1400, 800);
        assert_eq!(split.payer, 600);
        assert_eq!(split.sponsor, 800);
    }

    #[test]
    fn test_split_sum_full_subsidy() {
        let split = split_sum(1400, 2000);
        assert_eq!(split.payer, 0);
        assert_eq!(split.sponsor, 1400);
    }

    #[test]
    fn test_split_sum_conserves_total() {
        let sum = 1357;
        for subsidy in 0..=(sum * 2) {
            let split = split_sum(sum, subsidy);
            assert_eq!(split.payer + split.sponsor, sum);
            assert!(split.sponsor <= subsidy);
        }
    }

    #[test]
    fn test_split_refund_proportional() {
        // base > subsidy: sponsor takes its proportional share.
        let split = split_refund(400, 1000, 800);
        assert_eq!(split.sponsor, 320);
        assert_eq!(split.payer, 80);
    }

    #[test]
    fn test_split_refund_subsidy_covers_base() {
        // base <= subsidy: sponsor absorbs the refund up to the limit.
        let split = split_refund(700, 500, 600);
        assert_eq!(split.sponsor, 600);
        assert_eq!(split.payer, 100);
    }

    #[test]
    fn test_split_refund_no_sponsor() {
        let split = split_refund(400, 1000, 0);
        assert_eq!(split.sponsor, 0);
        assert_eq!(split.payer, 400);
    }

    #[test]
    fn test_refund_share_never_exceeds_sum_share() {
        // The per-party remainder subtraction relies on this holding for
        // every refund amount up to the full sum.
        for subsidy in [0, 300, 500, 800, 1300, 2000] {
            let mut p = payment(1000, 400, subsidy);
            for refund in 0..=p.sum_amount() {
                p.refund_amount = refund;
                let sum = p.split_sum();
                let ref_split = p.split_refund();
                assert!(ref_split.payer <= sum.payer, "subsidy={subsidy} refund={refund}");
                assert!(ref_split.sponsor <= sum.sponsor, "subsidy={subsidy} refund={refund}");
            }
        }
    }

    #[test]
    fn test_checked_sum_overflow() {
        assert!(matches!(
            checked_sum(u64::MAX, 1),
            Err(PaymentError::SumAmountOverflow)
        ));
        assert_eq!(checked_sum(u64::MAX - 1, 1).unwrap(), u64::MAX);
    }

    #[test]
    fn test_cashback_base_excludes_subsidy_and_payer_refund() {
        let mut p = payment(1000, 600, 800);
        assert_eq!(p.snapshot().cashback_base(), 200);

        p.refund_amount = 400; // payer share of the refund is 80
        assert_eq!(p.snapshot().cashback_base(), 120);
    }

    #[test]
    fn test_zeroed_snapshot_keeps_identities() {
        let p = payment(1000, 400, 800);
        let zeroed = p.snapshot().zeroed();
        assert_eq!(zeroed.payer, p.payer);
        assert!(zeroed.sponsor.is_some());
        assert_eq!(zeroed.base_amount, 0);
        assert_eq!(zeroed.subsidy_limit(), 0);
        assert_eq!(zeroed.cashback_base(), 0);
    }
}
