//! Lifecycle notification records, the durable off-chain audit trail.
//!
//! Each record carries a format version tag, a subsidized flag, and the
//! before/after amount fields for the event. Sponsor fields are present only
//! on subsidized payments. Both the JSON form and the binary encoding keep
//! field order and presence stable; existing consumers reconcile against
//! them bit-for-bit.

use crate::domain::payment::PaymentSnapshot;
use crate::domain::{AccountId, PaymentId, TokenAmount};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NOTIFICATION_FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Made,
    Updated,
    Canceled,
}

impl LifecycleEventKind {
    fn code(self) -> u8 {
        match self {
            LifecycleEventKind::Made => 0,
            LifecycleEventKind::Updated => 1,
            LifecycleEventKind::Canceled => 2,
        }
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEventKind::Made => write!(f, "made"),
            LifecycleEventKind::Updated => write!(f, "updated"),
            LifecycleEventKind::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub version: u8,
    pub event: LifecycleEventKind,
    pub payment_id: PaymentId,
    pub payer: AccountId,
    pub subsidized: bool,
    pub old_base_amount: TokenAmount,
    pub old_extra_amount: TokenAmount,
    pub old_refund_amount: TokenAmount,
    pub old_confirmed_amount: TokenAmount,
    pub new_base_amount: TokenAmount,
    pub new_extra_amount: TokenAmount,
    pub new_refund_amount: TokenAmount,
    pub new_confirmed_amount: TokenAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsidy_limit: Option<TokenAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_sponsor_refund: Option<TokenAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_sponsor_refund: Option<TokenAmount>,
}

impl NotificationRecord {
    /// Builds the record for one lifecycle event. `old` is absent for the
    /// "made" event; cancel passes the zeroed snapshot as `new`.
    pub fn new(
        event: LifecycleEventKind,
        payment_id: PaymentId,
        old: Option<&PaymentSnapshot>,
        new: &PaymentSnapshot,
    ) -> Self {
        // Sponsor identity and limit come from the richer of the two views;
        // the zeroed post-cancel snapshot has already dropped the limit.
        let terms = old.and_then(|s| s.sponsor).or(new.sponsor);
        let subsidized = terms.is_some();
        Self {
            version: NOTIFICATION_FORMAT_VERSION,
            event,
            payment_id,
            payer: new.payer,
            subsidized,
            old_base_amount: old.map_or(0, |s| s.base_amount),
            old_extra_amount: old.map_or(0, |s| s.extra_amount),
            old_refund_amount: old.map_or(0, |s| s.refund_amount),
            old_confirmed_amount: old.map_or(0, |s| s.confirmed_amount),
            new_base_amount: new.base_amount,
            new_extra_amount: new.extra_amount,
            new_refund_amount: new.refund_amount,
            new_confirmed_amount: new.confirmed_amount,
            sponsor: terms.map(|t| t.sponsor),
            subsidy_limit: terms.map(|t| t.subsidy_limit),
            old_sponsor_refund: subsidized.then(|| old.map_or(0, |s| s.split_refund().sponsor)),
            new_sponsor_refund: subsidized.then(|| new.split_refund().sponsor),
        }
    }

    /// Fixed little-endian encoding:
    /// `[version][event][flags]` followed by `payment_id`, `payer`, the four
    /// old amounts and the four new amounts as little-endian `u64`s. When
    /// bit 0 of `flags` is set, `sponsor`, `subsidy_limit`,
    /// `old_sponsor_refund`, and `new_sponsor_refund` follow.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(if self.subsidized { 115 } else { 83 });
        out.push(self.version);
        out.push(self.event.code());
        out.push(u8::from(self.subsidized));
        for field in [
            self.payment_id,
            self.payer,
            self.old_base_amount,
            self.old_extra_amount,
            self.old_refund_amount,
            self.old_confirmed_amount,
            self.new_base_amount,
            self.new_extra_amount,
            self.new_refund_amount,
            self.new_confirmed_amount,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        if self.subsidized {
            for field in [
                self.sponsor.unwrap_or(0),
                self.subsidy_limit.unwrap_or(0),
                self.old_sponsor_refund.unwrap_or(0),
                self.new_sponsor_refund.unwrap_or(0),
            ] {
                out.extend_from_slice(&field.to_le_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::SponsorTerms;

    fn snapshot(base: u64, extra: u64, refund: u64, confirmed: u64, subsidy: u64) -> PaymentSnapshot {
        PaymentSnapshot {
            payer: 2,
            sponsor: (subsidy > 0).then_some(SponsorTerms {
                sponsor: 3,
                subsidy_limit: subsidy,
            }),
            base_amount: base,
            extra_amount: extra,
            refund_amount: refund,
            confirmed_amount: confirmed,
            cashback_rate: 200,
        }
    }

    #[test]
    fn test_unsubsidized_record_has_no_sponsor_fields() {
        let new = snapshot(1000, 400, 0, 0, 0);
        let record = NotificationRecord::new(LifecycleEventKind::Made, 1, None, &new);

        assert!(!record.subsidized);
        assert_eq!(record.sponsor, None);
        assert_eq!(record.new_sponsor_refund, None);

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("sponsor"));
    }

    #[test]
    fn test_encoding_is_byte_stable_unsubsidized() {
        let new = snapshot(1000, 400, 0, 0, 0);
        let record = NotificationRecord::new(LifecycleEventKind::Made, 1, None, &new);
        let bytes = record.encode();

        assert_eq!(bytes.len(), 83);
        assert_eq!(&bytes[..3], &[1, 0, 0]);
        assert_eq!(&bytes[3..11], &1u64.to_le_bytes()); // payment id
        assert_eq!(&bytes[11..19], &2u64.to_le_bytes()); // payer
        assert_eq!(&bytes[51..59], &1000u64.to_le_bytes()); // new base
        assert_eq!(&bytes[59..67], &400u64.to_le_bytes()); // new extra
    }

    #[test]
    fn test_encoding_is_byte_stable_subsidized() {
        let old = snapshot(1000, 400, 0, 0, 800);
        let new = snapshot(1000, 400, 400, 0, 800);
        let record = NotificationRecord::new(LifecycleEventKind::Updated, 9, Some(&old), &new);
        let bytes = record.encode();

        assert_eq!(bytes.len(), 115);
        assert_eq!(&bytes[..3], &[1, 1, 1]);
        assert_eq!(&bytes[83..91], &3u64.to_le_bytes()); // sponsor
        assert_eq!(&bytes[91..99], &800u64.to_le_bytes()); // subsidy limit
        assert_eq!(&bytes[99..107], &0u64.to_le_bytes()); // old sponsor refund
        assert_eq!(&bytes[107..115], &320u64.to_le_bytes()); // new sponsor refund
    }

    #[test]
    fn test_canceled_record_keeps_sponsor_terms_from_old_view() {
        let old = snapshot(1000, 400, 0, 0, 800);
        let new = old.zeroed();
        let record = NotificationRecord::new(LifecycleEventKind::Canceled, 5, Some(&old), &new);

        assert!(record.subsidized);
        assert_eq!(record.subsidy_limit, Some(800));
        assert_eq!(record.new_base_amount, 0);
    }

    #[test]
    fn test_json_round_trip() {
        let old = snapshot(1000, 400, 0, 100, 800);
        let new = snapshot(1200, 400, 0, 100, 800);
        let record = NotificationRecord::new(LifecycleEventKind::Updated, 4, Some(&old), &new);

        let json = serde_json::to_string(&record).unwrap();
        let back: NotificationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
