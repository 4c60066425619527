use crate::domain::{AccountId, PaymentId, TokenAmount};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Make,
    Update,
    Confirm,
    Refund,
    Revoke,
    Reverse,
}

/// How an update treats unchanged amounts: a lazy update with unchanged
/// amounts is a no-op, a full update always settles and notifies.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    #[default]
    Full,
    Lazy,
}

/// One row of the lifecycle operation stream. Columns that do not apply to
/// the operation kind are left empty; for `make` the `amount` column is the
/// optional immediate confirmation amount.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
pub struct Operation {
    pub op: OperationKind,
    pub id: PaymentId,
    pub payer: Option<AccountId>,
    pub base: Option<TokenAmount>,
    pub extra: Option<TokenAmount>,
    pub sponsor: Option<AccountId>,
    pub subsidy_limit: Option<TokenAmount>,
    pub rate: Option<u16>,
    pub amount: Option<TokenAmount>,
    pub mode: Option<UpdateMode>,
}
