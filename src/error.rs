use crate::domain::notification::LifecycleEventKind;
use crate::domain::payment::PaymentStatus;
use crate::domain::ports::{Capability, TokenError};
use crate::domain::{AccountId, PaymentId, TokenAmount};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    // Validation failures: rejected before any state mutation or transfer.
    #[error("payment id must be non-zero")]
    ZeroPaymentId,
    #[error("payer account must be non-zero")]
    ZeroPayerAccount,
    #[error("account must be non-zero")]
    ZeroAccount,
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("payment {0} already exists")]
    PaymentAlreadyExists(PaymentId),
    #[error("payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("payment {id} is {status}; the operation requires an active payment")]
    InappropriateStatus { id: PaymentId, status: PaymentStatus },
    #[error("base plus extra amount overflows the 64-bit amount domain")]
    SumAmountOverflow,
    #[error("cashback rate {rate}\u{2030} exceeds the maximum {max}\u{2030}")]
    CashbackRateExcess { rate: u16, max: u16 },
    #[error("subsidy limit {0} given without a sponsor")]
    SponsorlessSubsidy(TokenAmount),
    #[error("new sum amount {new_sum} is below the already refunded {refunded}")]
    InappropriateSumAmount {
        new_sum: TokenAmount,
        refunded: TokenAmount,
    },
    #[error("confirmation of {amount} exceeds the unconfirmed remainder {available}")]
    InappropriateConfirmationAmount {
        amount: TokenAmount,
        available: TokenAmount,
    },
    #[error("confirmation batch is empty")]
    EmptyConfirmationBatch,
    #[error("refund of {amount} exceeds the refundable {available}")]
    InappropriateRefundAmount {
        amount: TokenAmount,
        available: TokenAmount,
    },

    // Access control and observer registry.
    #[error("account {caller} lacks the {capability} capability")]
    Unauthorized {
        caller: AccountId,
        capability: Capability,
    },
    #[error("observer '{0}' failed its compatibility probe: {1}")]
    ProbeRejected(String, String),
    #[error("unregistration ticket for '{0}' does not match")]
    TicketMismatch(String),
    #[error("observer '{name}' rejected the {event} notification: {source}")]
    ObserverFailure {
        name: String,
        event: LifecycleEventKind,
        source: Box<PaymentError>,
    },

    // Cashback and vault bookkeeping.
    #[error("no cashback is recorded for payment {0}")]
    CashbackNotFound(PaymentId),
    #[error("vault balance {balance} cannot cover {amount}")]
    VaultBalanceTooLow {
        amount: TokenAmount,
        balance: TokenAmount,
    },
    #[error("nothing to claim")]
    NothingToClaim,

    // Collaborator and interface failures.
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
