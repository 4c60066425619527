pub mod cashback;
pub mod notification;
pub mod operation;
pub mod payment;
pub mod ports;

/// Externally assigned payment identifier. Zero is never a valid id.
pub type PaymentId = u64;

/// Token account identifier. Zero plays the role of the absent account.
pub type AccountId = u64;

/// Token amount in the smallest token unit.
pub type TokenAmount = u64;
