//! Application layer: the subsystems orchestrating every lifecycle
//! operation. The payment ledger, the notification dispatcher, the cashback
//! engine with its vault, and the serializing processor facade.

pub mod cashback;
pub mod dispatcher;
pub mod ledger;
pub mod processor;
pub mod vault;
