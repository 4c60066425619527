//! The application-level entry point the payment-processing backend drives.
//!
//! `PaymentProcessor` owns the synchronous core behind an async mutex and
//! ensures sequential consistency: operations are applied one at a time, in
//! submission order, never interleaved.

use crate::application::ledger::PaymentLedger;
use crate::domain::operation::Operation;
use crate::domain::payment::Payment;
use crate::domain::{AccountId, PaymentId};
use crate::error::Result;
use tokio::sync::Mutex;

pub struct PaymentProcessor {
    ledger: Mutex<PaymentLedger>,
    operator: AccountId,
}

impl PaymentProcessor {
    /// Wraps a fully wired ledger. Observers are registered on the ledger
    /// before it is handed over.
    pub fn new(ledger: PaymentLedger, operator: AccountId) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            operator,
        }
    }

    /// Applies one lifecycle operation on behalf of the configured operator.
    pub async fn submit(&self, op: &Operation) -> Result<()> {
        self.ledger.lock().await.apply(self.operator, op)
    }

    /// Final state of all payments, ordered by id.
    pub async fn payments(&self) -> Vec<(PaymentId, Payment)> {
        let ledger = self.ledger.lock().await;
        let mut payments: Vec<_> = ledger.payments().map(|(id, p)| (id, p.clone())).collect();
        payments.sort_by_key(|(id, _)| *id);
        payments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ledger::LedgerConfig;
    use crate::domain::operation::OperationKind;
    use crate::domain::ports::TokenLedger;
    use crate::infrastructure::in_memory::{InMemoryTokenLedger, MemoryAuditSink, OpenAuthorizer};
    use std::sync::Arc;

    fn operation(op: OperationKind, id: PaymentId) -> Operation {
        Operation {
            op,
            id,
            payer: Some(2),
            base: Some(1000),
            extra: Some(0),
            sponsor: None,
            subsidy_limit: None,
            rate: None,
            amount: None,
            mode: None,
        }
    }

    #[tokio::test]
    async fn test_operations_apply_in_submission_order() {
        let token = Arc::new(InMemoryTokenLedger::new());
        token.mint(2, 10_000);
        token.approve(2, u64::MAX);
        let ledger = PaymentLedger::new(
            LedgerConfig {
                ledger_account: 10,
                cashout_account: 11,
                max_cashback_rate: 500,
                default_cashback_rate: 0,
            },
            token.clone(),
            Arc::new(OpenAuthorizer),
            Arc::new(MemoryAuditSink::new()),
        );
        let processor = PaymentProcessor::new(ledger, 1);

        processor.submit(&operation(OperationKind::Make, 1)).await.unwrap();
        let mut confirm = operation(OperationKind::Confirm, 1);
        confirm.amount = Some(400);
        processor.submit(&confirm).await.unwrap();

        let payments = processor.payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].1.confirmed_amount, 400);
        assert_eq!(token.balance_of(11), 400);
    }
}
