//! The payment ledger: owns the `Payment` records, performs payer/sponsor
//! settlement, and notifies lifecycle observers after each commit.
//!
//! Every operation follows the same shape: authorize, validate, build and
//! validate the settlement plan, execute it, commit the record mutation,
//! dispatch notifications, append the audit record. Validation happens
//! before any transfer, and the plan is checked as a whole before any of its
//! steps run, so a failed operation leaves no partial effect behind.

use crate::application::dispatcher::{LifecycleDispatcher, LifecycleObserver, RegistrationTicket, RegistryChange};
use crate::domain::notification::{LifecycleEventKind, NotificationRecord};
use crate::domain::operation::{Operation, OperationKind, UpdateMode};
use crate::domain::payment::{
    CancelTarget, Payment, PaymentStatus, SponsorTerms, checked_sum, split_refund, split_sum,
};
use crate::domain::ports::{Authorizer, AuditSink, Capability, TokenError, TokenLedger};
use crate::domain::{AccountId, PaymentId, TokenAmount};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// The ledger's own holding account for unconfirmed remainders.
    pub ledger_account: AccountId,
    /// Destination of confirmed amounts.
    pub cashout_account: AccountId,
    /// Upper bound on the per-payment cashback rate, per-mille.
    pub max_cashback_rate: u16,
    /// Rate applied when a make request carries no override.
    pub default_cashback_rate: u16,
}

/// Everything needed to create a payment.
#[derive(Debug, Clone)]
pub struct MakeRequest {
    pub id: PaymentId,
    pub payer: AccountId,
    pub base_amount: TokenAmount,
    pub extra_amount: TokenAmount,
    pub sponsor: Option<SponsorTerms>,
    /// Overrides the ledger's default cashback rate when present.
    pub cashback_rate: Option<u16>,
    /// Amount to confirm immediately after creation; zero to skip.
    pub confirm_amount: TokenAmount,
}

pub struct PaymentLedger {
    config: LedgerConfig,
    token: Arc<dyn TokenLedger>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditSink>,
    dispatcher: LifecycleDispatcher,
    payments: HashMap<PaymentId, Payment>,
    /// Sum of `remainder - confirmed` over all active payments.
    total_unconfirmed: u128,
}

impl PaymentLedger {
    pub fn new(
        config: LedgerConfig,
        token: Arc<dyn TokenLedger>,
        authorizer: Arc<dyn Authorizer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            token,
            authorizer,
            audit,
            dispatcher: LifecycleDispatcher::new(),
            payments: HashMap::new(),
            total_unconfirmed: 0,
        }
    }

    /// Compatibility probe for swap-in checks. Must not fail.
    pub fn probe(&self) -> Result<()> {
        Ok(())
    }

    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.get(&id)
    }

    pub fn total_unconfirmed(&self) -> u128 {
        self.total_unconfirmed
    }

    pub fn payments(&self) -> impl Iterator<Item = (PaymentId, &Payment)> {
        self.payments.iter().map(|(id, p)| (*id, p))
    }

    pub fn register_observer(
        &mut self,
        caller: AccountId,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<(RegistrationTicket, Vec<RegistryChange>)> {
        self.authorize(caller, Capability::ManageObservers)?;
        self.dispatcher.register(observer)
    }

    pub fn unregister_observer(
        &mut self,
        caller: AccountId,
        name: &str,
        ticket: RegistrationTicket,
    ) -> Result<Vec<RegistryChange>> {
        self.authorize(caller, Capability::ManageObservers)?;
        self.dispatcher.unregister(name, ticket)
    }

    /// Applies one row of the lifecycle operation stream.
    pub fn apply(&mut self, caller: AccountId, op: &Operation) -> Result<()> {
        match op.op {
            OperationKind::Make => {
                let subsidy_limit = op.subsidy_limit.unwrap_or(0);
                let sponsor = match op.sponsor {
                    Some(sponsor) => Some(SponsorTerms {
                        sponsor,
                        subsidy_limit,
                    }),
                    None if subsidy_limit == 0 => None,
                    None => return Err(PaymentError::SponsorlessSubsidy(subsidy_limit)),
                };
                self.make(
                    caller,
                    MakeRequest {
                        id: op.id,
                        payer: op.payer.unwrap_or(0),
                        base_amount: op.base.unwrap_or(0),
                        extra_amount: op.extra.unwrap_or(0),
                        sponsor,
                        cashback_rate: op.rate,
                        confirm_amount: op.amount.unwrap_or(0),
                    },
                )
            }
            OperationKind::Update => self.update(
                caller,
                op.id,
                op.base.unwrap_or(0),
                op.extra.unwrap_or(0),
                op.mode.unwrap_or_default(),
            ),
            OperationKind::Confirm => self.confirm(caller, op.id, op.amount.unwrap_or(0)),
            OperationKind::Refund => self.refund(caller, op.id, op.amount.unwrap_or(0)),
            OperationKind::Revoke => self.cancel(caller, op.id, CancelTarget::Revoked),
            OperationKind::Reverse => self.cancel(caller, op.id, CancelTarget::Reversed),
        }
    }

    /// Creates a payment, pulling the payer and sponsor shares into the
    /// ledger account. An existing record blocks creation unless it is
    /// revoked, in which case it is overwritten in place.
    pub fn make(&mut self, caller: AccountId, request: MakeRequest) -> Result<()> {
        self.authorize(caller, Capability::ExecutePayments)?;
        if request.id == 0 {
            return Err(PaymentError::ZeroPaymentId);
        }
        if request.payer == 0 {
            return Err(PaymentError::ZeroPayerAccount);
        }
        if let Some(existing) = self.payments.get(&request.id)
            && existing.status != PaymentStatus::Revoked
        {
            return Err(PaymentError::PaymentAlreadyExists(request.id));
        }
        if let Some(terms) = request.sponsor
            && terms.sponsor == 0
        {
            return Err(PaymentError::ZeroAccount);
        }
        let rate = request
            .cashback_rate
            .unwrap_or(self.config.default_cashback_rate);
        if rate > self.config.max_cashback_rate {
            return Err(PaymentError::CashbackRateExcess {
                rate,
                max: self.config.max_cashback_rate,
            });
        }
        let sum = checked_sum(request.base_amount, request.extra_amount)?;
        if request.confirm_amount > sum {
            return Err(PaymentError::InappropriateConfirmationAmount {
                amount: request.confirm_amount,
                available: sum,
            });
        }

        let subsidy_limit = request.sponsor.map_or(0, |t| t.subsidy_limit);
        let split = split_sum(sum, subsidy_limit);
        let mut plan = SettlementPlan::new();
        plan.pull(request.payer, self.config.ledger_account, split.payer);
        if let Some(terms) = request.sponsor {
            plan.pull(terms.sponsor, self.config.ledger_account, split.sponsor);
        }
        plan.execute(self.token.as_ref())?;

        let payment = Payment {
            status: PaymentStatus::Active,
            payer: request.payer,
            sponsor: request.sponsor,
            base_amount: request.base_amount,
            extra_amount: request.extra_amount,
            refund_amount: 0,
            confirmed_amount: 0,
            cashback_rate: rate,
        };
        let snapshot = payment.snapshot();
        self.payments.insert(request.id, payment);
        self.total_unconfirmed += u128::from(sum);
        log::debug!(
            "payment {} made: payer {} pays {}, sponsor pays {}",
            request.id,
            request.payer,
            split.payer,
            split.sponsor
        );

        self.dispatcher.dispatch_made(request.id, &snapshot)?;
        self.audit.record(&NotificationRecord::new(
            LifecycleEventKind::Made,
            request.id,
            None,
            &snapshot,
        ))?;

        if request.confirm_amount > 0 {
            self.confirm_one(request.id, request.confirm_amount)?;
        }
        Ok(())
    }

    /// Changes the face value of an active payment and settles the signed
    /// payer/sponsor remainder deltas. Shrinking the remainder below the
    /// confirmed amount caps the confirmation down, returning the excess
    /// from the cash-out account.
    pub fn update(
        &mut self,
        caller: AccountId,
        id: PaymentId,
        new_base_amount: TokenAmount,
        new_extra_amount: TokenAmount,
        mode: UpdateMode,
    ) -> Result<()> {
        self.authorize(caller, Capability::ExecutePayments)?;
        let payment = self.active_payment(id)?;
        if mode == UpdateMode::Lazy
            && payment.base_amount == new_base_amount
            && payment.extra_amount == new_extra_amount
        {
            return Ok(());
        }
        let new_sum = checked_sum(new_base_amount, new_extra_amount)?;
        if payment.refund_amount > new_sum {
            return Err(PaymentError::InappropriateSumAmount {
                new_sum,
                refunded: payment.refund_amount,
            });
        }
        let old = payment.clone();
        self.apply_amount_change(id, &old, new_base_amount, new_extra_amount, old.refund_amount)
    }

    /// Refunds part of an active payment, returning the payer and sponsor
    /// shares of the refunded amount.
    pub fn refund(&mut self, caller: AccountId, id: PaymentId, amount: TokenAmount) -> Result<()> {
        self.authorize(caller, Capability::ExecutePayments)?;
        let payment = self.active_payment(id)?;
        let available = payment.sum_amount() - payment.refund_amount;
        if amount > available {
            return Err(PaymentError::InappropriateRefundAmount { amount, available });
        }
        let new_refund = payment.refund_amount + amount;
        let old = payment.clone();
        self.apply_amount_change(id, &old, old.base_amount, old.extra_amount, new_refund)
    }

    /// Confirms part of an active payment, moving it to the cash-out account.
    pub fn confirm(&mut self, caller: AccountId, id: PaymentId, amount: TokenAmount) -> Result<()> {
        self.authorize(caller, Capability::ExecutePayments)?;
        self.confirm_one(id, amount)
    }

    /// Confirms a batch of payments with a single cash-out transfer. Every
    /// item is validated (cumulatively per id) before anything moves.
    pub fn confirm_batch(
        &mut self,
        caller: AccountId,
        items: &[(PaymentId, TokenAmount)],
    ) -> Result<()> {
        self.authorize(caller, Capability::ExecutePayments)?;
        if items.is_empty() {
            return Err(PaymentError::EmptyConfirmationBatch);
        }
        let mut pending: HashMap<PaymentId, TokenAmount> = HashMap::new();
        let mut total: u128 = 0;
        for &(id, amount) in items {
            let payment = self.active_payment(id)?;
            let already = pending.get(&id).copied().unwrap_or(0);
            let available = payment.remainder() - payment.confirmed_amount - already;
            if amount > available {
                return Err(PaymentError::InappropriateConfirmationAmount { amount, available });
            }
            *pending.entry(id).or_default() += amount;
            total += u128::from(amount);
        }
        let total = TokenAmount::try_from(total).map_err(|_| PaymentError::SumAmountOverflow)?;

        let mut plan = SettlementPlan::new();
        plan.transfer(self.config.ledger_account, self.config.cashout_account, total);
        plan.execute(self.token.as_ref())?;

        for (id, amount) in pending {
            if let Some(payment) = self.payments.get_mut(&id) {
                payment.confirmed_amount += amount;
            }
        }
        self.total_unconfirmed -= u128::from(total);
        log::debug!("confirmed {total} across {} payments", items.len());
        Ok(())
    }

    /// Cancels an active payment, returning the live remainder to the payer
    /// and sponsor. `Revoked` permits remaking under the same id; `Reversed`
    /// is permanent. Amount fields are left in place; a later make
    /// overwrites them.
    pub fn cancel(&mut self, caller: AccountId, id: PaymentId, target: CancelTarget) -> Result<()> {
        self.authorize(caller, Capability::ExecutePayments)?;
        let payment = self.active_payment(id)?;
        let old_snapshot = payment.snapshot();
        let remainders = payment.remainders();
        let confirmed = payment.confirmed_amount;
        let remainder = payment.remainder();
        let payer = payment.payer;
        let sponsor = payment.sponsor;

        let mut plan = SettlementPlan::new();
        if confirmed > 0 {
            plan.transfer(self.config.cashout_account, self.config.ledger_account, confirmed);
        }
        plan.transfer(self.config.ledger_account, payer, remainders.payer);
        if let Some(terms) = sponsor {
            plan.transfer(self.config.ledger_account, terms.sponsor, remainders.sponsor);
        }
        plan.execute(self.token.as_ref())?;

        self.total_unconfirmed -= u128::from(remainder - confirmed);
        if let Some(payment) = self.payments.get_mut(&id) {
            payment.status = target.status();
        }
        log::debug!("payment {id} canceled to {}", target.status());

        let new_snapshot = old_snapshot.zeroed();
        self.dispatcher.dispatch_canceled(id, &old_snapshot, &new_snapshot)?;
        self.audit.record(&NotificationRecord::new(
            LifecycleEventKind::Canceled,
            id,
            Some(&old_snapshot),
            &new_snapshot,
        ))?;
        Ok(())
    }

    /// Shared settlement for update and refund: recomputes the payer and
    /// sponsor remainders under the new amounts, settles the signed deltas,
    /// caps the confirmed amount to the new remainder, adjusts the
    /// unconfirmed statistic, and dispatches the "updated" notification.
    fn apply_amount_change(
        &mut self,
        id: PaymentId,
        old: &Payment,
        new_base_amount: TokenAmount,
        new_extra_amount: TokenAmount,
        new_refund_amount: TokenAmount,
    ) -> Result<()> {
        let old_snapshot = old.snapshot();
        let subsidy_limit = old.subsidy_limit();
        let confirmed = old.confirmed_amount;

        let old_remainders = old.remainders();
        let old_unconfirmed = old.remainder() - confirmed;

        let new_sum = new_base_amount + new_extra_amount;
        let new_split = split_sum(new_sum, subsidy_limit);
        let new_refund_split = split_refund(new_refund_amount, new_base_amount, subsidy_limit);
        let new_payer_remainder = new_split.payer - new_refund_split.payer;
        let new_sponsor_remainder = new_split.sponsor - new_refund_split.sponsor;
        let new_remainder = new_sum - new_refund_amount;
        let new_confirmed = confirmed.min(new_remainder);

        let mut plan = SettlementPlan::new();
        // A confirmation excess must flow back before the party payouts; the
        // payouts may be funded by it.
        if confirmed > new_confirmed {
            plan.transfer(
                self.config.cashout_account,
                self.config.ledger_account,
                confirmed - new_confirmed,
            );
        }
        self.plan_delta(
            &mut plan,
            old.payer,
            old_remainders.payer,
            new_payer_remainder,
        );
        if let Some(terms) = old.sponsor {
            self.plan_delta(
                &mut plan,
                terms.sponsor,
                old_remainders.sponsor,
                new_sponsor_remainder,
            );
        }
        plan.execute(self.token.as_ref())?;

        let new_snapshot = match self.payments.get_mut(&id) {
            Some(payment) => {
                payment.base_amount = new_base_amount;
                payment.extra_amount = new_extra_amount;
                payment.refund_amount = new_refund_amount;
                payment.confirmed_amount = new_confirmed;
                payment.snapshot()
            }
            None => return Err(PaymentError::PaymentNotFound(id)),
        };
        let new_unconfirmed = new_remainder - new_confirmed;
        self.total_unconfirmed =
            self.total_unconfirmed - u128::from(old_unconfirmed) + u128::from(new_unconfirmed);
        self.dispatcher.dispatch_updated(id, &old_snapshot, &new_snapshot)?;
        self.audit.record(&NotificationRecord::new(
            LifecycleEventKind::Updated,
            id,
            Some(&old_snapshot),
            &new_snapshot,
        ))?;
        Ok(())
    }

    /// Plans the signed delta between an old and a new per-party remainder:
    /// growth pulls from the party, shrinkage pays back to it.
    fn plan_delta(
        &self,
        plan: &mut SettlementPlan,
        party: AccountId,
        old_remainder: TokenAmount,
        new_remainder: TokenAmount,
    ) {
        if new_remainder > old_remainder {
            plan.pull(party, self.config.ledger_account, new_remainder - old_remainder);
        } else {
            plan.transfer(self.config.ledger_account, party, old_remainder - new_remainder);
        }
    }

    fn confirm_one(&mut self, id: PaymentId, amount: TokenAmount) -> Result<()> {
        let payment = self.active_payment(id)?;
        let available = payment.remainder() - payment.confirmed_amount;
        if amount > available {
            return Err(PaymentError::InappropriateConfirmationAmount { amount, available });
        }

        let mut plan = SettlementPlan::new();
        plan.transfer(self.config.ledger_account, self.config.cashout_account, amount);
        plan.execute(self.token.as_ref())?;

        if let Some(payment) = self.payments.get_mut(&id) {
            payment.confirmed_amount += amount;
        }
        self.total_unconfirmed -= u128::from(amount);
        log::debug!("payment {id} confirmed {amount}");
        Ok(())
    }

    fn active_payment(&self, id: PaymentId) -> Result<&Payment> {
        let payment = self
            .payments
            .get(&id)
            .ok_or(PaymentError::PaymentNotFound(id))?;
        if payment.status != PaymentStatus::Active {
            return Err(PaymentError::InappropriateStatus {
                id,
                status: payment.status,
            });
        }
        Ok(payment)
    }

    fn authorize(&self, caller: AccountId, capability: Capability) -> Result<()> {
        if self.authorizer.authorize(caller, capability) {
            Ok(())
        } else {
            Err(PaymentError::Unauthorized { caller, capability })
        }
    }
}

/// An ordered list of token transfers validated as a whole before any step
/// executes. Validation walks the steps over scratch balances, so a plan
/// whose later step would overdraw an account funded mid-plan still passes,
/// and one that overdraws at any point is rejected up front.
struct SettlementPlan {
    steps: Vec<PlanStep>,
}

enum PlanStep {
    /// Direct move between core-controlled accounts.
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: TokenAmount,
    },
    /// Allowance-checked pull from an external owner.
    Pull {
        owner: AccountId,
        to: AccountId,
        amount: TokenAmount,
    },
}

impl SettlementPlan {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn transfer(&mut self, from: AccountId, to: AccountId, amount: TokenAmount) {
        if amount > 0 {
            self.steps.push(PlanStep::Transfer { from, to, amount });
        }
    }

    fn pull(&mut self, owner: AccountId, to: AccountId, amount: TokenAmount) {
        if amount > 0 {
            self.steps.push(PlanStep::Pull { owner, to, amount });
        }
    }

    fn execute(self, token: &dyn TokenLedger) -> Result<()> {
        self.validate(token)?;
        for step in &self.steps {
            match *step {
                PlanStep::Transfer { from, to, amount } => token.transfer(from, to, amount)?,
                PlanStep::Pull { owner, to, amount } => token.transfer_from(owner, to, amount)?,
            }
        }
        Ok(())
    }

    fn validate(&self, token: &dyn TokenLedger) -> Result<()> {
        let mut balances: HashMap<AccountId, TokenAmount> = HashMap::new();
        let mut allowance_used: HashMap<AccountId, TokenAmount> = HashMap::new();
        for step in &self.steps {
            let (from, to, amount) = match *step {
                PlanStep::Transfer { from, to, amount } => (from, to, amount),
                PlanStep::Pull { owner, to, amount } => {
                    let used = allowance_used.entry(owner).or_default();
                    let allowance = token.allowance_of(owner);
                    if allowance - allowance.min(*used) < amount {
                        return Err(TokenError::InsufficientAllowance {
                            owner,
                            allowance: allowance.saturating_sub(*used),
                            needed: amount,
                        }
                        .into());
                    }
                    *used += amount;
                    (owner, to, amount)
                }
            };
            let balance = balances
                .entry(from)
                .or_insert_with(|| token.balance_of(from));
            if *balance < amount {
                return Err(TokenError::InsufficientBalance {
                    account: from,
                    balance: *balance,
                    needed: amount,
                }
                .into());
            }
            *balance -= amount;
            *balances.entry(to).or_insert_with(|| token.balance_of(to)) += amount;
        }
        Ok(())
    }
}
