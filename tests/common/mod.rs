// Not every test binary touches every helper.
#![allow(dead_code)]

use cardpay::application::cashback::{CashbackConfig, CashbackEngine};
use cardpay::application::ledger::{LedgerConfig, MakeRequest, PaymentLedger};
use cardpay::application::vault::{CashbackVault, VaultConfig};
use cardpay::domain::payment::SponsorTerms;
use cardpay::domain::{AccountId, PaymentId, TokenAmount};
use cardpay::infrastructure::in_memory::{
    InMemoryTokenLedger, ManualClock, MemoryAuditSink, OpenAuthorizer,
};
use chrono::Duration;
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;

pub const OPERATOR: AccountId = 1;
pub const PAYER: AccountId = 2;
pub const SPONSOR: AccountId = 3;
pub const MANAGER: AccountId = 5;
pub const LEDGER: AccountId = 10;
pub const CASHOUT: AccountId = 11;
pub const TREASURY: AccountId = 12;
pub const CB_OPERATOR: AccountId = 13;
pub const VAULT: AccountId = 14;

/// One whole token in the smallest unit.
pub const UNIT: TokenAmount = 1_000_000;

pub const STARTING_BALANCE: TokenAmount = 1_000_000 * UNIT;

/// A fully wired ledger/engine/vault stack over in-memory collaborators.
pub struct Harness {
    pub ledger: PaymentLedger,
    pub engine: Arc<CashbackEngine>,
    pub vault: Option<Arc<CashbackVault>>,
    pub token: Arc<InMemoryTokenLedger>,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(false)
    }

    #[allow(dead_code)]
    pub fn claimable() -> Self {
        Self::build(true)
    }

    fn build(claimable: bool) -> Self {
        let token = Arc::new(InMemoryTokenLedger::new());
        for account in [PAYER, SPONSOR, TREASURY] {
            token.mint(account, STARTING_BALANCE);
            token.approve(account, TokenAmount::MAX);
        }
        let authorizer = Arc::new(OpenAuthorizer);
        let clock = Arc::new(ManualClock::default());
        let audit = Arc::new(MemoryAuditSink::new());

        let vault = claimable.then(|| {
            Arc::new(CashbackVault::new(
                VaultConfig {
                    vault_account: VAULT,
                    distributor: CB_OPERATOR,
                },
                token.clone(),
                authorizer.clone(),
                clock.clone(),
            ))
        });
        let engine = Arc::new(CashbackEngine::new(
            CashbackConfig {
                treasury: TREASURY,
                operator_account: CB_OPERATOR,
                rounding_coef: 10_000,
                cap_amount: 300 * UNIT,
                cap_period: Duration::days(30),
            },
            token.clone(),
            authorizer.clone(),
            clock.clone(),
            vault.clone(),
        ));

        let mut ledger = PaymentLedger::new(
            LedgerConfig {
                ledger_account: LEDGER,
                cashout_account: CASHOUT,
                max_cashback_rate: 500,
                default_cashback_rate: 0,
            },
            token.clone(),
            authorizer,
            audit.clone(),
        );
        ledger
            .register_observer(OPERATOR, engine.clone())
            .expect("cashback engine registers cleanly");

        Self {
            ledger,
            engine,
            vault,
            token,
            clock,
            audit,
        }
    }

    pub fn make_request(
        &self,
        id: PaymentId,
        base: TokenAmount,
        extra: TokenAmount,
        subsidy: TokenAmount,
        rate: u16,
    ) -> MakeRequest {
        MakeRequest {
            id,
            payer: PAYER,
            base_amount: base,
            extra_amount: extra,
            sponsor: (subsidy > 0).then_some(SponsorTerms {
                sponsor: SPONSOR,
                subsidy_limit: subsidy,
            }),
            cashback_rate: Some(rate),
            confirm_amount: 0,
        }
    }

    pub fn cashback_balance(&self, id: PaymentId) -> TokenAmount {
        self.engine.payment_cashback(id).map_or(0, |c| c.balance)
    }
}

/// Writes an operations CSV usable by the CLI binary.
#[allow(dead_code)]
pub fn write_operations_csv(path: &Path, rows: &[&str]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    writeln!(
        file,
        "op,id,payer,base,extra,sponsor,subsidy_limit,rate,amount,mode"
    )?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    Ok(())
}
