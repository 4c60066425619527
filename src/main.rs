use cardpay::application::cashback::{CashbackConfig, CashbackEngine};
use cardpay::application::ledger::{LedgerConfig, PaymentLedger};
use cardpay::application::processor::PaymentProcessor;
use cardpay::application::vault::{CashbackVault, VaultConfig};
use cardpay::config::ProcessorConfig;
use cardpay::domain::ports::{AuditSink, Capability};
use cardpay::infrastructure::in_memory::{
    InMemoryTokenLedger, JsonLinesAuditSink, MemoryAuditSink, RoleAuthorizer, SystemClock,
};
use cardpay::interfaces::csv::operation_reader::OperationReader;
use cardpay::interfaces::csv::report_writer::{ReportRow, ReportWriter};
use chrono::Duration;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to a JSON configuration file (accounts, rates, caps, balances)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write lifecycle audit records as JSON lines to this file
    #[arg(long)]
    audit_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProcessorConfig::load(path).into_diagnostic()?,
        None => ProcessorConfig::default(),
    };

    // Wire the collaborators.
    let token = Arc::new(InMemoryTokenLedger::new());
    for &(account, amount) in &config.initial_balances {
        token.mint(account, amount);
    }
    for &(owner, amount) in &config.initial_allowances {
        token.approve(owner, amount);
    }

    let roles = RoleAuthorizer::new();
    roles.grant(config.operator_account, Capability::ExecutePayments);
    roles.grant(config.operator_account, Capability::ManageObservers);
    roles.grant(config.cashback_operator_account, Capability::DistributeCashback);
    roles.grant(config.vault_manager_account, Capability::ManageVault);
    let authorizer = Arc::new(roles);

    let clock = Arc::new(SystemClock);
    let audit: Arc<dyn AuditSink> = match &cli.audit_log {
        Some(path) => Arc::new(JsonLinesAuditSink::create(path).into_diagnostic()?),
        None => Arc::new(MemoryAuditSink::new()),
    };

    let vault = config.claimable_cashback.then(|| {
        Arc::new(CashbackVault::new(
            VaultConfig {
                vault_account: config.vault_account,
                distributor: config.cashback_operator_account,
            },
            token.clone(),
            authorizer.clone(),
            clock.clone(),
        ))
    });
    let engine = Arc::new(CashbackEngine::new(
        CashbackConfig {
            treasury: config.treasury_account,
            operator_account: config.cashback_operator_account,
            rounding_coef: config.cashback_rounding_coef,
            cap_amount: config.cashback_cap_amount,
            cap_period: Duration::seconds(config.cashback_cap_period_secs as i64),
        },
        token.clone(),
        authorizer.clone(),
        clock,
        vault,
    ));

    let mut ledger = PaymentLedger::new(
        LedgerConfig {
            ledger_account: config.ledger_account,
            cashout_account: config.cashout_account,
            max_cashback_rate: config.max_cashback_rate,
            default_cashback_rate: config.default_cashback_rate,
        },
        token,
        authorizer,
        audit,
    );
    ledger
        .register_observer(config.operator_account, engine.clone())
        .into_diagnostic()?;
    let processor = PaymentProcessor::new(ledger, config.operator_account);

    // Process the operation stream.
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for op_result in reader.operations() {
        match op_result {
            Ok(op) => {
                if let Err(e) = processor.submit(&op).await {
                    eprintln!("Error processing operation: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {e}");
            }
        }
    }

    // Output the final payment report.
    let rows = processor
        .payments()
        .await
        .into_iter()
        .map(|(id, payment)| {
            let cashback = engine.payment_cashback(id).map_or(0, |c| c.balance);
            ReportRow::new(id, &payment, cashback)
        })
        .collect();
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_report(rows).into_diagnostic()?;

    Ok(())
}
