use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::{AccountId, PaymentId, TokenAmount};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One row of the final payment report.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct ReportRow {
    pub payment: PaymentId,
    pub status: PaymentStatus,
    pub payer: AccountId,
    pub sponsor: Option<AccountId>,
    pub base: TokenAmount,
    pub extra: TokenAmount,
    pub refunded: TokenAmount,
    pub confirmed: TokenAmount,
    pub cashback: TokenAmount,
}

impl ReportRow {
    pub fn new(payment: PaymentId, record: &Payment, cashback: TokenAmount) -> Self {
        Self {
            payment,
            status: record.status,
            payer: record.payer,
            sponsor: record.sponsor.map(|terms| terms.sponsor),
            base: record.base_amount,
            extra: record.extra_amount,
            refunded: record.refund_amount,
            confirmed: record.confirmed_amount,
            cashback,
        }
    }
}

/// Writes the payment report as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(dest: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(dest),
        }
    }

    pub fn write_report(&mut self, rows: Vec<ReportRow>) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
