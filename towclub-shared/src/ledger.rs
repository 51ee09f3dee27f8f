/// Cash reconciliation of a training report
///
/// Bills are summed per payment method. Only cash bills go through the box,
/// together with absorptions (cash in) and expenses (cash out):
///
/// ```text
/// expected_cash_at_end = cash_at_start + cash bills + absorptions - expenses
/// difference           = cash_at_end - expected_cash_at_end
/// ```
///
/// A positive difference means there is more cash in the box than the
/// records explain.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::absorption::Absorption;
use crate::models::bill::{Bill, PaymentMethod};
use crate::models::expense::Expense;
use crate::models::purchase::Purchase;
use crate::models::report::Report;
use crate::models::run::{Run, RunKind};

/// Totals of a report
///
/// Sums are kept in `i64` so a day's totals can't overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ledger {
    pub cash_at_start: i64,
    pub cash_at_end: Option<i64>,

    pub cash_bills: i64,
    pub bank_bills: i64,
    pub card_bills: i64,

    /// All bills, whatever the payment method
    pub revenue: i64,

    pub expenses: i64,
    pub absorptions: i64,

    pub expected_cash_at_end: i64,

    /// `cash_at_end - expected_cash_at_end`, once the box was counted
    pub difference: Option<i64>,

    pub billed_signups: usize,
    pub flights: usize,
    pub services: usize,
}

impl Ledger {
    pub fn compute(
        report: &Report,
        bills: &[Bill],
        expenses: &[Expense],
        absorptions: &[Absorption],
        runs: &[Run],
    ) -> Self {
        let mut ledger = Ledger {
            cash_at_start: report.cash_at_start.into(),
            cash_at_end: report.cash_at_end.map(i64::from),
            billed_signups: bills.len(),
            ..Default::default()
        };

        for bill in bills {
            let amount = i64::from(bill.amount);
            match bill.method {
                PaymentMethod::Cash => ledger.cash_bills += amount,
                PaymentMethod::Bank => ledger.bank_bills += amount,
                PaymentMethod::Card => ledger.card_bills += amount,
            }
        }
        ledger.revenue = ledger.cash_bills + ledger.bank_bills + ledger.card_bills;

        ledger.expenses = expenses.iter().map(|e| i64::from(e.amount)).sum();
        ledger.absorptions = absorptions.iter().map(|a| i64::from(a.amount)).sum();

        ledger.expected_cash_at_end =
            ledger.cash_at_start + ledger.cash_bills + ledger.absorptions - ledger.expenses;
        ledger.difference = ledger
            .cash_at_end
            .map(|counted| counted - ledger.expected_cash_at_end);

        ledger.flights = runs.iter().filter(|r| r.kind == RunKind::Flight).count();
        ledger.services = runs.iter().filter(|r| r.kind.is_service()).count();

        ledger
    }
}

/// Report with its records and totals, as shown to organizers
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    #[serde(flatten)]
    pub report: Report,

    pub bills: Vec<Bill>,

    /// Purchases of all signups, billed or not
    pub purchases: Vec<Purchase>,

    pub expenses: Vec<Expense>,

    pub absorptions: Vec<Absorption>,

    pub ledger: Ledger,
}

impl ReportSummary {
    /// Loads a report's records and computes its ledger
    pub async fn load(pool: &PgPool, report_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let Some(report) = Report::find_by_id(pool, report_id).await? else {
            return Ok(None);
        };

        let bills = Bill::list_by_report(pool, report.id).await?;
        let purchases = Purchase::list_by_report(pool, report.id).await?;
        let expenses = Expense::list_by_report(pool, report.id).await?;
        let absorptions = Absorption::list_by_report(pool, report.id).await?;
        let runs = Run::list_by_training(pool, report.training_id).await?;

        let ledger = Ledger::compute(&report, &bills, &expenses, &absorptions, &runs);

        Ok(Some(Self {
            report,
            bills,
            purchases,
            expenses,
            absorptions,
            ledger,
        }))
    }
}
