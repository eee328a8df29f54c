use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::FinancingConfig;
use crate::decimal::Money;
use crate::errors::{CarteraError, Result};
use crate::types::{Installment, InvoiceId};

/// one row of a French-system amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub payment_amount: Money,
    pub capital: Money,
    pub interest: Money,
    pub balance_after: Money,
}

/// amortization schedule for a financed invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub config: FinancingConfig,
    pub rows: Vec<ScheduleRow>,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl AmortizationSchedule {
    /// generate a French (constant-payment) amortization schedule.
    ///
    /// rounds every monetary field half-up to whole currency units and
    /// trues up the last row so the capital components sum to the
    /// principal exactly and the final balance is zero. when the rounded
    /// payment repays the principal early, the schedule stops there and
    /// carries fewer rows than requested.
    pub fn generate(principal: Money, config: &FinancingConfig) -> Result<Self> {
        if !principal.is_positive() {
            return Err(CarteraError::InvalidPrincipal { amount: principal });
        }
        config.validate()?;

        let n = config.installment_count;
        let rate = config.monthly_rate.as_fraction();

        // a payment that rounds to zero would never amortize the balance
        let payment = constant_payment(principal, rate, n).max(Money::from_major(1));

        let mut rows = Vec::with_capacity(n as usize);
        let mut balance = principal;

        for i in 1..=n {
            if balance.is_zero() {
                break;
            }

            let due_date = add_months(config.start_date, i)?;
            let is_last = i == n;

            let interest = Money::from_decimal(balance.as_decimal() * rate);

            // the last row absorbs all rounding drift: capital is forced to
            // the remaining balance so the schedule closes at exactly zero.
            // intermediate rows never amortize past the balance, so a payment
            // rounded above the exact value cannot drive it negative
            let capital = if is_last {
                balance
            } else {
                (payment - interest).min(balance)
            };

            let payment_amount = capital + interest;
            let balance_after = balance - capital;

            rows.push(ScheduleRow {
                sequence: i,
                due_date,
                payment_amount,
                capital,
                interest,
                balance_after,
            });

            balance = balance_after;
        }

        let total_interest = rows.iter().map(|r| r.interest).sum();
        let total_payment = rows.iter().map(|r| r.payment_amount).sum();

        info!(
            installments = n,
            %principal,
            rate = %config.monthly_rate,
            %total_interest,
            "generated amortization schedule"
        );

        Ok(Self {
            principal,
            config: *config,
            rows,
            total_interest,
            total_payment,
        })
    }

    /// get the row for a specific period
    pub fn row(&self, sequence: u32) -> Option<&ScheduleRow> {
        self.rows.get(sequence.checked_sub(1)? as usize)
    }

    /// materialize the schedule as installment records for an invoice
    pub fn to_installments(&self, invoice_id: InvoiceId) -> Vec<Installment> {
        self.rows
            .iter()
            .map(|row| Installment {
                id: Uuid::new_v4(),
                invoice_id,
                sequence: row.sequence,
                due_date: row.due_date,
                scheduled_amount: row.payment_amount,
                capital: row.capital,
                interest: row.interest,
                balance_after: row.balance_after,
                paid_date: None,
                note: None,
            })
            .collect()
    }
}

/// constant periodic payment: P * r * (1 + r)^n / ((1 + r)^n - 1),
/// or P / n when the rate is zero
fn constant_payment(principal: Money, rate: Decimal, n: u32) -> Money {
    if rate.is_zero() {
        return principal / Decimal::from(n);
    }

    let mut compound = Decimal::ONE;
    let base = Decimal::ONE + rate;
    for _ in 0..n {
        compound *= base;
    }

    let numerator = principal.as_decimal() * rate * compound;
    let denominator = compound - Decimal::ONE;

    Money::from_decimal(numerator / denominator)
}

fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| CarteraError::InvalidDate {
            message: format!("cannot add {} months to {}", months, date),
        })
}
