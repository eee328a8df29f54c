use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{Allocation, Installment, InstallmentId, InstallmentStatus, InvoiceId};

/// live view of one installment, derived from its schedule row plus the
/// allocations applied to it. overdue-ness is a read-time predicate: it is
/// recomputed from the clock on every derivation and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentView {
    pub installment_id: InstallmentId,
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub scheduled_amount: Money,
    pub paid_amount: Money,
    pub remaining_balance: Money,
    pub status: InstallmentStatus,
    /// whole days past due; 0 unless overdue
    pub days_overdue: u32,
}

impl InstallmentView {
    /// derive the view from an installment and its allocations as of `today`
    pub fn derive(installment: &Installment, allocations: &[Allocation], today: NaiveDate) -> Self {
        let paid_amount: Money = allocations
            .iter()
            .filter(|a| a.installment_id == installment.id)
            .map(|a| a.amount)
            .sum();

        let remaining_balance = (installment.scheduled_amount - paid_amount).max(Money::ZERO);

        let overdue = remaining_balance.is_positive() && installment.due_date < today;

        let status = if remaining_balance.is_zero() {
            InstallmentStatus::Paid
        } else if overdue {
            InstallmentStatus::Overdue
        } else if paid_amount.is_positive() {
            InstallmentStatus::Partial
        } else {
            InstallmentStatus::Pending
        };

        let days_overdue = if overdue {
            (today - installment.due_date).num_days().max(0) as u32
        } else {
            0
        };

        Self {
            installment_id: installment.id,
            sequence: installment.sequence,
            due_date: installment.due_date,
            scheduled_amount: installment.scheduled_amount,
            paid_amount,
            remaining_balance,
            status,
            days_overdue,
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining_balance.is_positive()
    }

    pub fn is_overdue(&self) -> bool {
        self.status == InstallmentStatus::Overdue
    }
}

/// snapshot of an invoice's installments as of a given date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLedger {
    pub invoice_id: InvoiceId,
    pub as_of: NaiveDate,
    pub installments: Vec<InstallmentView>,
}

impl InvoiceLedger {
    /// derive the full ledger for an invoice's installments as of `today`.
    /// views are ordered by sequence.
    pub fn derive(
        invoice_id: InvoiceId,
        installments: &[Installment],
        allocations: &[Allocation],
        today: NaiveDate,
    ) -> Self {
        let mut views: Vec<InstallmentView> = installments
            .iter()
            .map(|i| InstallmentView::derive(i, allocations, today))
            .collect();
        views.sort_by_key(|v| v.sequence);

        Self {
            invoice_id,
            as_of: today,
            installments: views,
        }
    }

    /// sum of remaining balances across all installments
    pub fn total_outstanding(&self) -> Money {
        self.installments.iter().map(|v| v.remaining_balance).sum()
    }

    /// sum of paid amounts across all installments
    pub fn total_paid(&self) -> Money {
        self.installments.iter().map(|v| v.paid_amount).sum()
    }

    /// true once every installment is fully paid
    pub fn is_settled(&self) -> bool {
        !self.installments.is_empty() && self.installments.iter().all(|v| !v.is_open())
    }

    /// installments with remaining balance, in sequence order
    pub fn open_installments(&self) -> impl Iterator<Item = &InstallmentView> {
        self.installments.iter().filter(|v| v.is_open())
    }

    pub fn view(&self, installment_id: InstallmentId) -> Option<&InstallmentView> {
        self.installments
            .iter()
            .find(|v| v.installment_id == installment_id)
    }
}
