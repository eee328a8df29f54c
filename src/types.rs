use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FinancingConfig;
use crate::decimal::Money;

/// unique identifier for an invoice
pub type InvoiceId = Uuid;
/// unique identifier for an installment
pub type InstallmentId = Uuid;
/// unique identifier for a payment
pub type PaymentId = Uuid;
/// unique identifier for an allocation
pub type AllocationId = Uuid;

/// how an invoice is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentModality {
    Cash,
    Financed,
}

/// accepted payment methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Deposit,
    Check,
    Card,
}

/// derived installment status, recomputed on every read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    /// no payment received, not yet due
    Pending,
    /// partially paid, not yet due
    Partial,
    /// due date passed with remaining balance
    Overdue,
    /// fully paid, terminal
    Paid,
}

/// accounts-receivable invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub total_amount: Money,
    pub issue_date: NaiveDate,
    pub modality: PaymentModality,
    pub financing: Option<FinancingConfig>,
    pub due_date: NaiveDate,
}

impl Invoice {
    /// create a cash invoice
    pub fn cash(total_amount: Money, issue_date: NaiveDate, due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            total_amount,
            issue_date,
            modality: PaymentModality::Cash,
            financing: None,
            due_date,
        }
    }

    /// create a financed invoice
    pub fn financed(
        total_amount: Money,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        financing: FinancingConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            total_amount,
            issue_date,
            modality: PaymentModality::Financed,
            financing: Some(financing),
            due_date,
        }
    }

    pub fn is_financed(&self) -> bool {
        self.modality == PaymentModality::Financed
    }
}

/// one scheduled partial payment of a financed invoice (cuota).
/// immutable once created except paid_date and note; destroyed only by
/// financing regeneration before any allocation exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub invoice_id: InvoiceId,
    /// 1..N, unique per invoice, ordering matches due-date order
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub scheduled_amount: Money,
    pub capital: Money,
    pub interest: Money,
    /// schedule balance after this installment
    pub balance_after: Money,
    /// set once fully paid
    pub paid_date: Option<NaiveDate>,
    pub note: Option<String>,
}

/// an incoming payment against an invoice.
/// never mutated after creation; corrections are new payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub recorded_by: String,
    pub idempotency_key: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// the portion of one payment applied to one installment.
/// created only inside its payment's atomic write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub payment_id: PaymentId,
    pub installment_id: InstallmentId,
    pub amount: Money,
    pub applied_at: DateTime<Utc>,
}
