use thiserror::Error;

use crate::decimal::{Money, Rate};
use crate::types::{InstallmentId, InvoiceId};

#[derive(Error, Debug)]
pub enum CarteraError {
    #[error("invalid principal: {amount}")]
    InvalidPrincipal {
        amount: Money,
    },

    #[error("invalid installment count: {count} (financing requires 2 to 60 installments)")]
    InvalidInstallmentCount {
        count: u32,
    },

    #[error("invalid monthly interest rate: {rate} (allowed range 0% to 10%)")]
    InvalidInterestRate {
        rate: Rate,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("nothing to allocate: invoice {invoice_id} has no outstanding installments")]
    NothingToAllocate {
        invoice_id: InvoiceId,
    },

    #[error("overpayment: outstanding {outstanding}, requested {requested}")]
    Overpayment {
        outstanding: Money,
        requested: Money,
    },

    #[error("distribution mismatch: payment {expected}, distributed {provided}")]
    DistributionMismatch {
        expected: Money,
        provided: Money,
    },

    #[error("entry exceeds installment balance: installment {installment_id}, remaining {remaining}, requested {requested}")]
    ExceedsInstallmentBalance {
        installment_id: InstallmentId,
        remaining: Money,
        requested: Money,
    },

    #[error("unknown installment: {installment_id}")]
    UnknownInstallment {
        installment_id: InstallmentId,
    },

    #[error("installment listed more than once: {installment_id}")]
    DuplicateManualEntry {
        installment_id: InstallmentId,
    },

    #[error("invoice not found: {invoice_id}")]
    InvoiceNotFound {
        invoice_id: InvoiceId,
    },

    #[error("invoice not financed: {invoice_id}")]
    InvoiceNotFinanced {
        invoice_id: InvoiceId,
    },

    #[error("schedule locked: invoice {invoice_id} has {allocated_installments} installment(s) with allocations")]
    ScheduleLocked {
        invoice_id: InvoiceId,
        allocated_installments: usize,
    },

    #[error("concurrent modification of invoice {invoice_id}: gave up after {retries} retries")]
    ConcurrentModification {
        invoice_id: InvoiceId,
        retries: u32,
    },

    #[error("duplicate payment: idempotency key {idempotency_key:?} already used with a different request")]
    DuplicatePayment {
        idempotency_key: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, CarteraError>;
