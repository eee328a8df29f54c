use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::info;

use crate::config::FinancingConfig;
use crate::errors::{CarteraError, Result};
use crate::types::{Allocation, Installment, InstallmentId, Invoice, InvoiceId, Payment};

/// everything persisted for one invoice, read as a single snapshot.
/// the version counter advances on every committed write and backs the
/// optimistic stale-snapshot check.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRecord {
    pub invoice: Invoice,
    pub installments: Vec<Installment>,
    pub payments: Vec<Payment>,
    pub allocations: Vec<Allocation>,
    pub version: u64,
}

impl InvoiceRecord {
    /// allocations applied to one installment
    pub fn allocations_for(&self, installment_id: InstallmentId) -> Vec<&Allocation> {
        self.allocations
            .iter()
            .filter(|a| a.installment_id == installment_id)
            .collect()
    }

    /// installments that already carry at least one allocation
    pub fn allocated_installments(&self) -> Vec<InstallmentId> {
        self.installments
            .iter()
            .filter(|i| self.allocations.iter().any(|a| a.installment_id == i.id))
            .map(|i| i.id)
            .collect()
    }
}

/// persistence boundary for invoices, installments, payments and
/// allocations. the engine never reaches past this trait: the
/// read-allocate-write cycle runs inside `with_invoice_lock`, and both
/// commit operations are atomic and version-checked.
pub trait InvoiceStore {
    /// store a new invoice
    fn insert_invoice(&self, invoice: Invoice) -> Result<()>;

    /// read the full snapshot for an invoice
    fn load(&self, invoice_id: InvoiceId) -> Result<InvoiceRecord>;

    /// run `f` while holding an exclusive invoice-scoped lock. writes to
    /// other invoices are not serialized against this one.
    fn with_invoice_lock<T>(
        &self,
        invoice_id: InvoiceId,
        f: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<T>
    where
        Self: Sized;

    /// replace the invoice's schedule. fails with `ScheduleLocked` when any
    /// existing installment carries allocations, and with
    /// `ConcurrentModification` when the snapshot version is stale.
    fn commit_schedule(
        &self,
        invoice_id: InvoiceId,
        expected_version: u64,
        financing: FinancingConfig,
        installments: Vec<Installment>,
    ) -> Result<()>;

    /// atomically store a payment with its allocations and stamp paid dates
    /// on installments the payment completed. all-or-nothing: a stale
    /// version leaves the record untouched.
    fn commit_payment(
        &self,
        invoice_id: InvoiceId,
        expected_version: u64,
        payment: Payment,
        allocations: Vec<Allocation>,
        paid_installments: Vec<(InstallmentId, NaiveDate)>,
    ) -> Result<()>;
}

/// in-memory reference implementation with per-invoice locking
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<InvoiceId, InvoiceRecord>>,
    locks: Mutex<HashMap<InvoiceId, Arc<Mutex<()>>>>,
}

fn recover<'a, T>(guard: std::sync::LockResult<std::sync::MutexGuard<'a, T>>) -> std::sync::MutexGuard<'a, T> {
    guard.unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn invoice_lock(&self, invoice_id: InvoiceId) -> Arc<Mutex<()>> {
        let mut locks = recover(self.locks.lock());
        locks
            .entry(invoice_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl InvoiceStore for MemoryStore {
    fn insert_invoice(&self, invoice: Invoice) -> Result<()> {
        let mut records = recover(self.records.lock());
        records.insert(
            invoice.id,
            InvoiceRecord {
                invoice,
                installments: Vec::new(),
                payments: Vec::new(),
                allocations: Vec::new(),
                version: 0,
            },
        );
        Ok(())
    }

    fn load(&self, invoice_id: InvoiceId) -> Result<InvoiceRecord> {
        let records = recover(self.records.lock());
        records
            .get(&invoice_id)
            .cloned()
            .ok_or(CarteraError::InvoiceNotFound { invoice_id })
    }

    fn with_invoice_lock<T>(
        &self,
        invoice_id: InvoiceId,
        f: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<T> {
        let lock = self.invoice_lock(invoice_id);
        let _guard = recover(lock.lock());
        f(self)
    }

    fn commit_schedule(
        &self,
        invoice_id: InvoiceId,
        expected_version: u64,
        financing: FinancingConfig,
        installments: Vec<Installment>,
    ) -> Result<()> {
        let mut records = recover(self.records.lock());
        let record = records
            .get_mut(&invoice_id)
            .ok_or(CarteraError::InvoiceNotFound { invoice_id })?;

        if record.version != expected_version {
            return Err(CarteraError::ConcurrentModification {
                invoice_id,
                retries: 0,
            });
        }

        let allocated = record.allocated_installments();
        if !allocated.is_empty() {
            return Err(CarteraError::ScheduleLocked {
                invoice_id,
                allocated_installments: allocated.len(),
            });
        }

        record.invoice.modality = crate::types::PaymentModality::Financed;
        record.invoice.financing = Some(financing);
        record.installments = installments;
        record.version += 1;

        info!(
            %invoice_id,
            installments = record.installments.len(),
            version = record.version,
            "schedule committed"
        );

        Ok(())
    }

    fn commit_payment(
        &self,
        invoice_id: InvoiceId,
        expected_version: u64,
        payment: Payment,
        allocations: Vec<Allocation>,
        paid_installments: Vec<(InstallmentId, NaiveDate)>,
    ) -> Result<()> {
        let mut records = recover(self.records.lock());
        let record = records
            .get_mut(&invoice_id)
            .ok_or(CarteraError::InvoiceNotFound { invoice_id })?;

        if record.version != expected_version {
            return Err(CarteraError::ConcurrentModification {
                invoice_id,
                retries: 0,
            });
        }

        info!(
            %invoice_id,
            payment_id = %payment.id,
            amount = %payment.amount,
            allocations = allocations.len(),
            "payment committed"
        );

        record.payments.push(payment);
        record.allocations.extend(allocations);
        for (installment_id, paid_date) in paid_installments {
            if let Some(installment) = record
                .installments
                .iter_mut()
                .find(|i| i.id == installment_id)
            {
                installment.paid_date = Some(paid_date);
            }
        }
        record.version += 1;

        Ok(())
    }
}
