use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::allocation::{AllocationMode, AllocationPlan, ManualEntry, PaymentAllocator};
use crate::config::{FinancingConfig, MAX_COMMIT_RETRIES};
use crate::decimal::{Money, Rate};
use crate::errors::{CarteraError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::InvoiceLedger;
use crate::schedule::{AmortizationSchedule, ScheduleRow};
use crate::store::{InvoiceRecord, InvoiceStore};
use crate::types::{Allocation, InstallmentId, Invoice, InvoiceId, Payment, PaymentMethod};

/// request to (re)configure installment financing for an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigureFinancingRequest {
    pub invoice_id: InvoiceId,
    pub installment_count: u32,
    pub monthly_rate_percent: Decimal,
    pub start_date: NaiveDate,
}

/// ordered schedule produced by financing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureFinancingResponse {
    pub invoice_id: InvoiceId,
    pub schedule: Vec<ScheduleRow>,
}

/// distribution mode requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMode {
    Automatic,
    Manual,
}

/// request to apply an incoming payment to an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyPaymentRequest {
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub recorded_by: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub mode: DistributionMode,
    #[serde(default)]
    pub manual_entries: Option<Vec<ManualEntry>>,
}

impl ApplyPaymentRequest {
    fn allocation_mode(&self) -> Result<AllocationMode> {
        match (self.mode, &self.manual_entries) {
            (DistributionMode::Automatic, None) => Ok(AllocationMode::Automatic),
            (DistributionMode::Automatic, Some(_)) => Err(CarteraError::InvalidRequest {
                message: "manual_entries not allowed in automatic mode".to_string(),
            }),
            (DistributionMode::Manual, Some(entries)) => Ok(AllocationMode::Manual {
                entries: entries.clone(),
            }),
            (DistributionMode::Manual, None) => Err(CarteraError::InvalidRequest {
                message: "manual mode requires manual_entries".to_string(),
            }),
        }
    }
}

/// result of applying a payment: the stored payment, its allocations, and
/// the refreshed ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyPaymentResponse {
    pub payment: Payment,
    pub allocations: Vec<Allocation>,
    pub ledger: InvoiceLedger,
}

/// installment financing engine: schedule generation, payment allocation
/// and ledger projection over an injected store. all writes for one
/// invoice run inside the store's invoice lock; rejections leave stored
/// state exactly as it was.
pub struct CarteraEngine<'t, S: InvoiceStore> {
    store: S,
    time: &'t SafeTimeProvider,
    events: EventStore,
}

impl<'t, S: InvoiceStore> CarteraEngine<'t, S> {
    pub fn new(store: S, time: &'t SafeTimeProvider) -> Self {
        Self {
            store,
            time,
            events: EventStore::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    /// register a new invoice
    pub fn register_invoice(&mut self, invoice: Invoice) -> Result<()> {
        self.store.insert_invoice(invoice)
    }

    /// current ledger projection for an invoice, derived at the clock's now
    pub fn ledger(&self, invoice_id: InvoiceId) -> Result<InvoiceLedger> {
        let record = self.store.load(invoice_id)?;
        if !record.invoice.is_financed() {
            return Err(CarteraError::InvoiceNotFinanced { invoice_id });
        }
        Ok(derive_ledger(&record, self.time.now().date_naive()))
    }

    /// mark an invoice as financed and generate its amortization schedule.
    /// reconfiguration regenerates the schedule; installments that already
    /// carry allocations are never silently discarded, the whole request
    /// fails with `ScheduleLocked` instead.
    pub fn configure_financing(
        &mut self,
        request: ConfigureFinancingRequest,
    ) -> Result<ConfigureFinancingResponse> {
        let config = FinancingConfig::new(
            request.installment_count,
            Rate::from_percentage(request.monthly_rate_percent),
            request.start_date,
        )?;

        let time = self.time;
        let Self { store, events, .. } = self;
        let invoice_id = request.invoice_id;

        store.with_invoice_lock(invoice_id, |store| {
            let record = store.load(invoice_id)?;
            let previous_count = record.installments.len() as u32;

            let schedule = AmortizationSchedule::generate(record.invoice.total_amount, &config)?;
            let installments = schedule.to_installments(invoice_id);

            store.commit_schedule(invoice_id, record.version, config, installments)?;

            if previous_count > 0 {
                warn!(
                    %invoice_id,
                    previous_count,
                    installment_count = config.installment_count,
                    "financing reconfigured, prior schedule replaced"
                );
                events.emit(Event::ScheduleRegenerated {
                    invoice_id,
                    previous_count,
                    installment_count: config.installment_count,
                    timestamp: time.now(),
                });
            } else {
                events.emit(Event::ScheduleGenerated {
                    invoice_id,
                    principal: record.invoice.total_amount,
                    installment_count: config.installment_count,
                    total_interest: schedule.total_interest,
                    timestamp: time.now(),
                });
            }

            Ok(ConfigureFinancingResponse {
                invoice_id,
                schedule: schedule.rows,
            })
        })
    }

    /// apply an incoming payment to an invoice's installments. the read,
    /// the allocation planning and the write form one serialized unit of
    /// work per invoice; a stale snapshot restarts the cycle.
    pub fn apply_payment(&mut self, request: ApplyPaymentRequest) -> Result<ApplyPaymentResponse> {
        if !request.amount.is_positive() {
            return Err(CarteraError::InvalidPaymentAmount {
                amount: request.amount,
            });
        }
        let mode = request.allocation_mode()?;

        let time = self.time;
        let Self { store, events, .. } = self;
        let invoice_id = request.invoice_id;
        let today = time.now().date_naive();

        store.with_invoice_lock(invoice_id, |store| {
            let mut record = store.load(invoice_id)?;
            if !record.invoice.is_financed() {
                return Err(CarteraError::InvoiceNotFinanced { invoice_id });
            }

            // duplicate submission: the first payment with this key wins,
            // a replay returns the stored outcome without a second write
            if let Some(key) = &request.idempotency_key {
                if let Some(existing) = record
                    .payments
                    .iter()
                    .find(|p| p.idempotency_key.as_deref() == Some(key))
                {
                    if existing.amount != request.amount {
                        return Err(CarteraError::DuplicatePayment {
                            idempotency_key: key.clone(),
                        });
                    }
                    info!(%invoice_id, payment_id = %existing.id, "idempotent replay");
                    let allocations: Vec<Allocation> = record
                        .allocations
                        .iter()
                        .filter(|a| a.payment_id == existing.id)
                        .cloned()
                        .collect();
                    return Ok(ApplyPaymentResponse {
                        payment: existing.clone(),
                        allocations,
                        ledger: derive_ledger(&record, today),
                    });
                }
            }

            let mut attempts = 0;
            loop {
                let ledger = derive_ledger(&record, today);
                let plan = PaymentAllocator::allocate(request.amount, &mode, &ledger)?;

                let (payment, allocations, paid) =
                    materialize(&request, &plan, &ledger, time, today);

                match store.commit_payment(
                    invoice_id,
                    record.version,
                    payment.clone(),
                    allocations.clone(),
                    paid.iter().map(|p| (p.installment_id, p.paid_date)).collect(),
                ) {
                    Ok(()) => {
                        events.emit(Event::PaymentReceived {
                            invoice_id,
                            payment_id: payment.id,
                            amount: payment.amount,
                            method: payment.method,
                            allocated_installments: allocations.len(),
                            timestamp: time.now(),
                        });
                        for paid_off in &paid {
                            events.emit(Event::InstallmentPaid {
                                invoice_id,
                                installment_id: paid_off.installment_id,
                                sequence: paid_off.sequence,
                                paid_date: paid_off.paid_date,
                            });
                        }

                        let refreshed = derive_ledger(&store.load(invoice_id)?, today);
                        if refreshed.is_settled() {
                            events.emit(Event::InvoiceSettled {
                                invoice_id,
                                total_paid: refreshed.total_paid(),
                                timestamp: time.now(),
                            });
                        }

                        return Ok(ApplyPaymentResponse {
                            payment,
                            allocations,
                            ledger: refreshed,
                        });
                    }
                    Err(CarteraError::ConcurrentModification { .. }) => {
                        attempts += 1;
                        if attempts >= MAX_COMMIT_RETRIES {
                            return Err(CarteraError::ConcurrentModification {
                                invoice_id,
                                retries: attempts,
                            });
                        }
                        warn!(%invoice_id, attempts, "stale ledger snapshot, retrying");
                        record = store.load(invoice_id)?;
                    }
                    Err(other) => return Err(other),
                }
            }
        })
    }
}

fn derive_ledger(record: &InvoiceRecord, today: NaiveDate) -> InvoiceLedger {
    InvoiceLedger::derive(
        record.invoice.id,
        &record.installments,
        &record.allocations,
        today,
    )
}

/// an installment fully repaid by the payment being materialized
struct PaidOff {
    installment_id: InstallmentId,
    sequence: u32,
    paid_date: NaiveDate,
}

/// turn an allocation plan into persistable rows: the payment, one
/// allocation per plan entry, and the payoff records for installments the
/// payment completes
fn materialize(
    request: &ApplyPaymentRequest,
    plan: &AllocationPlan,
    ledger: &InvoiceLedger,
    time: &SafeTimeProvider,
    today: NaiveDate,
) -> (Payment, Vec<Allocation>, Vec<PaidOff>) {
    let payment = Payment {
        id: Uuid::new_v4(),
        invoice_id: request.invoice_id,
        amount: request.amount,
        date: today,
        method: request.method,
        reference: request.reference.clone(),
        note: request.note.clone(),
        recorded_by: request.recorded_by.clone(),
        idempotency_key: request.idempotency_key.clone(),
        recorded_at: time.now(),
    };

    let allocations: Vec<Allocation> = plan
        .entries
        .iter()
        .map(|entry| Allocation {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            installment_id: entry.installment_id,
            amount: entry.amount,
            applied_at: time.now(),
        })
        .collect();

    let paid = plan
        .entries
        .iter()
        .filter_map(|entry| ledger.view(entry.installment_id).map(|v| (entry, v)))
        .filter(|(entry, view)| view.remaining_balance == entry.amount)
        .map(|(entry, view)| PaidOff {
            installment_id: entry.installment_id,
            sequence: view.sequence,
            paid_date: today,
        })
        .collect();

    (payment, allocations, paid)
}
