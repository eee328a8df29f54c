use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{InstallmentId, InvoiceId, PaymentId, PaymentMethod};

/// all events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // financing lifecycle
    ScheduleGenerated {
        invoice_id: InvoiceId,
        principal: Money,
        installment_count: u32,
        total_interest: Money,
        timestamp: DateTime<Utc>,
    },
    ScheduleRegenerated {
        invoice_id: InvoiceId,
        previous_count: u32,
        installment_count: u32,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentReceived {
        invoice_id: InvoiceId,
        payment_id: PaymentId,
        amount: Money,
        method: PaymentMethod,
        allocated_installments: usize,
        timestamp: DateTime<Utc>,
    },
    InstallmentPaid {
        invoice_id: InvoiceId,
        installment_id: InstallmentId,
        sequence: u32,
        paid_date: NaiveDate,
    },
    InvoiceSettled {
        invoice_id: InvoiceId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            Event::ScheduleGenerated { invoice_id, .. }
            | Event::ScheduleRegenerated { invoice_id, .. }
            | Event::PaymentReceived { invoice_id, .. }
            | Event::InstallmentPaid { invoice_id, .. }
            | Event::InvoiceSettled { invoice_id, .. } => *invoice_id,
        }
    }
}

/// append-only in-memory event log
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_for_invoice(&self, invoice_id: InvoiceId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.invoice_id() == invoice_id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
