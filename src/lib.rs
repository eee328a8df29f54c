pub mod allocation;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod schedule;
pub mod store;
pub mod types;

// re-export key types
pub use allocation::{AllocationMode, AllocationPlan, ManualEntry, PaymentAllocator, PlanEntry};
pub use config::FinancingConfig;
pub use decimal::{Money, Rate};
pub use engine::{
    ApplyPaymentRequest, ApplyPaymentResponse, CarteraEngine, ConfigureFinancingRequest,
    ConfigureFinancingResponse, DistributionMode,
};
pub use errors::{CarteraError, Result};
pub use events::{Event, EventStore};
pub use ledger::{InstallmentView, InvoiceLedger};
pub use schedule::{AmortizationSchedule, ScheduleRow};
pub use store::{InvoiceRecord, InvoiceStore, MemoryStore};
pub use types::{
    Allocation, AllocationId, Installment, InstallmentId, InstallmentStatus, Invoice, InvoiceId,
    Payment, PaymentId, PaymentMethod, PaymentModality,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
