use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{CarteraError, Result};

/// minimum number of installments for financing; a single "installment" is not financing
pub const MIN_INSTALLMENTS: u32 = 2;
/// maximum number of installments
pub const MAX_INSTALLMENTS: u32 = 60;
/// maximum monthly interest rate, in percent
pub const MAX_MONTHLY_RATE_PERCENT: Decimal = dec!(10);

/// tolerance when comparing a payment amount against the sum of its
/// allocations, in currency units
pub const ALLOCATION_TOLERANCE: Decimal = dec!(0.01);

/// retries for the read-allocate-write cycle on a stale ledger snapshot
pub const MAX_COMMIT_RETRIES: u32 = 3;

/// financing terms for an invoice paid in installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancingConfig {
    pub installment_count: u32,
    pub monthly_rate: Rate,
    pub start_date: NaiveDate,
}

impl FinancingConfig {
    pub fn new(installment_count: u32, monthly_rate: Rate, start_date: NaiveDate) -> Result<Self> {
        let config = Self {
            installment_count,
            monthly_rate,
            start_date,
        };
        config.validate()?;
        Ok(config)
    }

    /// validate term and rate ranges
    pub fn validate(&self) -> Result<()> {
        if self.installment_count < MIN_INSTALLMENTS || self.installment_count > MAX_INSTALLMENTS {
            return Err(CarteraError::InvalidInstallmentCount {
                count: self.installment_count,
            });
        }

        let percent = self.monthly_rate.as_percentage();
        if percent.is_sign_negative() || percent > MAX_MONTHLY_RATE_PERCENT {
            return Err(CarteraError::InvalidInterestRate {
                rate: self.monthly_rate,
            });
        }

        Ok(())
    }
}
