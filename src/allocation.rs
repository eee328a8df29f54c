use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ALLOCATION_TOLERANCE;
use crate::decimal::Money;
use crate::errors::{CarteraError, Result};
use crate::ledger::{InstallmentView, InvoiceLedger};
use crate::types::InstallmentId;

/// how a payment is distributed across installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AllocationMode {
    /// overdue installments first, then ascending due date
    Automatic,
    /// caller-supplied distribution, validated entry by entry
    Manual { entries: Vec<ManualEntry> },
}

/// one caller-supplied manual distribution entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManualEntry {
    pub installment_id: InstallmentId,
    pub amount: Money,
}

/// one planned application of payment money to an installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub installment_id: InstallmentId,
    pub sequence: u32,
    pub amount: Money,
}

/// validated distribution of a payment, ready to persist.
/// entries are non-zero and sum to the payment amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub entries: Vec<PlanEntry>,
    pub total: Money,
}

/// computes how an incoming payment lands on outstanding installments.
/// pure planning: takes an immutable ledger snapshot and returns a plan
/// value; nothing here touches stored state.
pub struct PaymentAllocator;

impl PaymentAllocator {
    /// plan the distribution of `amount` over the ledger's open installments
    pub fn allocate(
        amount: Money,
        mode: &AllocationMode,
        ledger: &InvoiceLedger,
    ) -> Result<AllocationPlan> {
        if !amount.is_positive() {
            return Err(CarteraError::InvalidPaymentAmount { amount });
        }

        if ledger.open_installments().next().is_none() {
            return Err(CarteraError::NothingToAllocate {
                invoice_id: ledger.invoice_id,
            });
        }

        let plan = match mode {
            AllocationMode::Automatic => Self::allocate_automatic(amount, ledger)?,
            AllocationMode::Manual { entries } => Self::allocate_manual(amount, entries, ledger)?,
        };

        debug!(
            invoice_id = %ledger.invoice_id,
            %amount,
            entries = plan.entries.len(),
            "allocation plan ready"
        );

        Ok(plan)
    }

    /// greedy fill: overdue installments ahead of everything else, then
    /// ascending due date. a remainder after the list is exhausted means
    /// the payment exceeds the invoice's outstanding balance.
    fn allocate_automatic(amount: Money, ledger: &InvoiceLedger) -> Result<AllocationPlan> {
        let mut open: Vec<&InstallmentView> = ledger.open_installments().collect();
        open.sort_by_key(|v| (!v.is_overdue(), v.due_date, v.sequence));

        let mut remaining = amount;
        let mut entries = Vec::new();

        for view in open {
            if remaining.is_zero() {
                break;
            }

            let applied = remaining.min(view.remaining_balance);
            entries.push(PlanEntry {
                installment_id: view.installment_id,
                sequence: view.sequence,
                amount: applied,
            });
            remaining -= applied;
        }

        if remaining.is_positive() {
            return Err(CarteraError::Overpayment {
                outstanding: ledger.total_outstanding(),
                requested: amount,
            });
        }

        Ok(AllocationPlan {
            entries,
            total: amount,
        })
    }

    /// validate a caller-supplied distribution: every entry must name a
    /// distinct installment on the ledger and fit within its remaining
    /// balance, and the entry total must match the payment amount within
    /// tolerance. any violation rejects the whole distribution.
    fn allocate_manual(
        amount: Money,
        entries: &[ManualEntry],
        ledger: &InvoiceLedger,
    ) -> Result<AllocationPlan> {
        let mut seen: HashSet<InstallmentId> = HashSet::new();
        let mut planned = Vec::new();
        let mut total = Money::ZERO;

        for entry in entries {
            if !seen.insert(entry.installment_id) {
                return Err(CarteraError::DuplicateManualEntry {
                    installment_id: entry.installment_id,
                });
            }

            let view = ledger.view(entry.installment_id).ok_or(
                CarteraError::UnknownInstallment {
                    installment_id: entry.installment_id,
                },
            )?;

            if entry.amount.is_negative() || entry.amount > view.remaining_balance {
                return Err(CarteraError::ExceedsInstallmentBalance {
                    installment_id: entry.installment_id,
                    remaining: view.remaining_balance,
                    requested: entry.amount,
                });
            }

            total += entry.amount;

            if entry.amount.is_positive() {
                planned.push(PlanEntry {
                    installment_id: view.installment_id,
                    sequence: view.sequence,
                    amount: entry.amount,
                });
            }
        }

        if (total - amount).abs().as_decimal() > ALLOCATION_TOLERANCE {
            return Err(CarteraError::DistributionMismatch {
                expected: amount,
                provided: total,
            });
        }

        Ok(AllocationPlan {
            entries: planned,
            total: amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    use crate::types::InstallmentStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn view(
        sequence: u32,
        due: NaiveDate,
        scheduled: i64,
        paid: i64,
        today: NaiveDate,
    ) -> InstallmentView {
        let remaining = Money::from_major(scheduled - paid);
        let overdue = remaining.is_positive() && due < today;
        InstallmentView {
            installment_id: Uuid::new_v4(),
            sequence,
            due_date: due,
            scheduled_amount: Money::from_major(scheduled),
            paid_amount: Money::from_major(paid),
            remaining_balance: remaining,
            status: if remaining.is_zero() {
                InstallmentStatus::Paid
            } else if overdue {
                InstallmentStatus::Overdue
            } else if paid > 0 {
                InstallmentStatus::Partial
            } else {
                InstallmentStatus::Pending
            },
            days_overdue: if overdue { (today - due).num_days() as u32 } else { 0 },
        }
    }

    fn ledger(today: NaiveDate, views: Vec<InstallmentView>) -> InvoiceLedger {
        InvoiceLedger {
            invoice_id: Uuid::new_v4(),
            as_of: today,
            installments: views,
        }
    }

    #[test]
    fn test_automatic_overdue_then_due_date_order() {
        let today = date(2024, 6, 15);
        // overdue 100,000 and upcoming 150,000
        let overdue = view(1, date(2024, 6, 1), 100_000, 0, today);
        let upcoming = view(2, date(2024, 7, 1), 150_000, 0, today);
        let snapshot = ledger(today, vec![overdue.clone(), upcoming.clone()]);

        let plan = PaymentAllocator::allocate(
            Money::from_major(120_000),
            &AllocationMode::Automatic,
            &snapshot,
        )
        .unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].installment_id, overdue.installment_id);
        assert_eq!(plan.entries[0].amount, Money::from_major(100_000));
        assert_eq!(plan.entries[1].installment_id, upcoming.installment_id);
        assert_eq!(plan.entries[1].amount, Money::from_major(20_000));
    }

    #[test]
    fn test_automatic_prefers_overdue_over_earlier_due_date() {
        let today = date(2024, 8, 15);
        // sequence 2 is overdue, sequence 1 was already paid down and closed;
        // a later-due overdue row must come before any non-overdue row even
        // when the non-overdue one has the earlier due date
        let open_later_overdue = view(3, date(2024, 8, 1), 200_000, 0, today);
        let open_earlier_pending = view(2, date(2024, 9, 1), 200_000, 0, today);
        let snapshot = ledger(
            today,
            vec![open_earlier_pending.clone(), open_later_overdue.clone()],
        );

        let plan = PaymentAllocator::allocate(
            Money::from_major(50_000),
            &AllocationMode::Automatic,
            &snapshot,
        )
        .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(
            plan.entries[0].installment_id,
            open_later_overdue.installment_id
        );
    }

    #[test]
    fn test_automatic_never_skips_unfilled_overdue() {
        let today = date(2024, 9, 1);
        let first_overdue = view(1, date(2024, 7, 1), 100_000, 30_000, today);
        let second_overdue = view(2, date(2024, 8, 1), 100_000, 0, today);
        let pending = view(3, date(2024, 10, 1), 100_000, 0, today);
        let snapshot = ledger(
            today,
            vec![pending.clone(), second_overdue.clone(), first_overdue.clone()],
        );

        let plan = PaymentAllocator::allocate(
            Money::from_major(180_000),
            &AllocationMode::Automatic,
            &snapshot,
        )
        .unwrap();

        // 70,000 tops up the first overdue, 100,000 fills the second,
        // only then does money reach the pending installment
        assert_eq!(plan.entries[0].installment_id, first_overdue.installment_id);
        assert_eq!(plan.entries[0].amount, Money::from_major(70_000));
        assert_eq!(plan.entries[1].installment_id, second_overdue.installment_id);
        assert_eq!(plan.entries[1].amount, Money::from_major(100_000));
        assert_eq!(plan.entries[2].installment_id, pending.installment_id);
        assert_eq!(plan.entries[2].amount, Money::from_major(10_000));
    }

    #[test]
    fn test_automatic_exact_payoff() {
        let today = date(2024, 6, 15);
        let snapshot = ledger(
            today,
            vec![
                view(1, date(2024, 6, 1), 100_000, 0, today),
                view(2, date(2024, 7, 1), 150_000, 0, today),
            ],
        );

        let plan = PaymentAllocator::allocate(
            Money::from_major(250_000),
            &AllocationMode::Automatic,
            &snapshot,
        )
        .unwrap();

        let total: Money = plan.entries.iter().map(|e| e.amount).sum();
        assert_eq!(total, Money::from_major(250_000));
    }

    #[test]
    fn test_automatic_overpayment_rejected() {
        let today = date(2024, 6, 15);
        let snapshot = ledger(
            today,
            vec![
                view(1, date(2024, 6, 1), 100_000, 0, today),
                view(2, date(2024, 7, 1), 150_000, 0, today),
            ],
        );

        let err = PaymentAllocator::allocate(
            Money::from_major(400_000),
            &AllocationMode::Automatic,
            &snapshot,
        )
        .unwrap_err();

        match err {
            CarteraError::Overpayment {
                outstanding,
                requested,
            } => {
                assert_eq!(outstanding, Money::from_major(250_000));
                assert_eq!(requested, Money::from_major(400_000));
            }
            other => panic!("expected Overpayment, got {other:?}"),
        }
    }

    #[test]
    fn test_manual_valid_distribution() {
        let today = date(2024, 6, 15);
        let first = view(1, date(2024, 6, 1), 100_000, 0, today);
        let second = view(2, date(2024, 7, 1), 150_000, 0, today);
        let snapshot = ledger(today, vec![first.clone(), second.clone()]);

        let mode = AllocationMode::Manual {
            entries: vec![
                ManualEntry {
                    installment_id: first.installment_id,
                    amount: Money::from_major(30_000),
                },
                ManualEntry {
                    installment_id: second.installment_id,
                    amount: Money::from_major(70_000),
                },
            ],
        };

        let plan =
            PaymentAllocator::allocate(Money::from_major(100_000), &mode, &snapshot).unwrap();
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.total, Money::from_major(100_000));
    }

    #[test]
    fn test_manual_zero_entries_dropped_from_plan() {
        let today = date(2024, 6, 15);
        let first = view(1, date(2024, 6, 1), 100_000, 0, today);
        let second = view(2, date(2024, 7, 1), 150_000, 0, today);
        let snapshot = ledger(today, vec![first.clone(), second.clone()]);

        let mode = AllocationMode::Manual {
            entries: vec![
                ManualEntry {
                    installment_id: first.installment_id,
                    amount: Money::from_major(50_000),
                },
                ManualEntry {
                    installment_id: second.installment_id,
                    amount: Money::ZERO,
                },
            ],
        };

        let plan = PaymentAllocator::allocate(Money::from_major(50_000), &mode, &snapshot).unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].installment_id, first.installment_id);
    }

    #[test]
    fn test_manual_distribution_mismatch_rejected() {
        let today = date(2024, 6, 15);
        let first = view(1, date(2024, 6, 1), 100_000, 0, today);
        let snapshot = ledger(today, vec![first.clone()]);

        let mode = AllocationMode::Manual {
            entries: vec![ManualEntry {
                installment_id: first.installment_id,
                amount: Money::from_major(80_000),
            }],
        };

        let err =
            PaymentAllocator::allocate(Money::from_major(100_000), &mode, &snapshot).unwrap_err();
        assert!(matches!(err, CarteraError::DistributionMismatch { .. }));
    }

    #[test]
    fn test_manual_entry_over_balance_rejected() {
        let today = date(2024, 6, 15);
        let first = view(1, date(2024, 6, 1), 100_000, 40_000, today);
        let snapshot = ledger(today, vec![first.clone()]);

        let mode = AllocationMode::Manual {
            entries: vec![ManualEntry {
                installment_id: first.installment_id,
                amount: Money::from_major(70_000),
            }],
        };

        let err =
            PaymentAllocator::allocate(Money::from_major(70_000), &mode, &snapshot).unwrap_err();
        match err {
            CarteraError::ExceedsInstallmentBalance { remaining, requested, .. } => {
                assert_eq!(remaining, Money::from_major(60_000));
                assert_eq!(requested, Money::from_major(70_000));
            }
            other => panic!("expected ExceedsInstallmentBalance, got {other:?}"),
        }
    }

    #[test]
    fn test_manual_unknown_installment_rejected() {
        let today = date(2024, 6, 15);
        let snapshot = ledger(today, vec![view(1, date(2024, 6, 1), 100_000, 0, today)]);

        let mode = AllocationMode::Manual {
            entries: vec![ManualEntry {
                installment_id: Uuid::new_v4(),
                amount: Money::from_major(50_000),
            }],
        };

        let err =
            PaymentAllocator::allocate(Money::from_major(50_000), &mode, &snapshot).unwrap_err();
        assert!(matches!(err, CarteraError::UnknownInstallment { .. }));
    }

    #[test]
    fn test_manual_duplicate_entry_rejected() {
        let today = date(2024, 6, 15);
        let first = view(1, date(2024, 6, 1), 100_000, 0, today);
        let snapshot = ledger(today, vec![first.clone()]);

        let mode = AllocationMode::Manual {
            entries: vec![
                ManualEntry {
                    installment_id: first.installment_id,
                    amount: Money::from_major(30_000),
                },
                ManualEntry {
                    installment_id: first.installment_id,
                    amount: Money::from_major(30_000),
                },
            ],
        };

        let err =
            PaymentAllocator::allocate(Money::from_major(60_000), &mode, &snapshot).unwrap_err();
        assert!(matches!(err, CarteraError::DuplicateManualEntry { .. }));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let today = date(2024, 6, 15);
        let snapshot = ledger(today, vec![view(1, date(2024, 6, 1), 100_000, 0, today)]);

        let zero =
            PaymentAllocator::allocate(Money::ZERO, &AllocationMode::Automatic, &snapshot);
        assert!(matches!(
            zero.unwrap_err(),
            CarteraError::InvalidPaymentAmount { .. }
        ));
    }

    #[test]
    fn test_nothing_to_allocate() {
        let today = date(2024, 6, 15);
        let snapshot = ledger(today, vec![view(1, date(2024, 6, 1), 100_000, 100_000, today)]);

        let err = PaymentAllocator::allocate(
            Money::from_major(10_000),
            &AllocationMode::Automatic,
            &snapshot,
        )
        .unwrap_err();
        assert!(matches!(err, CarteraError::NothingToAllocate { .. }));
    }
}
