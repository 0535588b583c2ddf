use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::FincalcError;
use crate::types::{Money, YearMonth};
use crate::FincalcResult;

/// Something that happens in a given month of a forecast.
///
/// `PolicyChanged` is derived by the engine and never accepted as input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForecastEvent {
    SalaryChange {
        effective_month: YearMonth,
        new_gross: Money,
    },
    BonusPaid {
        month: YearMonth,
        amount: Money,
    },
    LongTermCashPaid {
        month: YearMonth,
        quarterly_amount: Money,
    },
    PolicyChanged {
        month: YearMonth,
    },
}

impl ForecastEvent {
    pub fn month(&self) -> YearMonth {
        match self {
            ForecastEvent::SalaryChange {
                effective_month, ..
            } => *effective_month,
            ForecastEvent::BonusPaid { month, .. }
            | ForecastEvent::LongTermCashPaid { month, .. }
            | ForecastEvent::PolicyChanged { month } => *month,
        }
    }

    fn validate(&self, index: usize) -> FincalcResult<()> {
        let field = format!("events[{index}]");
        self.month()
            .validate()
            .map_err(|e| FincalcError::invalid(&field, e.to_string()))?;
        let amount = match self {
            ForecastEvent::SalaryChange { new_gross, .. } => *new_gross,
            ForecastEvent::BonusPaid { amount, .. } => *amount,
            ForecastEvent::LongTermCashPaid {
                quarterly_amount, ..
            } => *quarterly_amount,
            ForecastEvent::PolicyChanged { .. } => {
                return Err(FincalcError::invalid(
                    field,
                    "policy_changed events are derived and cannot be supplied",
                ))
            }
        };
        if amount < Decimal::ZERO {
            return Err(FincalcError::invalid(
                field,
                format!("Amount cannot be negative, got {amount}"),
            ));
        }
        Ok(())
    }
}

/// Expand a vesting schedule into one `LongTermCashPaid` event per quarter,
/// starting at `first_month`.
pub fn expand_long_term_cash(
    first_month: YearMonth,
    quarterly_amount: Money,
    quarters: u32,
) -> FincalcResult<Vec<ForecastEvent>> {
    first_month.validate()?;
    if quarterly_amount < Decimal::ZERO {
        return Err(FincalcError::invalid(
            "quarterly_amount",
            "Quarterly amount cannot be negative",
        ));
    }
    let events = std::iter::successors(Some(first_month), |m| Some(m.succ().succ().succ()))
        .take(quarters as usize)
        .map(|month| ForecastEvent::LongTermCashPaid {
            month,
            quarterly_amount,
        })
        .collect();
    Ok(events)
}

/// Input events indexed by month.
#[derive(Debug, Clone, Default)]
pub struct IncomeTimeline {
    /// Sorted by month; ties keep input order so the last one wins.
    salaries: Vec<(YearMonth, Money)>,
    bonuses: BTreeMap<YearMonth, Vec<Money>>,
    long_term_cash: BTreeMap<YearMonth, Vec<Money>>,
    by_month: BTreeMap<YearMonth, Vec<ForecastEvent>>,
}

impl IncomeTimeline {
    pub fn from_events(events: &[ForecastEvent]) -> FincalcResult<Self> {
        let mut timeline = IncomeTimeline::default();
        for (i, event) in events.iter().enumerate() {
            event.validate(i)?;
            match event {
                ForecastEvent::SalaryChange {
                    effective_month,
                    new_gross,
                } => timeline.salaries.push((*effective_month, *new_gross)),
                ForecastEvent::BonusPaid { month, amount } => {
                    timeline.bonuses.entry(*month).or_default().push(*amount)
                }
                ForecastEvent::LongTermCashPaid {
                    month,
                    quarterly_amount,
                } => timeline
                    .long_term_cash
                    .entry(*month)
                    .or_default()
                    .push(*quarterly_amount),
                ForecastEvent::PolicyChanged { .. } => {}
            }
            timeline
                .by_month
                .entry(event.month())
                .or_default()
                .push(event.clone());
        }
        timeline.salaries.sort_by_key(|(month, _)| *month);
        Ok(timeline)
    }

    /// Salary from the latest change effective on or before `month`.
    pub fn salary_for(&self, month: YearMonth) -> Option<Money> {
        let idx = self.salaries.partition_point(|(m, _)| *m <= month);
        idx.checked_sub(1).map(|i| self.salaries[i].1)
    }

    pub fn salary_changes_in(&self, month: YearMonth) -> bool {
        self.salaries.iter().any(|(m, _)| *m == month)
    }

    /// Total and count of bonuses paid in `month`.
    pub fn bonus_for(&self, month: YearMonth) -> (Money, usize) {
        sum_and_count(self.bonuses.get(&month))
    }

    /// Total and count of long-term cash payments in `month`.
    pub fn long_term_cash_for(&self, month: YearMonth) -> (Money, usize) {
        sum_and_count(self.long_term_cash.get(&month))
    }

    pub fn events_in(&self, month: YearMonth) -> &[ForecastEvent] {
        self.by_month.get(&month).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn sum_and_count(amounts: Option<&Vec<Money>>) -> (Money, usize) {
    amounts.map_or((Decimal::ZERO, 0), |v| (v.iter().copied().sum(), v.len()))
}
