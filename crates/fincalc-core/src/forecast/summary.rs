use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::engine::ForecastRow;
use crate::types::{Money, Rate};

/// Calendar-year roll-up of forecast rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearSummary {
    pub year: i32,
    pub months_computed: u32,
    pub months_failed: u32,
    pub gross_salary: Money,
    pub bonus: Money,
    pub social_insurance: Money,
    pub housing_fund: Money,
    /// Sum of monthly withholding, refunds included.
    pub tax_withheld: Money,
    pub bonus_tax: Money,
    pub net_income: Money,
    /// Cumulative liability at the last computed month of the year.
    pub cumulative_tax_due: Money,
    /// (tax withheld + bonus tax) / (gross + bonus); zero with no income.
    pub effective_rate: Rate,
}

pub fn summarize_years(rows: &[ForecastRow]) -> Vec<YearSummary> {
    let mut years: BTreeMap<i32, YearSummary> = BTreeMap::new();

    for row in rows {
        let year = row.year_month.year;
        let summary = years.entry(year).or_insert_with(|| YearSummary {
            year,
            ..YearSummary::default()
        });
        let Some(r) = row.result() else {
            summary.months_failed += 1;
            continue;
        };
        summary.months_computed += 1;
        summary.gross_salary += r.gross_salary;
        summary.bonus += r.bonus;
        summary.social_insurance += r.social_insurance;
        summary.housing_fund += r.housing_fund;
        summary.tax_withheld += r.tax_this_month;
        summary.bonus_tax += r.bonus_tax;
        summary.net_income += r.net_income;
        summary.cumulative_tax_due = r.cumulative_tax_due;
    }

    years
        .into_values()
        .map(|mut s| {
            let income = s.gross_salary + s.bonus;
            s.effective_rate = if income > Decimal::ZERO {
                ((s.tax_withheld + s.bonus_tax) / income).round_dp(6)
            } else {
                Decimal::ZERO
            };
            s
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{forecast, ForecastEvent, ForecastOptions};
    use crate::policy::{presets::standard_policy, InMemoryPolicyRepository};
    use crate::types::YearMonth;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    #[test]
    fn test_totals_match_rows() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let repo = InMemoryPolicyRepository::from_policies(vec![standard_policy("beijing", from)])
            .unwrap();
        let events = vec![
            ForecastEvent::SalaryChange {
                effective_month: ym(2024, 1),
                new_gross: dec!(20000),
            },
            ForecastEvent::BonusPaid {
                month: ym(2024, 12),
                amount: dec!(30000),
            },
        ];
        let rows = forecast(
            &repo,
            "beijing",
            ym(2024, 1),
            ym(2025, 3),
            &events,
            &ForecastOptions::default(),
        )
        .unwrap();
        let years = summarize_years(&rows);
        assert_eq!(years.len(), 2);

        let y2024 = &years[0];
        assert_eq!(y2024.months_computed, 12);
        assert_eq!(y2024.gross_salary, dec!(240000));
        assert_eq!(y2024.bonus, dec!(30000));
        // Withholding over a full year equals the year-end cumulative liability.
        assert_eq!(y2024.tax_withheld, y2024.cumulative_tax_due);

        let y2025 = &years[1];
        assert_eq!(y2025.months_computed, 3);
        assert_eq!(y2025.bonus, dec!(0));
    }

    #[test]
    fn test_failed_months_counted() {
        let repo = InMemoryPolicyRepository::new();
        let rows = forecast(
            &repo,
            "beijing",
            ym(2024, 1),
            ym(2024, 2),
            &[],
            &ForecastOptions::default(),
        )
        .unwrap();
        let years = summarize_years(&rows);
        assert_eq!(years[0].months_failed, 2);
        assert_eq!(years[0].effective_rate, dec!(0));
    }
}
