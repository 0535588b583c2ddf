use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::cumulative::{
    compute_month_with, CumulativeState, MonthResult, MonthlyIncomeInput, WithholdingOptions,
};
use crate::policy::{resolve_policy, PolicyRepository};
use crate::types::{with_metadata, ComputationOutput};
use crate::FincalcResult;

fn default_anchor_day() -> u32 {
    1
}

/// One month of withholding against the policy in force for `region`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthRequest {
    pub region: String,
    /// Year-to-date totals before this month; empty for the first month.
    #[serde(default)]
    pub state: CumulativeState,
    pub income: MonthlyIncomeInput,
    #[serde(default)]
    pub options: WithholdingOptions,
    #[serde(default = "default_anchor_day")]
    pub anchor_day: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthOutput {
    pub result: MonthResult,
    /// Feed back as `state` for the following month.
    pub state: CumulativeState,
}

pub fn calculate_month<R: PolicyRepository + ?Sized>(
    request: &MonthRequest,
    repo: &R,
) -> FincalcResult<ComputationOutput<MonthOutput>> {
    let started = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let ym = request.income.year_month()?;
    let date = ym.anchor_date(request.anchor_day)?;
    let policy = resolve_policy(repo, &request.region, date)?;

    if request.state.year.is_some_and(|y| y != ym.year) {
        warnings.push(format!(
            "Supplied state belongs to {}; starting {} from zero",
            request.state.year.unwrap_or_default(),
            ym.year
        ));
    }

    let (state, result) =
        compute_month_with(&request.state, &request.income, &policy, &request.options)?;
    if result.tax_this_month < Decimal::ZERO {
        warnings.push(format!(
            "Negative withholding {} (cumulative liability fell)",
            result.tax_this_month
        ));
    }

    let elapsed = started.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Cumulative withholding: monthly tax = tax on YTD taxable income − tax already withheld",
        &serde_json::json!({
            "region": request.region,
            "policy_date": date.to_string(),
            "policy_signature": policy.signature.short(),
            "bonus_mode": request.options.bonus_mode,
            "clamp_negative_monthly_tax": request.options.clamp_negative_monthly_tax,
        }),
        warnings,
        elapsed,
        MonthOutput { result, state },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FincalcError;
    use crate::policy::{presets::standard_policy, InMemoryPolicyRepository};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn repo() -> InMemoryPolicyRepository {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        InMemoryPolicyRepository::from_policies(vec![standard_policy("chengdu", from)]).unwrap()
    }

    #[test]
    fn test_state_chains_between_requests() {
        let repo = repo();
        let jan = MonthRequest {
            region: "chengdu".into(),
            state: CumulativeState::new(),
            income: MonthlyIncomeInput::new(2024, 1, dec!(20000)),
            options: WithholdingOptions::default(),
            anchor_day: 1,
        };
        let first = calculate_month(&jan, &repo).unwrap();
        let feb = MonthRequest {
            state: first.result.state.clone(),
            income: MonthlyIncomeInput::new(2024, 2, dec!(20000)),
            ..jan
        };
        let second = calculate_month(&feb, &repo).unwrap();
        assert_eq!(second.result.result.months_elapsed, 2);
        assert_eq!(
            second.result.result.tax_this_month,
            first.result.result.tax_this_month
        );
    }

    #[test]
    fn test_missing_policy_is_an_error() {
        let request = MonthRequest {
            region: "chengdu".into(),
            state: CumulativeState::new(),
            income: MonthlyIncomeInput::new(2023, 12, dec!(20000)),
            options: WithholdingOptions::default(),
            anchor_day: 1,
        };
        assert!(matches!(
            calculate_month(&request, &repo()).unwrap_err(),
            FincalcError::ConfigNotFound { .. }
        ));
    }
}
