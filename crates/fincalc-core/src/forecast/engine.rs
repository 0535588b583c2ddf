use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::events::{ForecastEvent, IncomeTimeline};
use super::summary::{summarize_years, YearSummary};
use crate::error::FincalcError;
use crate::policy::{resolve_policy, PolicyRepository, PolicySignature, ResolvedPolicy};
use crate::types::{with_metadata, ComputationOutput, Money, YearMonth};
use crate::withholding::{
    compute_month_with, AmountOverride, CumulativeState, MonthResult, MonthlyIncomeInput,
    WithholdingOptions,
};
use crate::FincalcResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_anchor_day() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastOptions {
    /// Day of month used to resolve policy (clamped to month length).
    #[serde(default = "default_anchor_day")]
    pub anchor_day: u32,
    #[serde(default)]
    pub withholding: WithholdingOptions,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        ForecastOptions {
            anchor_day: default_anchor_day(),
            withholding: WithholdingOptions::default(),
        }
    }
}

/// Explainability flags for one forecast month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthMarkers {
    pub salary_change: bool,
    pub bonus_paid: bool,
    pub long_term_cash_paid: bool,
    pub long_term_cash_count: usize,
    /// Policy signature differs from the previous computed month.
    pub tax_change: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MonthOutcome {
    Computed(MonthResult),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub year_month: YearMonth,
    pub gross_salary: Money,
    pub bonus: Money,
    pub long_term_cash: Money,
    pub markers: MonthMarkers,
    pub events: Vec<ForecastEvent>,
    pub outcome: MonthOutcome,
}

impl ForecastRow {
    pub fn result(&self) -> Option<&MonthResult> {
        match &self.outcome {
            MonthOutcome::Computed(r) => Some(r),
            MonthOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            MonthOutcome::Computed(_) => None,
            MonthOutcome::Failed { error } => Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reuse the previous month's policy while its window still covers `date`.
/// Windows never overlap, so a covering window is the one `resolve` returns.
fn resolve_cached<'c, R: PolicyRepository + ?Sized>(
    cache: &'c mut Option<ResolvedPolicy>,
    repo: &R,
    region: &str,
    date: NaiveDate,
) -> FincalcResult<&'c ResolvedPolicy> {
    let hit = cache.as_ref().is_some_and(|r| r.policy.covers(date));
    if !hit {
        *cache = Some(resolve_policy(repo, region, date)?);
    }
    cache.as_ref().ok_or_else(|| FincalcError::ConfigNotFound {
        region: region.to_string(),
        date,
    })
}

/// Run the withholding calculator over every month in `[start, end]`.
///
/// Months are processed in order; cumulative state resets each January (or
/// at the first month seen for a year). A month whose policy cannot be
/// resolved yields a `Failed` row and the state carries past it unchanged.
pub fn forecast<R: PolicyRepository + ?Sized>(
    repo: &R,
    region: &str,
    start: YearMonth,
    end: YearMonth,
    events: &[ForecastEvent],
    options: &ForecastOptions,
) -> FincalcResult<Vec<ForecastRow>> {
    start.validate()?;
    end.validate()?;
    if end < start {
        return Err(FincalcError::invalid(
            "end",
            format!("Forecast end {end} precedes start {start}"),
        ));
    }
    if options.anchor_day == 0 || options.anchor_day > 31 {
        return Err(FincalcError::invalid(
            "anchor_day",
            format!("Anchor day must be within 1..=31, got {}", options.anchor_day),
        ));
    }

    let timeline = IncomeTimeline::from_events(events)?;
    let mut state = CumulativeState::new();
    let mut cache: Option<ResolvedPolicy> = None;
    let mut previous_signature: Option<PolicySignature> = None;
    let mut rows = Vec::new();

    for ym in start.through(end) {
        if state.year.is_some_and(|y| y != ym.year) {
            state = CumulativeState::new();
        }

        let salary = timeline.salary_for(ym);
        let (bonus, bonus_count) = timeline.bonus_for(ym);
        let (long_term_cash, long_term_count) = timeline.long_term_cash_for(ym);

        let mut input = MonthlyIncomeInput::new(ym.year, ym.month, salary.unwrap_or(Decimal::ZERO));
        let extra = bonus + long_term_cash;
        if !extra.is_zero() {
            input.bonus = Some(extra);
        }
        if salary.is_none() {
            // Not yet employed: nothing to contribute on.
            input.overrides.social_insurance_base = AmountOverride::Fixed(Decimal::ZERO);
            input.overrides.housing_fund_base = AmountOverride::Fixed(Decimal::ZERO);
        }

        let mut markers = MonthMarkers {
            salary_change: timeline.salary_changes_in(ym),
            bonus_paid: bonus_count > 0,
            long_term_cash_paid: long_term_count > 0,
            long_term_cash_count: long_term_count,
            tax_change: false,
        };
        let mut row_events = timeline.events_in(ym).to_vec();

        let resolved = match ym.anchor_date(options.anchor_day) {
            Ok(date) => resolve_cached(&mut cache, repo, region, date),
            Err(e) => Err(e),
        };

        let outcome = match resolved {
            Ok(policy) => match compute_month_with(&state, &input, policy, &options.withholding) {
                Ok((next, result)) => {
                    // Compared against the last month that actually computed.
                    markers.tax_change = previous_signature
                        .as_ref()
                        .is_some_and(|prev| *prev != policy.signature);
                    if markers.tax_change {
                        tracing::info!(
                            month = %ym,
                            region,
                            signature = policy.signature.short(),
                            "policy changed"
                        );
                        row_events.push(ForecastEvent::PolicyChanged { month: ym });
                    }
                    state = next;
                    previous_signature = Some(policy.signature.clone());
                    MonthOutcome::Computed(result)
                }
                Err(e) => {
                    tracing::warn!(month = %ym, error = %e, "withholding month failed");
                    MonthOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
            Err(e) => {
                tracing::warn!(month = %ym, region, error = %e, "policy resolution failed");
                MonthOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        rows.push(ForecastRow {
            year_month: ym,
            gross_salary: input.gross_salary,
            bonus,
            long_term_cash,
            markers,
            events: row_events,
            outcome,
        });
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub region: String,
    pub start: YearMonth,
    pub end: YearMonth,
    #[serde(default)]
    pub events: Vec<ForecastEvent>,
    #[serde(default)]
    pub options: ForecastOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub rows: Vec<ForecastRow>,
    pub years: Vec<YearSummary>,
}

/// Forecast plus per-year totals, wrapped with methodology and warnings.
pub fn calculate_forecast<R: PolicyRepository + ?Sized>(
    request: &ForecastRequest,
    repo: &R,
) -> FincalcResult<ComputationOutput<ForecastOutput>> {
    let started = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let rows = forecast(
        repo,
        &request.region,
        request.start,
        request.end,
        &request.events,
        &request.options,
    )?;

    for row in &rows {
        if let Some(error) = row.error() {
            warnings.push(format!("{}: {}", row.year_month, error));
        }
        if let Some(r) = row.result() {
            if r.tax_this_month < Decimal::ZERO {
                warnings.push(format!(
                    "{}: negative withholding {} (cumulative liability fell)",
                    row.year_month, r.tax_this_month
                ));
            }
        }
    }

    let years = summarize_years(&rows);
    let output = ForecastOutput { rows, years };

    let elapsed = started.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Cumulative withholding: monthly tax = tax on YTD taxable income − tax already withheld",
        &serde_json::json!({
            "region": request.region,
            "start": request.start.to_string(),
            "end": request.end.to_string(),
            "anchor_day": request.options.anchor_day,
            "bonus_mode": request.options.withholding.bonus_mode,
            "clamp_negative_monthly_tax": request.options.withholding.clamp_negative_monthly_tax,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{presets::standard_policy, InMemoryPolicyRepository};
    use rust_decimal_macros::dec;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn repo() -> InMemoryPolicyRepository {
        let from = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        InMemoryPolicyRepository::from_policies(vec![standard_policy("shanghai", from)]).unwrap()
    }

    fn salary(y: i32, m: u32, gross: Decimal) -> ForecastEvent {
        ForecastEvent::SalaryChange {
            effective_month: ym(y, m),
            new_gross: gross,
        }
    }

    #[test]
    fn test_reversed_range_rejected() {
        let err = forecast(
            &repo(),
            "shanghai",
            ym(2024, 5),
            ym(2024, 1),
            &[],
            &ForecastOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FincalcError::InvalidInput { .. }));
    }

    #[test]
    fn test_months_before_first_salary_have_no_contributions() {
        let events = vec![salary(2024, 3, dec!(20000))];
        let rows = forecast(
            &repo(),
            "shanghai",
            ym(2024, 1),
            ym(2024, 3),
            &events,
            &ForecastOptions::default(),
        )
        .unwrap();
        let jan = rows[0].result().unwrap();
        assert_eq!(jan.social_insurance, dec!(0));
        assert_eq!(jan.tax_this_month, dec!(0));
        assert!(rows[2].markers.salary_change);
        assert!(!rows[1].markers.salary_change);
    }

    #[test]
    fn test_unknown_region_fails_per_month() {
        let events = vec![salary(2024, 1, dec!(20000))];
        let rows = forecast(
            &repo(),
            "nowhere",
            ym(2024, 1),
            ym(2024, 2),
            &events,
            &ForecastOptions::default(),
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.error().is_some()));
    }

    #[test]
    fn test_long_term_cash_count_marker() {
        let events = vec![
            salary(2024, 1, dec!(20000)),
            ForecastEvent::LongTermCashPaid {
                month: ym(2024, 2),
                quarterly_amount: dec!(6000),
            },
            ForecastEvent::LongTermCashPaid {
                month: ym(2024, 2),
                quarterly_amount: dec!(4000),
            },
        ];
        let rows = forecast(
            &repo(),
            "shanghai",
            ym(2024, 1),
            ym(2024, 2),
            &events,
            &ForecastOptions::default(),
        )
        .unwrap();
        let feb = &rows[1];
        assert!(feb.markers.long_term_cash_paid);
        assert_eq!(feb.markers.long_term_cash_count, 2);
        assert_eq!(feb.long_term_cash, dec!(10000));
        assert_eq!(feb.result().unwrap().bonus, dec!(10000));
    }

    #[test]
    fn test_envelope_collects_failed_months_as_warnings() {
        let request = ForecastRequest {
            region: "shanghai".into(),
            start: ym(2022, 11),
            end: ym(2023, 2),
            events: vec![salary(2022, 1, dec!(15000))],
            options: ForecastOptions::default(),
        };
        let out = calculate_forecast(&request, &repo()).unwrap();
        assert_eq!(out.warnings.len(), 2);
        assert_eq!(out.result.rows.len(), 4);
        assert_eq!(out.result.years.len(), 2);
    }
}
