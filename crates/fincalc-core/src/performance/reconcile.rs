use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::twr::{twr_breakdown, TwrPeriod};
use super::xirr::xirr;
use crate::error::FincalcError;
use crate::types::{with_metadata, CashFlow, ComputationOutput, Money, Rate};
use crate::FincalcResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Portfolio market value observed on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub date: NaiveDate,
    pub value: Money,
}

impl ValuationSnapshot {
    pub fn new(date: NaiveDate, value: Money) -> Self {
        ValuationSnapshot { date, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResult {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_value: Money,
    pub end_value: Money,
    /// Investor contributions less withdrawals over the window.
    pub net_flow: Money,
    /// end − start − net flow.
    pub pnl: Money,
    /// `None` when no sub-period had a positive capital base.
    pub twr: Option<Rate>,
    /// Money-weighted return; `None` when the solver finds no root.
    pub xirr: Option<Rate>,
}

// ---------------------------------------------------------------------------
// Validation and flow assignment
// ---------------------------------------------------------------------------

fn validate_valuations(valuations: &[ValuationSnapshot]) -> FincalcResult<()> {
    if valuations.len() < 2 {
        return Err(FincalcError::InsufficientData(
            "Performance requires at least 2 valuations".into(),
        ));
    }
    for (i, v) in valuations.iter().enumerate() {
        if v.value < Decimal::ZERO {
            return Err(FincalcError::invalid(
                format!("valuations[{i}].value"),
                format!("Valuation cannot be negative, got {}", v.value),
            ));
        }
    }
    if let Some(i) = valuations.windows(2).position(|w| w[1].date <= w[0].date) {
        return Err(FincalcError::invalid(
            format!("valuations[{}].date", i + 1),
            format!(
                "Valuation dates must be strictly increasing ({} follows {})",
                valuations[i + 1].date,
                valuations[i].date
            ),
        ));
    }
    Ok(())
}

fn sorted_flows(flows: &[CashFlow]) -> Vec<CashFlow> {
    let mut sorted = flows.to_vec();
    sorted.sort_by_key(|f| f.date);
    sorted
}

/// Flows assigned to one valuation pair: dated in `[start, end)`, or
/// `[start, end]` for the final pair.
fn pair_flows<'a>(
    flows: &'a [CashFlow],
    start: NaiveDate,
    end: NaiveDate,
    is_last: bool,
) -> &'a [CashFlow] {
    let lo = flows.partition_point(|f| f.date < start);
    let hi = if is_last {
        flows.partition_point(|f| f.date <= end)
    } else {
        flows.partition_point(|f| f.date < end)
    };
    &flows[lo..hi.max(lo)]
}

fn net_of(flows: &[CashFlow]) -> Money {
    flows.iter().map(|f| f.amount).sum()
}

/// Investor view: pay in the opening value and each contribution, receive
/// the closing value.
fn window_xirr(
    start: &ValuationSnapshot,
    end: &ValuationSnapshot,
    flows: &[CashFlow],
) -> Option<Rate> {
    if end.date <= start.date {
        return None;
    }
    let mut investor = Vec::with_capacity(flows.len() + 2);
    investor.push(CashFlow::new(start.date, -start.value));
    investor.extend(flows.iter().map(|f| CashFlow::new(f.date, -f.amount)));
    investor.push(CashFlow::new(end.date, end.value));
    match xirr(&investor) {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::debug!(
                start = %start.date,
                end = %end.date,
                error = %e,
                "window XIRR unavailable"
            );
            None
        }
    }
}

fn pair_result(
    start: &ValuationSnapshot,
    end: &ValuationSnapshot,
    flows: &[CashFlow],
) -> PerformanceResult {
    let net_flow = net_of(flows);
    let period = TwrPeriod::new(start.value, end.value, net_flow);
    PerformanceResult {
        start_date: start.date,
        end_date: end.date,
        start_value: start.value,
        end_value: end.value,
        net_flow,
        pnl: period.pnl(),
        twr: period.period_return(),
        xirr: window_xirr(start, end, flows),
    }
}

// ---------------------------------------------------------------------------
// Whole range
// ---------------------------------------------------------------------------

/// Reconcile the first and last valuations against the flows between them.
///
/// TWR links one sub-period per adjacent pair of valuations. Flows outside
/// `[first date, last date]` are ignored.
pub fn compute_performance(
    valuations: &[ValuationSnapshot],
    flows: &[CashFlow],
) -> FincalcResult<PerformanceResult> {
    validate_valuations(valuations)?;
    let flows = sorted_flows(flows);

    let n = valuations.len();
    let periods: Vec<TwrPeriod> = valuations
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let net = net_of(pair_flows(&flows, w[0].date, w[1].date, i == n - 2));
            TwrPeriod::new(w[0].value, w[1].value, net)
        })
        .collect();
    let linked = twr_breakdown(&periods)?;

    let (first, last) = (&valuations[0], &valuations[n - 1]);
    let window = pair_flows(&flows, first.date, last.date, true);
    let net_flow = net_of(window);

    Ok(PerformanceResult {
        start_date: first.date,
        end_date: last.date,
        start_value: first.value,
        end_value: last.value,
        net_flow,
        pnl: last.value - first.value - net_flow,
        twr: (linked.skipped < periods.len()).then_some(linked.twr),
        xirr: window_xirr(first, last, window),
    })
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// One `PerformanceResult` per adjacent pair of valuations.
///
/// Finite and lazily evaluated; clone it to iterate again from the start.
#[derive(Debug, Clone)]
pub struct PerformanceSeries {
    valuations: Vec<ValuationSnapshot>,
    flows: Vec<CashFlow>,
    next: usize,
}

impl Iterator for PerformanceSeries {
    type Item = PerformanceResult;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.next;
        let start = self.valuations.get(i)?;
        let end = self.valuations.get(i + 1)?;
        let is_last = i + 2 == self.valuations.len();
        let flows = pair_flows(&self.flows, start.date, end.date, is_last);
        self.next += 1;
        Some(pair_result(start, end, flows))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.valuations.len().saturating_sub(self.next + 1);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PerformanceSeries {}

/// Validate once and return the lazy per-pair series.
pub fn compute_performance_series(
    valuations: &[ValuationSnapshot],
    flows: &[CashFlow],
) -> FincalcResult<PerformanceSeries> {
    validate_valuations(valuations)?;
    Ok(PerformanceSeries {
        valuations: valuations.to_vec(),
        flows: sorted_flows(flows),
        next: 0,
    })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceInput {
    pub valuations: Vec<ValuationSnapshot>,
    #[serde(default)]
    pub flows: Vec<CashFlow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceOutput {
    pub summary: PerformanceResult,
    pub series: Vec<PerformanceResult>,
}

pub fn calculate_performance(
    input: &PerformanceInput,
) -> FincalcResult<ComputationOutput<PerformanceOutput>> {
    let started = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let summary = compute_performance(&input.valuations, &input.flows)?;
    let series: Vec<PerformanceResult> =
        compute_performance_series(&input.valuations, &input.flows)?.collect();

    let outside = input
        .flows
        .iter()
        .filter(|f| f.date < summary.start_date || f.date > summary.end_date)
        .count();
    if outside > 0 {
        warnings.push(format!(
            "{outside} cash flow(s) fall outside {}..={} and were ignored",
            summary.start_date, summary.end_date
        ));
    }
    let skipped = series.iter().filter(|p| p.twr.is_none()).count();
    if skipped > 0 {
        warnings.push(format!(
            "{skipped} period(s) with no positive capital base excluded from TWR"
        ));
    }
    if summary.xirr.is_none() {
        warnings.push("XIRR did not converge for the full window".into());
    }

    let elapsed = started.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "TWR linked across valuation pairs (flows at period start); XIRR actual/365; P&L = end − start − net flow",
        &serde_json::json!({
            "valuations": input.valuations.len(),
            "flows": input.flows.len(),
            "flow_timing": "beginning_of_period",
        }),
        warnings,
        elapsed,
        PerformanceOutput { summary, series },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn vals() -> Vec<ValuationSnapshot> {
        vec![
            ValuationSnapshot::new(d(2024, 1, 1), dec!(1000)),
            ValuationSnapshot::new(d(2024, 7, 1), dec!(1300)),
            ValuationSnapshot::new(d(2025, 1, 1), dec!(1600)),
        ]
    }

    #[test]
    fn test_pnl_identity() {
        let flows = vec![CashFlow::new(d(2024, 7, 1), dec!(200))];
        let r = compute_performance(&vals(), &flows).unwrap();
        assert_eq!(r.net_flow, dec!(200));
        assert_eq!(r.pnl, dec!(400));
        assert!(r.xirr.unwrap() > dec!(0));
    }

    #[test]
    fn test_boundary_flow_goes_to_later_pair() {
        let flows = vec![CashFlow::new(d(2024, 7, 1), dec!(200))];
        let series: Vec<_> = compute_performance_series(&vals(), &flows).unwrap().collect();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].net_flow, dec!(0));
        assert_eq!(series[0].pnl, dec!(300));
        assert_eq!(series[1].net_flow, dec!(200));
        assert_eq!(series[1].pnl, dec!(100));
    }

    #[test]
    fn test_flow_on_last_date_counted_once() {
        let flows = vec![CashFlow::new(d(2025, 1, 1), dec!(50))];
        let whole = compute_performance(&vals(), &flows).unwrap();
        let series: Vec<_> = compute_performance_series(&vals(), &flows).unwrap().collect();
        let pair_sum: Money = series.iter().map(|p| p.net_flow).sum();
        assert_eq!(whole.net_flow, dec!(50));
        assert_eq!(pair_sum, dec!(50));
    }

    #[test]
    fn test_series_is_restartable() {
        let series = compute_performance_series(&vals(), &[]).unwrap();
        assert_eq!(series.len(), 2);
        let first: Vec<_> = series.clone().collect();
        let second: Vec<_> = series.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unordered_valuations_rejected() {
        let mut v = vals();
        v.swap(0, 1);
        assert!(matches!(
            compute_performance(&v, &[]).unwrap_err(),
            FincalcError::InvalidInput { .. }
        ));
        assert!(matches!(
            compute_performance(&v[..1], &[]).unwrap_err(),
            FincalcError::InsufficientData(_)
        ));
    }

    #[test]
    fn test_zero_base_pair_has_no_return() {
        let v = vec![
            ValuationSnapshot::new(d(2024, 1, 1), dec!(0)),
            ValuationSnapshot::new(d(2024, 2, 1), dec!(0)),
            ValuationSnapshot::new(d(2024, 3, 1), dec!(100)),
        ];
        let flows = vec![CashFlow::new(d(2024, 2, 1), dec!(100))];
        let series: Vec<_> = compute_performance_series(&v, &flows).unwrap().collect();
        assert_eq!(series[0].twr, None);
        assert_eq!(series[1].twr, Some(dec!(1)));

        let whole = compute_performance(&v, &flows).unwrap();
        assert_eq!(whole.twr, Some(dec!(1)));

        let empty = compute_performance(&v[..2], &[]).unwrap();
        assert_eq!(empty.twr, None);
        assert_eq!(empty.pnl, dec!(0));
    }

    #[test]
    fn test_envelope_counts_skipped_pairs() {
        let input = PerformanceInput {
            valuations: vec![
                ValuationSnapshot::new(d(2024, 1, 1), dec!(0)),
                ValuationSnapshot::new(d(2024, 2, 1), dec!(0)),
                ValuationSnapshot::new(d(2024, 3, 1), dec!(100)),
            ],
            flows: vec![CashFlow::new(d(2024, 2, 1), dec!(100))],
        };
        let out = calculate_performance(&input).unwrap();
        assert!(out
            .warnings
            .iter()
            .any(|w| w.starts_with("1 period(s) with no positive capital base")));
        assert_eq!(out.result.series[0].twr, None);
    }

    #[test]
    fn test_negative_valuation_rejected() {
        let mut v = vals();
        v[1].value = dec!(-1);
        assert!(matches!(
            compute_performance(&v, &[]).unwrap_err(),
            FincalcError::InvalidInput { ref field, .. } if field == "valuations[1].value"
        ));
        assert!(compute_performance_series(&v, &[]).is_err());
    }

    #[test]
    fn test_envelope_warns_on_outside_flows() {
        let input = PerformanceInput {
            valuations: vals(),
            flows: vec![CashFlow::new(d(2023, 6, 1), dec!(10))],
        };
        let out = calculate_performance(&input).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.result.summary.net_flow, dec!(0));
        assert_eq!(out.result.series.len(), 2);
    }
}
