use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fincalc_core::performance::{
    self, twr_breakdown, xirr_with_guess, PerformanceInput, TwrPeriod, DEFAULT_XIRR_GUESS,
};
use fincalc_core::time_value;
use fincalc_core::CashFlow;

use crate::input;

/// Arguments for time-weighted return
#[derive(Args)]
pub struct TwrArgs {
    /// Path to JSON/YAML file with `periods`
    #[arg(long)]
    pub input: Option<String>,

    /// Period as START:END[:FLOW], repeatable (e.g. --period 100:110 --period 110:121)
    #[arg(long = "period", allow_hyphen_values = true)]
    pub periods: Vec<String>,
}

/// Arguments for money-weighted return
#[derive(Args)]
pub struct XirrArgs {
    /// Path to JSON/YAML file with `flows`
    #[arg(long)]
    pub input: Option<String>,

    /// Cash flow as DATE:AMOUNT, repeatable (e.g. --flow 2024-01-01:-1000)
    #[arg(long = "flow", allow_hyphen_values = true)]
    pub flows: Vec<String>,

    /// Initial rate guess for the solver
    #[arg(long)]
    pub guess: Option<Decimal>,
}

/// Arguments for valuation/flow reconciliation
#[derive(Args)]
pub struct PerformanceArgs {
    /// Path to JSON/YAML file with `valuations` and `flows`
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwrInput {
    periods: Vec<TwrPeriod>,
}

#[derive(Debug, Deserialize)]
struct XirrInput {
    flows: Vec<CashFlow>,
    #[serde(default)]
    guess: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct XirrOutput {
    xirr: Decimal,
    num_flows: usize,
    first_date: NaiveDate,
    last_date: NaiveDate,
    /// XNPV at the solved rate; should be ~0.
    residual: Decimal,
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal, Box<dyn std::error::Error>> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| format!("Invalid {what} '{raw}': {e}").into())
}

fn parse_period(raw: &str) -> Result<TwrPeriod, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = raw.split(':').collect();
    match parts.as_slice() {
        [start, end] => Ok(TwrPeriod::new(
            parse_decimal(start, "start value")?,
            parse_decimal(end, "end value")?,
            Decimal::ZERO,
        )),
        [start, end, flow] => Ok(TwrPeriod::new(
            parse_decimal(start, "start value")?,
            parse_decimal(end, "end value")?,
            parse_decimal(flow, "flow")?,
        )),
        _ => Err(format!("Expected START:END[:FLOW], got '{raw}'").into()),
    }
}

fn parse_flow(raw: &str) -> Result<CashFlow, Box<dyn std::error::Error>> {
    let (date, amount) = raw
        .split_once(':')
        .ok_or_else(|| format!("Expected DATE:AMOUNT, got '{raw}'"))?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{date}': {e}"))?;
    Ok(CashFlow::new(date, parse_decimal(amount, "amount")?))
}

fn read_performance_input(
    args: &PerformanceArgs,
) -> Result<PerformanceInput, Box<dyn std::error::Error>> {
    if let Some(ref path) = args.input {
        input::file::read_document(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(data)
    } else {
        Err("--input <file.json|file.yaml> or stdin required".into())
    }
}

pub fn run_twr(args: TwrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let periods: Vec<TwrPeriod> = if let Some(ref path) = args.input {
        input::file::read_document::<TwrInput>(path)?.periods
    } else if !args.periods.is_empty() {
        args.periods
            .iter()
            .map(|p| parse_period(p))
            .collect::<Result<_, _>>()?
    } else if let Some(data) = input::stdin::read_stdin::<TwrInput>()? {
        data.periods
    } else {
        return Err("--period START:END[:FLOW] or --input <file> required".into());
    };

    let breakdown = twr_breakdown(&periods)?;
    if breakdown.skipped > 0 {
        tracing::warn!(
            skipped = breakdown.skipped,
            "periods with no positive capital base excluded"
        );
    }
    Ok(serde_json::to_value(breakdown)?)
}

pub fn run_xirr(args: XirrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (flows, file_guess) = if let Some(ref path) = args.input {
        let data: XirrInput = input::file::read_document(path)?;
        (data.flows, data.guess)
    } else if !args.flows.is_empty() {
        let flows = args
            .flows
            .iter()
            .map(|f| parse_flow(f))
            .collect::<Result<Vec<_>, _>>()?;
        (flows, None)
    } else if let Some(data) = input::stdin::read_stdin::<XirrInput>()? {
        (data.flows, data.guess)
    } else {
        return Err("--flow DATE:AMOUNT or --input <file> required".into());
    };

    let guess = args.guess.or(file_guess).unwrap_or(DEFAULT_XIRR_GUESS);
    let rate = xirr_with_guess(&flows, guess)?;

    let mut dated: Vec<(NaiveDate, Decimal)> = flows.iter().map(|f| (f.date, f.amount)).collect();
    dated.sort_by_key(|(d, _)| *d);
    let residual = time_value::xnpv(rate, &dated)?;
    let (first_date, last_date) = match (dated.first(), dated.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => return Err("XIRR requires at least 2 cash flows".into()),
    };

    let output = XirrOutput {
        xirr: rate,
        num_flows: flows.len(),
        first_date,
        last_date,
        residual,
    };
    Ok(serde_json::to_value(output)?)
}

pub fn run_performance(args: PerformanceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let data = read_performance_input(&args)?;
    let result = performance::calculate_performance(&data)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_performance_series(args: PerformanceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let data = read_performance_input(&args)?;
    let series: Vec<_> =
        performance::compute_performance_series(&data.valuations, &data.flows)?.collect();
    Ok(serde_json::to_value(series)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_period_with_and_without_flow() {
        let p = parse_period("100:110").unwrap();
        assert_eq!(p.net_flow_during, dec!(0));
        let p = parse_period("110:132:10").unwrap();
        assert_eq!(p.net_flow_during, dec!(10));
        assert!(parse_period("100").is_err());
    }

    #[test]
    fn test_parse_flow_negative_amount() {
        let f = parse_flow("2024-01-01:-1000").unwrap();
        assert_eq!(f.amount, dec!(-1000));
        assert_eq!(f.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(parse_flow("2024-13-01:5").is_err());
    }
}
