use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::FincalcError;
use crate::types::{Money, Rate};
use crate::FincalcResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const RATE_TOLERANCE: Decimal = dec!(0.000000000001);
const MAX_NEWTON_ITERATIONS: u32 = 50;
const MAX_BISECTION_ITERATIONS: u32 = 200;
const DAYS_PER_YEAR: Decimal = dec!(365);

/// Lower bound (exclusive) of the XIRR search domain.
pub const XIRR_RATE_FLOOR: Rate = dec!(-0.999);
/// Upper bound (exclusive) of the XIRR search domain.
pub const XIRR_RATE_CEILING: Rate = dec!(10);

/// Rates probed when looking for a sign change to bisect.
const BRACKET_SCAN: [Decimal; 20] = [
    dec!(-0.998),
    dec!(-0.9),
    dec!(-0.75),
    dec!(-0.5),
    dec!(-0.25),
    dec!(-0.1),
    dec!(0),
    dec!(0.05),
    dec!(0.1),
    dec!(0.2),
    dec!(0.35),
    dec!(0.5),
    dec!(0.75),
    dec!(1),
    dec!(1.5),
    dec!(2),
    dec!(3),
    dec!(5),
    dec!(7.5),
    dec!(9.999),
];

/// Year fraction (actual/365) of each flow relative to the first flow's date.
fn year_fractions(dated_flows: &[(NaiveDate, Money)]) -> Vec<(Decimal, Money)> {
    let Some(&(base_date, _)) = dated_flows.first() else {
        return Vec::new();
    };
    dated_flows
        .iter()
        .map(|(date, amount)| {
            let days = (*date - base_date).num_days();
            (Decimal::from(days) / DAYS_PER_YEAR, *amount)
        })
        .collect()
}

/// NPV and its derivative with respect to the rate. `None` when a discount
/// factor falls outside the range Decimal can represent.
fn xnpv_with_derivative(rate: Rate, terms: &[(Decimal, Money)]) -> Option<(Money, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;
    for (years, amount) in terms {
        let growth = one_plus_r.checked_powd(*years)?;
        if growth.is_zero() {
            return None;
        }
        value = value.checked_add(amount.checked_div(growth)?)?;
        let slope = years
            .checked_mul(*amount)?
            .checked_div(growth.checked_mul(one_plus_r)?)?;
        derivative = derivative.checked_sub(slope)?;
    }
    Some((value, derivative))
}

/// Net present value of dated cash flows, discounted actual/365 from the
/// first flow's date.
pub fn xnpv(rate: Rate, dated_flows: &[(NaiveDate, Money)]) -> FincalcResult<Money> {
    if rate <= dec!(-1) {
        return Err(FincalcError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }
    let terms = year_fractions(dated_flows);
    xnpv_with_derivative(rate, &terms)
        .map(|(value, _)| value)
        .ok_or_else(|| {
            FincalcError::invalid("rate", format!("Discount factors overflow at rate {rate}"))
        })
}

/// Extended IRR for irregular cash flow dates.
///
/// Newton-Raphson from `guess`; if that leaves the search domain or stalls,
/// scans (-0.999, 10) for a sign change and bisects it.
pub fn xirr(dated_flows: &[(NaiveDate, Money)], guess: Rate) -> FincalcResult<Rate> {
    if dated_flows.len() < 2 {
        return Err(FincalcError::InsufficientData(
            "XIRR requires at least 2 cash flows".into(),
        ));
    }

    let terms = year_fractions(dated_flows);
    let mut rate = guess.clamp(BRACKET_SCAN[0], BRACKET_SCAN[BRACKET_SCAN.len() - 1]);
    let mut last_delta = Decimal::MAX;

    for _ in 0..MAX_NEWTON_ITERATIONS {
        let Some((value, derivative)) = xnpv_with_derivative(rate, &terms) else {
            break;
        };
        last_delta = value;

        if value.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }
        if derivative.is_zero() {
            break;
        }
        let Some(step) = value.checked_div(derivative) else {
            break;
        };
        let next = rate - step;
        if next <= XIRR_RATE_FLOOR || next >= XIRR_RATE_CEILING {
            break;
        }
        if (next - rate).abs() < RATE_TOLERANCE {
            return Ok(next);
        }
        rate = next;
    }

    tracing::debug!(last_delta = %last_delta, "XIRR Newton step did not settle, bisecting");
    bisect(&terms, last_delta)
}

fn bisect(terms: &[(Decimal, Money)], newton_delta: Money) -> FincalcResult<Rate> {
    let samples: Vec<(Rate, Money)> = BRACKET_SCAN
        .iter()
        .filter_map(|r| xnpv_with_derivative(*r, terms).map(|(v, _)| (*r, v)))
        .collect();

    if let Some(&(r, _)) = samples.iter().find(|(_, v)| v.is_zero()) {
        return Ok(r);
    }

    let bracket = samples
        .windows(2)
        .find(|w| w[0].1.is_sign_negative() != w[1].1.is_sign_negative());

    let Some(&[(mut lo, mut f_lo), (mut hi, _)]) = bracket else {
        return Err(FincalcError::NoConvergence {
            function: "XIRR".into(),
            iterations: MAX_NEWTON_ITERATIONS,
            last_delta: newton_delta,
        });
    };

    let mut f_mid = f_lo;
    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        f_mid = match xnpv_with_derivative(mid, terms) {
            Some((v, _)) => v,
            None => break,
        };
        if f_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo) / dec!(2) < RATE_TOLERANCE {
            return Ok(mid);
        }
        if f_mid.is_sign_negative() == f_lo.is_sign_negative() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(FincalcError::NoConvergence {
        function: "XIRR".into(),
        iterations: MAX_NEWTON_ITERATIONS + MAX_BISECTION_ITERATIONS,
        last_delta: f_mid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_xnpv_zero_rate_is_sum() {
        let flows = vec![(d(2023, 1, 1), dec!(-100)), (d(2023, 7, 1), dec!(150))];
        assert_eq!(xnpv(dec!(0), &flows).unwrap(), dec!(50));
    }

    #[test]
    fn test_xnpv_rejects_rate_at_minus_one() {
        let flows = vec![(d(2023, 1, 1), dec!(-100)), (d(2024, 1, 1), dec!(150))];
        assert!(xnpv(dec!(-1), &flows).is_err());
    }

    #[test]
    fn test_xirr_one_year_ten_percent() {
        let flows = vec![(d(2023, 1, 1), dec!(-1000)), (d(2024, 1, 1), dec!(1100))];
        let rate = xirr(&flows, dec!(0.1)).unwrap();
        assert!((rate - dec!(0.10)).abs() < dec!(0.0001), "got {rate}");
    }

    #[test]
    fn test_xirr_recovers_from_far_guess() {
        let flows = vec![(d(2023, 1, 1), dec!(-1000)), (d(2024, 1, 1), dec!(1100))];
        let rate = xirr(&flows, dec!(9.5)).unwrap();
        assert!((rate - dec!(0.10)).abs() < dec!(0.0001), "got {rate}");
    }

    #[test]
    fn test_xirr_negative_return() {
        let flows = vec![(d(2023, 1, 1), dec!(-1000)), (d(2024, 1, 1), dec!(800))];
        let rate = xirr(&flows, dec!(0.1)).unwrap();
        assert!((rate - dec!(-0.20)).abs() < dec!(0.0001), "got {rate}");
    }

    #[test]
    fn test_xirr_same_sign_flows_fail() {
        let flows = vec![(d(2023, 1, 1), dec!(1000)), (d(2024, 1, 1), dec!(1100))];
        let err = xirr(&flows, dec!(0.1)).unwrap_err();
        assert!(matches!(err, FincalcError::NoConvergence { .. }));
    }

    #[test]
    fn test_xirr_requires_two_flows() {
        let flows = vec![(d(2023, 1, 1), dec!(-1000))];
        assert!(matches!(
            xirr(&flows, dec!(0.1)),
            Err(FincalcError::InsufficientData(_))
        ));
    }
}
