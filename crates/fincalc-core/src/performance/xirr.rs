use rust_decimal_macros::dec;

use crate::time_value;
use crate::types::{CashFlow, Rate};
use crate::FincalcResult;

pub const DEFAULT_XIRR_GUESS: Rate = dec!(0.1);

/// Money-weighted return for dated flows (negative = outflow from the investor).
pub fn xirr(flows: &[CashFlow]) -> FincalcResult<Rate> {
    xirr_with_guess(flows, DEFAULT_XIRR_GUESS)
}

/// Flows may arrive in any order; day offsets count from the earliest date.
pub fn xirr_with_guess(flows: &[CashFlow], guess: Rate) -> FincalcResult<Rate> {
    let mut dated: Vec<_> = flows.iter().map(|f| (f.date, f.amount)).collect();
    dated.sort_by_key(|(date, _)| *date);
    time_value::xirr(&dated, guess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FincalcError;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_unordered_flows() {
        let flows = vec![
            CashFlow::new(d(2024, 1, 1), dec!(1100)),
            CashFlow::new(d(2023, 1, 1), dec!(-1000)),
        ];
        let r = xirr(&flows).unwrap();
        assert!((r - dec!(0.1)).abs() < dec!(0.0001), "xirr {r}");
    }

    #[test]
    fn test_all_positive_flows_fail() {
        let flows = vec![
            CashFlow::new(d(2023, 1, 1), dec!(1000)),
            CashFlow::new(d(2024, 1, 1), dec!(1100)),
        ];
        assert!(matches!(
            xirr(&flows).unwrap_err(),
            FincalcError::NoConvergence { .. }
        ));
    }
}
