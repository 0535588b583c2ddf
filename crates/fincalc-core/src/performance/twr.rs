use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FincalcError;
use crate::types::{Money, Rate};
use crate::FincalcResult;

/// One sub-period between two valuations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwrPeriod {
    pub start_value: Money,
    pub end_value: Money,
    /// Net external flow into the portfolio during the period (+ contribution).
    #[serde(default)]
    pub net_flow_during: Money,
}

impl TwrPeriod {
    pub fn new(start_value: Money, end_value: Money, net_flow_during: Money) -> Self {
        TwrPeriod {
            start_value,
            end_value,
            net_flow_during,
        }
    }

    /// Gain over the period net of the investor's own flow.
    pub fn pnl(&self) -> Money {
        self.end_value - self.start_value - self.net_flow_during
    }

    /// `(end − start) / (start + flow)`, or `None` when the base is not
    /// positive.
    pub fn period_return(&self) -> Option<Rate> {
        let denominator = self.start_value + self.net_flow_during;
        if denominator <= Decimal::ZERO {
            return None;
        }
        (self.end_value - self.start_value).checked_div(denominator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwrBreakdown {
    /// Per-period return; `None` where the period was skipped.
    pub period_returns: Vec<Option<Rate>>,
    pub skipped: usize,
    pub twr: Rate,
}

/// Geometrically link sub-period returns, reporting skipped periods.
pub fn twr_breakdown(periods: &[TwrPeriod]) -> FincalcResult<TwrBreakdown> {
    if periods.is_empty() {
        return Err(FincalcError::InsufficientData(
            "TWR requires at least one period".into(),
        ));
    }

    let mut growth = Decimal::ONE;
    let mut period_returns = Vec::with_capacity(periods.len());
    let mut skipped = 0;

    for (i, p) in periods.iter().enumerate() {
        if p.start_value < Decimal::ZERO || p.end_value < Decimal::ZERO {
            return Err(FincalcError::invalid(
                format!("periods[{i}]"),
                "Portfolio values cannot be negative",
            ));
        }
        let r = p.period_return();
        match r {
            Some(r) => {
                growth = growth.checked_mul(Decimal::ONE + r).ok_or_else(|| {
                    FincalcError::invalid(format!("periods[{i}]"), "Linked growth overflows")
                })?;
            }
            None => skipped += 1,
        }
        period_returns.push(r);
    }

    Ok(TwrBreakdown {
        period_returns,
        skipped,
        twr: growth - Decimal::ONE,
    })
}

/// Time-weighted return: Π(1 + r_i) − 1 over periods with a positive base.
pub fn twr(periods: &[TwrPeriod]) -> FincalcResult<Rate> {
    twr_breakdown(periods).map(|b| b.twr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_two_ten_percent_periods() {
        let periods = vec![
            TwrPeriod::new(dec!(100), dec!(110), dec!(0)),
            TwrPeriod::new(dec!(110), dec!(121), dec!(0)),
        ];
        assert_eq!(twr(&periods).unwrap(), dec!(0.21));
    }

    #[test]
    fn test_flows_enter_denominator() {
        // 100 + 100 contributed, ends at 220: 120 change on a 200 base.
        let periods = vec![TwrPeriod::new(dec!(100), dec!(220), dec!(100))];
        let b = twr_breakdown(&periods).unwrap();
        assert_eq!(b.period_returns[0], Some(dec!(0.6)));
        assert_eq!(b.twr, dec!(0.6));
        assert_eq!(periods[0].pnl(), dec!(20));
    }

    #[test]
    fn test_zero_base_period_skipped() {
        let periods = vec![
            TwrPeriod::new(dec!(100), dec!(110), dec!(0)),
            TwrPeriod::new(dec!(0), dec!(0), dec!(0)),
            TwrPeriod::new(dec!(50), dec!(40), dec!(-60)),
        ];
        let b = twr_breakdown(&periods).unwrap();
        assert_eq!(b.skipped, 2);
        assert_eq!(b.period_returns[1], None);
        assert_eq!(b.twr, dec!(0.1));
    }

    #[test]
    fn test_empty_and_negative_rejected() {
        assert!(matches!(
            twr(&[]).unwrap_err(),
            FincalcError::InsufficientData(_)
        ));
        let bad = vec![TwrPeriod::new(dec!(-1), dec!(10), dec!(0))];
        assert!(matches!(
            twr(&bad).unwrap_err(),
            FincalcError::InvalidInput { .. }
        ));
    }
}
