use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FincalcError;
use crate::FincalcResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Round a monetary amount to cents, midpoint away from zero.
pub fn round_money(value: Money) -> Money {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A single cash flow at a point in time.
///
/// Positive amounts flow into the measured portfolio, negative amounts out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CashFlow {
    pub fn new(date: NaiveDate, amount: Money) -> Self {
        CashFlow {
            date,
            amount,
            label: None,
        }
    }
}

/// A calendar month within a tax year. Serialised as `"YYYY-MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> FincalcResult<Self> {
        let ym = YearMonth { year, month };
        ym.validate()?;
        Ok(ym)
    }

    pub fn validate(&self) -> FincalcResult<()> {
        if !(1..=12).contains(&self.month) {
            return Err(FincalcError::invalid(
                "month",
                format!("Month must be between 1 and 12, got {}", self.month),
            ));
        }
        Ok(())
    }

    /// The following calendar month.
    pub fn succ(self) -> Self {
        if self.month >= 12 {
            YearMonth {
                year: self.year + 1,
                month: 1,
            }
        } else {
            YearMonth {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(self) -> FincalcResult<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or_else(|| {
            FincalcError::invalid("year_month", format!("{self} is not a valid calendar month"))
        })
    }

    pub fn last_day(self) -> FincalcResult<NaiveDate> {
        let next = self.succ().first_day()?;
        next.pred_opt().ok_or_else(|| {
            FincalcError::invalid("year_month", format!("{self} has no last day"))
        })
    }

    /// Date used to resolve policy for this month. Days past the end of the
    /// month fall back to its last day.
    pub fn anchor_date(self, day: u32) -> FincalcResult<NaiveDate> {
        if day == 0 {
            return Err(FincalcError::invalid("anchor_day", "Anchor day must be >= 1"));
        }
        let last = self.last_day()?;
        if day >= last.day() {
            return Ok(last);
        }
        NaiveDate::from_ymd_opt(self.year, self.month, day).ok_or_else(|| {
            FincalcError::invalid("anchor_day", format!("Day {day} is not valid in {self}"))
        })
    }

    /// Inclusive range of months from `self` to `end`. Empty when `end < self`.
    pub fn through(self, end: YearMonth) -> impl Iterator<Item = YearMonth> {
        std::iter::successors(Some(self), |ym| Some(ym.succ())).take_while(move |ym| *ym <= end)
    }
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = FincalcError;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || FincalcError::invalid("year_month", format!("Expected YYYY-MM, got '{s}'"));
        let (year, month) = s.trim().split_once('-').ok_or_else(bad)?;
        let year: i32 = year.parse().map_err(|_| bad())?;
        let month: u32 = month.parse().map_err(|_| bad())?;
        YearMonth::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = FincalcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(ym: YearMonth) -> Self {
        ym.to_string()
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_midpoint() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_money(dec!(402)), dec!(402));
    }

    #[test]
    fn test_year_month_succ_wraps_year() {
        let dec_2023 = YearMonth::new(2023, 12).unwrap();
        assert_eq!(dec_2023.succ(), YearMonth::new(2024, 1).unwrap());
    }

    #[test]
    fn test_year_month_rejects_month_13() {
        assert!(YearMonth::new(2024, 13).is_err());
        assert!(YearMonth::new(2024, 0).is_err());
    }

    #[test]
    fn test_year_month_parse_and_display() {
        let ym: YearMonth = "2024-03".parse().unwrap();
        assert_eq!(ym, YearMonth { year: 2024, month: 3 });
        assert_eq!(ym.to_string(), "2024-03");
        assert!("2024/03".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_serde_as_string() {
        let ym = YearMonth::new(2024, 7).unwrap();
        assert_eq!(serde_json::to_string(&ym).unwrap(), "\"2024-07\"");
        let back: YearMonth = serde_json::from_str("\"2024-07\"").unwrap();
        assert_eq!(back, ym);
        assert!(serde_json::from_str::<YearMonth>("\"2024-13\"").is_err());
    }

    #[test]
    fn test_anchor_date_clamps_to_month_end() {
        let feb = YearMonth::new(2023, 2).unwrap();
        assert_eq!(
            feb.anchor_date(31).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            feb.anchor_date(1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_through_spans_year_boundary() {
        let start = YearMonth::new(2023, 11).unwrap();
        let end = YearMonth::new(2024, 2).unwrap();
        let months: Vec<String> = start.through(end).map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
        assert_eq!(end.through(start).count(), 0);
    }
}
