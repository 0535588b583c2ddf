//! Built-in policy tables.
//!
//! The comprehensive-income table is the national annual schedule used for
//! cumulative withholding since 2019. Contribution bounds vary by city and
//! year; the values in [`standard_policy`] are placeholders to be replaced
//! with the local figures.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use super::config::{
    BracketTable, HousingFundConfig, PolicyConfig, SocialInsuranceConfig, TaxBracket,
};
use crate::types::Money;

pub const MONTHLY_BASIC_DEDUCTION: Money = dec!(5000);

const COMPREHENSIVE_INCOME_TABLE: [(Decimal, Decimal, Decimal); 7] = [
    (dec!(0), dec!(0.03), dec!(0)),
    (dec!(36000), dec!(0.10), dec!(2520)),
    (dec!(144000), dec!(0.20), dec!(16920)),
    (dec!(300000), dec!(0.25), dec!(31920)),
    (dec!(420000), dec!(0.30), dec!(52920)),
    (dec!(660000), dec!(0.35), dec!(85920)),
    (dec!(960000), dec!(0.45), dec!(181920)),
];

/// Annual comprehensive-income brackets.
pub fn comprehensive_income_brackets() -> BracketTable {
    BracketTable::from_trusted(
        COMPREHENSIVE_INCOME_TABLE
            .iter()
            .map(|&(threshold_from, rate, quick_deduction)| TaxBracket {
                threshold_from,
                rate,
                quick_deduction,
            })
            .collect(),
    )
}

/// Employee rates: pension 8%, medical 2%, unemployment 0.5%.
pub fn standard_social_insurance(base_min: Money, base_max: Money) -> SocialInsuranceConfig {
    SocialInsuranceConfig {
        pension_rate: dec!(0.08),
        medical_rate: dec!(0.02),
        unemployment_rate: dec!(0.005),
        base_min,
        base_max,
    }
}

pub fn standard_housing_fund(rate: Decimal, base_min: Money, base_max: Money) -> HousingFundConfig {
    HousingFundConfig {
        rate,
        base_min,
        base_max,
    }
}

/// Open-ended policy with the national table, standard employee rates, a
/// 7% housing fund and placeholder bounds of [5000, 30000].
pub fn standard_policy(region: &str, effective_from: NaiveDate) -> PolicyConfig {
    PolicyConfig {
        region: region.to_string(),
        effective_from,
        effective_to: None,
        brackets: comprehensive_income_brackets(),
        bonus_brackets: None,
        monthly_basic_deduction: MONTHLY_BASIC_DEDUCTION,
        social_insurance: standard_social_insurance(dec!(5000), dec!(30000)),
        housing_fund: Some(standard_housing_fund(dec!(0.07), dec!(5000), dec!(30000))),
        special_deductions: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_table_is_valid() {
        let table = comprehensive_income_brackets();
        assert!(BracketTable::new(table.brackets().to_vec()).is_ok());
        assert_eq!(table.brackets().len(), 7);
    }

    #[test]
    fn test_quick_deductions_are_continuous() {
        // At every threshold both adjacent brackets give the same tax.
        let table = comprehensive_income_brackets();
        for w in table.brackets().windows(2) {
            let at = w[1].threshold_from;
            let lower = at * w[0].rate - w[0].quick_deduction;
            let upper = at * w[1].rate - w[1].quick_deduction;
            assert_eq!(lower, upper, "discontinuity at {at}");
        }
    }

    #[test]
    fn test_standard_policy_validates() {
        let policy = standard_policy("beijing", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(policy.validate().is_ok());
    }
}
