use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::cumulative::BonusTaxMode;
use crate::policy::{BracketTable, PolicyConfig};
use crate::types::{round_money, Money, Rate};

/// Tax on a bonus assessed on its own: the rate is chosen by the bonus
/// averaged over twelve months, then applied to the whole bonus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparateBonusTax {
    pub bonus: Money,
    pub monthly_average: Money,
    pub rate: Rate,
    pub quick_deduction: Money,
    pub tax: Money,
}

pub fn separate_bonus_tax(bonus: Money, table: &BracketTable) -> SeparateBonusTax {
    if bonus <= Decimal::ZERO {
        return SeparateBonusTax {
            bonus,
            monthly_average: Decimal::ZERO,
            rate: Decimal::ZERO,
            quick_deduction: Decimal::ZERO,
            tax: Decimal::ZERO,
        };
    }
    let monthly_average = bonus / dec!(12);
    let bracket = table.find(monthly_average);
    let tax = round_money((bonus * bracket.rate - bracket.quick_deduction).max(Decimal::ZERO));
    SeparateBonusTax {
        bonus,
        monthly_average,
        rate: bracket.rate,
        quick_deduction: bracket.quick_deduction,
        tax,
    }
}

/// Annual tax cost of a bonus under each treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusComparison {
    /// Extra annual tax when the bonus is merged into comprehensive income.
    pub merged_tax: Money,
    pub separate_tax: Money,
    pub preferred: BonusTaxMode,
    pub saving: Money,
}

/// Compare merged and separate treatment given the year's taxable
/// comprehensive income excluding the bonus.
pub fn compare_bonus_treatment(
    annual_taxable_income: Money,
    bonus: Money,
    policy: &PolicyConfig,
) -> BonusComparison {
    let base = annual_taxable_income.max(Decimal::ZERO);
    let merged_tax = round_money(
        policy.brackets.tax_on(base + bonus.max(Decimal::ZERO)) - policy.brackets.tax_on(base),
    );
    let separate_tax = separate_bonus_tax(bonus, &policy.bonus_table()).tax;

    let (preferred, saving) = if separate_tax < merged_tax {
        (BonusTaxMode::Separate, merged_tax - separate_tax)
    } else {
        (BonusTaxMode::Merged, separate_tax - merged_tax)
    };

    BonusComparison {
        merged_tax,
        separate_tax,
        preferred,
        saving,
    }
}
