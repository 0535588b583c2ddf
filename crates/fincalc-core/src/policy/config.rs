use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::FincalcError;
use crate::policy::signature::PolicySignature;
use crate::types::{round_money, Money, Rate};
use crate::FincalcResult;

// ---------------------------------------------------------------------------
// Bracket table
// ---------------------------------------------------------------------------

/// One row of a progressive bracket table.
///
/// Applies to amounts in `[threshold_from, next.threshold_from)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub threshold_from: Money,
    pub rate: Rate,
    /// Constant subtracted after applying `rate` to the whole amount.
    pub quick_deduction: Money,
}

/// Validated, ascending bracket table whose first threshold is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TaxBracket>", into = "Vec<TaxBracket>")]
pub struct BracketTable {
    brackets: Vec<TaxBracket>,
}

impl BracketTable {
    pub fn new(brackets: Vec<TaxBracket>) -> FincalcResult<Self> {
        let first = brackets.first().ok_or_else(|| {
            FincalcError::InvalidBracketTable("table has no brackets".into())
        })?;
        if !first.threshold_from.is_zero() {
            return Err(FincalcError::InvalidBracketTable(format!(
                "first threshold must be 0, got {}",
                first.threshold_from
            )));
        }
        for (i, b) in brackets.iter().enumerate() {
            if b.rate < Decimal::ZERO || b.rate > Decimal::ONE {
                return Err(FincalcError::InvalidBracketTable(format!(
                    "bracket {i}: rate {} outside [0, 1]",
                    b.rate
                )));
            }
            if b.quick_deduction < Decimal::ZERO {
                return Err(FincalcError::InvalidBracketTable(format!(
                    "bracket {i}: negative quick deduction {}",
                    b.quick_deduction
                )));
            }
        }
        if let Some(w) = brackets
            .windows(2)
            .find(|w| w[1].threshold_from <= w[0].threshold_from)
        {
            return Err(FincalcError::InvalidBracketTable(format!(
                "thresholds must strictly increase ({} followed by {})",
                w[0].threshold_from, w[1].threshold_from
            )));
        }
        Ok(BracketTable { brackets })
    }

    /// Build from a table known to satisfy the invariants (built-in presets).
    pub(crate) fn from_trusted(brackets: Vec<TaxBracket>) -> Self {
        debug_assert!(BracketTable::new(brackets.clone()).is_ok());
        BracketTable { brackets }
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    /// The bracket with the greatest `threshold_from <= amount`.
    pub fn find(&self, amount: Money) -> &TaxBracket {
        let idx = self
            .brackets
            .partition_point(|b| b.threshold_from <= amount);
        &self.brackets[idx.saturating_sub(1)]
    }

    /// `amount × rate − quick_deduction`, floored at zero.
    pub fn tax_on(&self, amount: Money) -> Money {
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let bracket = self.find(amount);
        (amount * bracket.rate - bracket.quick_deduction).max(Decimal::ZERO)
    }

    /// Monthly table derived from an annual one: thresholds and quick
    /// deductions divided by 12, rates unchanged.
    pub fn monthly_equivalent(&self) -> BracketTable {
        let months = dec!(12);
        BracketTable {
            brackets: self
                .brackets
                .iter()
                .map(|b| TaxBracket {
                    threshold_from: b.threshold_from / months,
                    rate: b.rate,
                    quick_deduction: b.quick_deduction / months,
                })
                .collect(),
        }
    }
}

impl TryFrom<Vec<TaxBracket>> for BracketTable {
    type Error = FincalcError;

    fn try_from(brackets: Vec<TaxBracket>) -> Result<Self, Self::Error> {
        BracketTable::new(brackets)
    }
}

impl From<BracketTable> for Vec<TaxBracket> {
    fn from(table: BracketTable) -> Self {
        table.brackets
    }
}

// ---------------------------------------------------------------------------
// Contributions
// ---------------------------------------------------------------------------

fn clamp_base(amount: Money, min: Money, max: Money) -> Money {
    amount.max(min).min(max)
}

fn check_rate(field: &str, rate: Rate) -> FincalcResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(FincalcError::invalid(
            field,
            format!("Rate must be within [0, 1], got {rate}"),
        ));
    }
    Ok(())
}

fn check_bounds(field: &str, min: Money, max: Money) -> FincalcResult<()> {
    if min < Decimal::ZERO || max < min {
        return Err(FincalcError::invalid(
            field,
            format!("Base bounds must satisfy 0 <= min <= max, got [{min}, {max}]"),
        ));
    }
    Ok(())
}

/// Employee-side social-insurance rates and contribution base bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialInsuranceConfig {
    pub pension_rate: Rate,
    pub medical_rate: Rate,
    pub unemployment_rate: Rate,
    pub base_min: Money,
    pub base_max: Money,
}

impl SocialInsuranceConfig {
    pub fn combined_rate(&self) -> Rate {
        self.pension_rate + self.medical_rate + self.unemployment_rate
    }

    pub fn clamp_base(&self, gross_salary: Money) -> Money {
        clamp_base(gross_salary, self.base_min, self.base_max)
    }

    pub fn contribution(&self, base: Money) -> Money {
        round_money(base * self.combined_rate())
    }

    pub fn validate(&self) -> FincalcResult<()> {
        check_rate("social_insurance.pension_rate", self.pension_rate)?;
        check_rate("social_insurance.medical_rate", self.medical_rate)?;
        check_rate("social_insurance.unemployment_rate", self.unemployment_rate)?;
        check_bounds("social_insurance.base", self.base_min, self.base_max)
    }
}

/// Employee-side housing-fund rate and contribution base bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousingFundConfig {
    pub rate: Rate,
    pub base_min: Money,
    pub base_max: Money,
}

impl HousingFundConfig {
    pub fn clamp_base(&self, gross_salary: Money) -> Money {
        clamp_base(gross_salary, self.base_min, self.base_max)
    }

    pub fn contribution(&self, base: Money) -> Money {
        round_money(base * self.rate)
    }

    pub fn validate(&self) -> FincalcResult<()> {
        check_rate("housing_fund.rate", self.rate)?;
        check_bounds("housing_fund.base", self.base_min, self.base_max)
    }
}

// ---------------------------------------------------------------------------
// PolicyConfig
// ---------------------------------------------------------------------------

/// Policy in force for one region over `[effective_from, effective_to]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub region: String,
    pub effective_from: NaiveDate,
    /// Inclusive; `None` means open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<NaiveDate>,
    /// Annual table applied to cumulative taxable income.
    pub brackets: BracketTable,
    /// Table for separately-taxed bonuses. Defaults to the monthly
    /// equivalent of `brackets`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_brackets: Option<BracketTable>,
    pub monthly_basic_deduction: Money,
    pub social_insurance: SocialInsuranceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub housing_fund: Option<HousingFundConfig>,
    /// Named per-month deductions (e.g. "children_education").
    #[serde(default)]
    pub special_deductions: BTreeMap<String, Money>,
}

impl PolicyConfig {
    pub fn validate(&self) -> FincalcResult<()> {
        if self.region.trim().is_empty() {
            return Err(FincalcError::invalid("region", "Region must not be empty"));
        }
        if let Some(to) = self.effective_to {
            if to < self.effective_from {
                return Err(FincalcError::invalid(
                    "effective_to",
                    format!(
                        "Window ends ({to}) before it starts ({})",
                        self.effective_from
                    ),
                ));
            }
        }
        if self.monthly_basic_deduction < Decimal::ZERO {
            return Err(FincalcError::invalid(
                "monthly_basic_deduction",
                "Basic deduction cannot be negative",
            ));
        }
        self.social_insurance.validate()?;
        if let Some(hf) = &self.housing_fund {
            hf.validate()?;
        }
        if let Some((name, amount)) = self
            .special_deductions
            .iter()
            .find(|(_, amount)| **amount < Decimal::ZERO)
        {
            return Err(FincalcError::invalid(
                format!("special_deductions.{name}"),
                format!("Deduction cannot be negative, got {amount}"),
            ));
        }
        Ok(())
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.effective_from && self.effective_to.map_or(true, |to| date <= to)
    }

    /// True when the two windows share at least one day.
    pub fn overlaps(&self, other: &PolicyConfig) -> bool {
        let starts_before_other_ends =
            other.effective_to.map_or(true, |to| self.effective_from <= to);
        let other_starts_before_self_ends =
            self.effective_to.map_or(true, |to| other.effective_from <= to);
        starts_before_other_ends && other_starts_before_self_ends
    }

    pub fn monthly_special_deduction(&self) -> Money {
        self.special_deductions.values().copied().sum()
    }

    pub fn bonus_table(&self) -> Cow<'_, BracketTable> {
        match &self.bonus_brackets {
            Some(table) => Cow::Borrowed(table),
            None => Cow::Owned(self.brackets.monthly_equivalent()),
        }
    }

    pub fn signature(&self) -> PolicySignature {
        PolicySignature::of(self)
    }
}
