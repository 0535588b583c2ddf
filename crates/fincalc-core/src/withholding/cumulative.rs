use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::bonus::separate_bonus_tax;
use crate::error::FincalcError;
use crate::policy::{PolicySignature, ResolvedPolicy};
use crate::types::{round_money, Money, Rate, YearMonth};
use crate::FincalcResult;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How bonus payments are taxed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusTaxMode {
    /// Bonus joins cumulative comprehensive income.
    #[default]
    Merged,
    /// Bonus is taxed on its own using the monthly-equivalent table.
    Separate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithholdingOptions {
    #[serde(default)]
    pub bonus_mode: BonusTaxMode,
    /// Floor each month's withholding at zero and carry the shortfall
    /// forward instead of reporting a negative (refund) month.
    #[serde(default)]
    pub clamp_negative_monthly_tax: bool,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Either the policy-derived value or a caller-supplied replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum AmountOverride {
    #[default]
    Computed,
    Fixed(Money),
}

impl AmountOverride {
    pub fn resolve(self, computed: impl FnOnce() -> Money) -> Money {
        match self {
            AmountOverride::Computed => computed(),
            AmountOverride::Fixed(amount) => amount,
        }
    }

    fn validate(&self, field: &str) -> FincalcResult<()> {
        if let AmountOverride::Fixed(amount) = self {
            if *amount < Decimal::ZERO {
                return Err(FincalcError::invalid(
                    field,
                    format!("Override cannot be negative, got {amount}"),
                ));
            }
        }
        Ok(())
    }
}

/// Per-month replacements for computed figures (unpaid leave, base
/// adjustments, one-off deductions).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomeOverrides {
    #[serde(default)]
    pub social_insurance_base: AmountOverride,
    #[serde(default)]
    pub housing_fund_base: AmountOverride,
    #[serde(default)]
    pub special_deduction: AmountOverride,
}

impl IncomeOverrides {
    fn validate(&self) -> FincalcResult<()> {
        self.social_insurance_base
            .validate("overrides.social_insurance_base")?;
        self.housing_fund_base.validate("overrides.housing_fund_base")?;
        self.special_deduction.validate("overrides.special_deduction")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyIncomeInput {
    pub year: i32,
    pub month: u32,
    pub gross_salary: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<Money>,
    #[serde(default)]
    pub overrides: IncomeOverrides,
}

impl MonthlyIncomeInput {
    pub fn new(year: i32, month: u32, gross_salary: Money) -> Self {
        MonthlyIncomeInput {
            year,
            month,
            gross_salary,
            bonus: None,
            overrides: IncomeOverrides::default(),
        }
    }

    pub fn with_bonus(mut self, bonus: Money) -> Self {
        self.bonus = Some(bonus);
        self
    }

    pub fn year_month(&self) -> FincalcResult<YearMonth> {
        YearMonth::new(self.year, self.month)
    }

    pub fn validate(&self) -> FincalcResult<()> {
        self.year_month()?;
        if self.gross_salary < Decimal::ZERO {
            return Err(FincalcError::invalid(
                "gross_salary",
                format!("Gross salary cannot be negative, got {}", self.gross_salary),
            ));
        }
        if let Some(bonus) = self.bonus {
            if bonus < Decimal::ZERO {
                return Err(FincalcError::invalid(
                    "bonus",
                    format!("Bonus cannot be negative, got {bonus}"),
                ));
            }
        }
        self.overrides.validate()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Year-to-date totals carried from month to month within one tax year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeState {
    pub year: Option<i32>,
    pub last_month: Option<u32>,
    /// Months processed this year, not the calendar month number.
    pub months_elapsed: u32,
    pub gross_income: Money,
    /// Bonus merged into comprehensive income.
    pub bonus_income: Money,
    pub basic_deduction: Money,
    pub social_insurance: Money,
    pub housing_fund: Money,
    pub special_deductions: Money,
    pub taxable_income: Money,
    pub tax_due: Money,
    /// Equals `tax_due` unless negative months are clamped.
    pub tax_withheld: Money,
}

impl CumulativeState {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_year(year: i32) -> Self {
        CumulativeState {
            year: Some(year),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthResult {
    pub year: i32,
    pub month: u32,
    pub gross_salary: Money,
    pub bonus: Money,
    pub social_insurance_base: Money,
    pub social_insurance: Money,
    pub housing_fund_base: Money,
    pub housing_fund: Money,
    pub special_deduction: Money,
    pub months_elapsed: u32,
    pub cumulative_income: Money,
    pub cumulative_basic_deduction: Money,
    pub cumulative_social_insurance: Money,
    pub cumulative_housing_fund: Money,
    pub cumulative_special_deductions: Money,
    pub cumulative_taxable_income: Money,
    pub tax_rate: Rate,
    pub quick_deduction: Money,
    pub cumulative_tax_due: Money,
    pub cumulative_tax_withheld: Money,
    /// May be negative when cumulative liability falls and clamping is off.
    pub tax_this_month: Money,
    /// Separately-taxed bonus; zero in merged mode.
    pub bonus_tax: Money,
    pub net_income: Money,
    pub policy_signature: PolicySignature,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Compute one month with default options (merged bonus, unclamped).
pub fn compute_month(
    state: &CumulativeState,
    input: &MonthlyIncomeInput,
    policy: &ResolvedPolicy,
) -> FincalcResult<(CumulativeState, MonthResult)> {
    compute_month_with(state, input, policy, &WithholdingOptions::default())
}

/// Advance `state` by one month.
///
/// A state belonging to another year is treated as empty. Months within a
/// year must be supplied in strictly ascending order.
pub fn compute_month_with(
    state: &CumulativeState,
    input: &MonthlyIncomeInput,
    policy: &ResolvedPolicy,
    options: &WithholdingOptions,
) -> FincalcResult<(CumulativeState, MonthResult)> {
    input.validate()?;
    // Repositories other than the in-memory one may skip load-time checks.
    policy.policy.validate()?;

    let prior = if state.year == Some(input.year) {
        state.clone()
    } else {
        CumulativeState::for_year(input.year)
    };
    if let Some(last) = prior.last_month {
        if input.month <= last {
            return Err(FincalcError::invalid(
                "month",
                format!(
                    "Months must ascend within a year: {}-{:02} follows month {last}",
                    input.year, input.month
                ),
            ));
        }
    }

    let p = &policy.policy;
    let gross = input.gross_salary;
    let bonus = input.bonus.unwrap_or(Decimal::ZERO);

    // Contribution bases come from salary only; bonuses never feed them.
    let si_base = input
        .overrides
        .social_insurance_base
        .resolve(|| p.social_insurance.clamp_base(gross));
    let si = p.social_insurance.contribution(si_base);

    let (hf_base, hf) = match &p.housing_fund {
        Some(fund) => {
            let base = input
                .overrides
                .housing_fund_base
                .resolve(|| fund.clamp_base(gross));
            (base, fund.contribution(base))
        }
        None => (Decimal::ZERO, Decimal::ZERO),
    };

    let special = input
        .overrides
        .special_deduction
        .resolve(|| p.monthly_special_deduction());

    let merged_bonus = match options.bonus_mode {
        BonusTaxMode::Merged => bonus,
        BonusTaxMode::Separate => Decimal::ZERO,
    };

    let months_elapsed = prior.months_elapsed + 1;
    let gross_income = prior.gross_income + gross;
    let bonus_income = prior.bonus_income + merged_bonus;
    let basic_deduction = p.monthly_basic_deduction * Decimal::from(months_elapsed);
    let social_insurance = prior.social_insurance + si;
    let housing_fund = prior.housing_fund + hf;
    let special_deductions = prior.special_deductions + special;

    let cumulative_income = gross_income + bonus_income;
    let taxable_income = (cumulative_income
        - basic_deduction
        - social_insurance
        - housing_fund
        - special_deductions)
        .max(Decimal::ZERO);

    let bracket = p.brackets.find(taxable_income);
    let tax_due = round_money(p.brackets.tax_on(taxable_income));

    let owed = tax_due - prior.tax_withheld;
    let tax_this_month = if options.clamp_negative_monthly_tax && owed < Decimal::ZERO {
        Decimal::ZERO
    } else {
        owed
    };
    let tax_withheld = prior.tax_withheld + tax_this_month;

    let bonus_tax = match options.bonus_mode {
        BonusTaxMode::Merged => Decimal::ZERO,
        BonusTaxMode::Separate => separate_bonus_tax(bonus, &p.bonus_table()).tax,
    };

    let net_income = gross + bonus - si - hf - tax_this_month - bonus_tax;

    tracing::debug!(
        year = input.year,
        month = input.month,
        taxable = %taxable_income,
        tax_due = %tax_due,
        tax_this_month = %tax_this_month,
        "computed withholding month"
    );

    let next = CumulativeState {
        year: Some(input.year),
        last_month: Some(input.month),
        months_elapsed,
        gross_income,
        bonus_income,
        basic_deduction,
        social_insurance,
        housing_fund,
        special_deductions,
        taxable_income,
        tax_due,
        tax_withheld,
    };

    let result = MonthResult {
        year: input.year,
        month: input.month,
        gross_salary: gross,
        bonus,
        social_insurance_base: si_base,
        social_insurance: si,
        housing_fund_base: hf_base,
        housing_fund: hf,
        special_deduction: special,
        months_elapsed,
        cumulative_income,
        cumulative_basic_deduction: basic_deduction,
        cumulative_social_insurance: social_insurance,
        cumulative_housing_fund: housing_fund,
        cumulative_special_deductions: special_deductions,
        cumulative_taxable_income: taxable_income,
        tax_rate: bracket.rate,
        quick_deduction: bracket.quick_deduction,
        cumulative_tax_due: tax_due,
        cumulative_tax_withheld: tax_withheld,
        tax_this_month,
        bonus_tax,
        net_income,
        policy_signature: policy.signature.clone(),
    };

    Ok((next, result))
}
