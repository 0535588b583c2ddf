//! Cumulative progressive withholding.
//!
//! Each month's payable tax is derived from year-to-date totals: the tax due
//! on cumulative taxable income, less what has already been withheld.

pub mod bonus;
pub mod cumulative;
pub mod request;

pub use bonus::{compare_bonus_treatment, separate_bonus_tax, BonusComparison, SeparateBonusTax};
pub use cumulative::{
    compute_month, compute_month_with, AmountOverride, BonusTaxMode, CumulativeState,
    IncomeOverrides, MonthResult, MonthlyIncomeInput, WithholdingOptions,
};
pub use request::{calculate_month, MonthRequest, MonthOutput};
