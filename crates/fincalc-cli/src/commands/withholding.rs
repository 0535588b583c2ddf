use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use fincalc_core::withholding::{
    self, BonusTaxMode, CumulativeState, MonthRequest, MonthlyIncomeInput, WithholdingOptions,
};

use super::policy::load_repository;
use crate::input;

/// Arguments for a single-month withholding calculation
#[derive(Args)]
pub struct MonthArgs {
    /// Path to a JSON/YAML month request (takes precedence over individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a JSON/YAML file of policy windows
    #[arg(long)]
    pub policies: Option<String>,

    /// Region whose policy applies
    #[arg(long, default_value = "national")]
    pub region: String,

    /// Calendar year
    #[arg(long)]
    pub year: Option<i32>,

    /// Calendar month (1-12)
    #[arg(long)]
    pub month: Option<u32>,

    /// Gross salary for the month
    #[arg(long)]
    pub gross: Option<Decimal>,

    /// Bonus paid this month
    #[arg(long)]
    pub bonus: Option<Decimal>,

    /// Tax the bonus separately instead of merging it into cumulative income
    #[arg(long)]
    pub separate_bonus: bool,

    /// Never withhold a negative amount; carry the shortfall forward
    #[arg(long)]
    pub clamp_negative: bool,
}

fn apply_option_switches(
    options: &mut WithholdingOptions,
    separate_bonus: bool,
    clamp_negative: bool,
) {
    if separate_bonus {
        options.bonus_mode = BonusTaxMode::Separate;
    }
    if clamp_negative {
        options.clamp_negative_monthly_tax = true;
    }
}

fn request_from_flags(args: &MonthArgs) -> Result<MonthRequest, Box<dyn std::error::Error>> {
    let year = args.year.ok_or("--year is required (or provide --input)")?;
    let month = args.month.ok_or("--month is required (or provide --input)")?;
    let gross = args.gross.ok_or("--gross is required (or provide --input)")?;

    let mut income = MonthlyIncomeInput::new(year, month, gross);
    income.bonus = args.bonus;

    Ok(MonthRequest {
        region: args.region.clone(),
        state: CumulativeState::new(),
        income,
        options: WithholdingOptions::default(),
        anchor_day: 1,
    })
}

/// Input precedence: `--input` file, then inline flags, then piped stdin.
fn read_request(args: &MonthArgs) -> Result<MonthRequest, Box<dyn std::error::Error>> {
    let has_flags = args.year.is_some() || args.month.is_some() || args.gross.is_some();
    let mut request: MonthRequest = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if has_flags {
        request_from_flags(args)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--year/--month/--gross or --input <file> required".into());
    };

    apply_option_switches(&mut request.options, args.separate_bonus, args.clamp_negative);
    Ok(request)
}

pub fn run_month(args: MonthArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request = read_request(&args)?;
    let repo = load_repository(args.policies.as_deref(), &request.region)?;
    let result = withholding::calculate_month(&request, &repo)?;
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn flag_args() -> MonthArgs {
        MonthArgs {
            input: None,
            policies: None,
            region: "national".into(),
            year: Some(2024),
            month: Some(1),
            gross: Some(dec!(20000)),
            bonus: Some(dec!(36000)),
            separate_bonus: true,
            clamp_negative: false,
        }
    }

    #[test]
    fn test_flags_build_request_with_switches() {
        let request = read_request(&flag_args()).unwrap();
        assert_eq!(request.income.gross_salary, dec!(20000));
        assert_eq!(request.income.bonus, Some(dec!(36000)));
        assert_eq!(request.options.bonus_mode, BonusTaxMode::Separate);
        assert!(!request.options.clamp_negative_monthly_tax);
    }

    #[test]
    fn test_partial_flags_name_the_missing_one() {
        let mut args = flag_args();
        args.gross = None;
        let err = read_request(&args).unwrap_err();
        assert!(err.to_string().contains("--gross"));
    }

    #[test]
    fn test_run_month_from_flags() {
        let value = run_month(flag_args()).unwrap();
        assert!(value["result"]["result"]["tax_this_month"].is_string());
    }
}
