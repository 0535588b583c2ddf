use clap::Args;
use serde_json::Value;

use fincalc_core::forecast::{self, ForecastRequest};
use fincalc_core::withholding::BonusTaxMode;

use super::policy::load_repository;
use crate::input;

/// Arguments for a multi-month withholding forecast
#[derive(Args)]
pub struct ForecastArgs {
    /// Path to a JSON/YAML forecast request (region, start, end, events)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a JSON/YAML file of policy windows
    #[arg(long)]
    pub policies: Option<String>,

    /// Tax bonuses separately (overrides the request's options)
    #[arg(long)]
    pub separate_bonus: bool,

    /// Never withhold a negative amount (overrides the request's options)
    #[arg(long)]
    pub clamp_negative: bool,
}

fn read_request(args: &ForecastArgs) -> Result<ForecastRequest, Box<dyn std::error::Error>> {
    let mut request: ForecastRequest = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json|file.yaml> or stdin required for forecast".into());
    };

    if args.separate_bonus {
        request.options.withholding.bonus_mode = BonusTaxMode::Separate;
    }
    if args.clamp_negative {
        request.options.withholding.clamp_negative_monthly_tax = true;
    }
    Ok(request)
}

pub fn run_forecast(args: ForecastArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request = read_request(&args)?;
    let repo = load_repository(args.policies.as_deref(), &request.region)?;
    let result = forecast::calculate_forecast(&request, &repo)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_year_summary(args: ForecastArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request = read_request(&args)?;
    let repo = load_repository(args.policies.as_deref(), &request.region)?;
    let output = forecast::calculate_forecast(&request, &repo)?;
    for warning in &output.warnings {
        tracing::warn!("{warning}");
    }
    Ok(serde_json::to_value(output.result.years)?)
}
