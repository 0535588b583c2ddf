use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use fincalc_core::policy::presets;
use fincalc_core::policy::{InMemoryPolicyRepository, PolicyConfig};

use crate::input;

/// Start of the cumulative withholding regime the built-in preset models.
const PRESET_EFFECTIVE_FROM: (i32, u32, u32) = (2019, 1, 1);

fn preset_effective_from() -> Result<NaiveDate, Box<dyn std::error::Error>> {
    let (y, m, d) = PRESET_EFFECTIVE_FROM;
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| "invalid preset date".into())
}

/// Load policy windows from `path`, or fall back to the national preset for
/// `region` when no file is given.
pub fn load_repository(
    path: Option<&str>,
    region: &str,
) -> Result<InMemoryPolicyRepository, Box<dyn std::error::Error>> {
    let policies = match path {
        // Either one window or a list of windows.
        Some(path) => match input::file::read_document::<Value>(path)? {
            list @ Value::Array(_) => serde_json::from_value::<Vec<PolicyConfig>>(list)?,
            single => vec![serde_json::from_value::<PolicyConfig>(single)?],
        },
        None => {
            tracing::info!(region, "no policy file given, using national preset");
            vec![presets::standard_policy(region, preset_effective_from()?)]
        }
    };
    tracing::debug!(windows = policies.len(), "loaded policy windows");
    Ok(InMemoryPolicyRepository::from_policies(policies)?)
}

/// Arguments for printing the built-in policy preset
#[derive(Args)]
pub struct PresetsArgs {
    /// Region name stamped on the preset
    #[arg(long, default_value = "national")]
    pub region: String,

    /// First day the preset applies (YYYY-MM-DD)
    #[arg(long)]
    pub effective_from: Option<NaiveDate>,

    /// Housing-fund rate (e.g. 0.12); omit to keep the preset's 7%
    #[arg(long)]
    pub housing_fund_rate: Option<Decimal>,

    /// Social-insurance / housing-fund base floor
    #[arg(long)]
    pub base_min: Option<Decimal>,

    /// Social-insurance / housing-fund base ceiling
    #[arg(long)]
    pub base_max: Option<Decimal>,
}

pub fn run_presets(args: PresetsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let from = match args.effective_from {
        Some(date) => date,
        None => preset_effective_from()?,
    };
    let mut policy = presets::standard_policy(&args.region, from);

    let base_min = args.base_min.unwrap_or(policy.social_insurance.base_min);
    let base_max = args.base_max.unwrap_or(policy.social_insurance.base_max);
    policy.social_insurance = presets::standard_social_insurance(base_min, base_max);
    let hf_rate = args
        .housing_fund_rate
        .or(policy.housing_fund.as_ref().map(|hf| hf.rate))
        .unwrap_or(Decimal::ZERO);
    policy.housing_fund = Some(presets::standard_housing_fund(hf_rate, base_min, base_max));

    policy.validate()?;
    Ok(serde_json::to_value(policy)?)
}
