use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use fincalc_core::policy::{InMemoryPolicyRepository, PolicyConfig};
use fincalc_core::CashFlow;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Build a repository from a JSON array of policy windows.
fn repository(policies_json: &str) -> NapiResult<InMemoryPolicyRepository> {
    let policies: Vec<PolicyConfig> = serde_json::from_str(policies_json).map_err(to_napi_error)?;
    InMemoryPolicyRepository::from_policies(policies).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Withholding
// ---------------------------------------------------------------------------

#[napi]
pub fn compute_month(policies_json: String, input_json: String) -> NapiResult<String> {
    let repo = repository(&policies_json)?;
    let input: fincalc_core::withholding::MonthRequest =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        fincalc_core::withholding::calculate_month(&input, &repo).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn forecast(policies_json: String, input_json: String) -> NapiResult<String> {
    let repo = repository(&policies_json)?;
    let input: fincalc_core::forecast::ForecastRequest =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        fincalc_core::forecast::calculate_forecast(&input, &repo).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TwrInput {
    periods: Vec<fincalc_core::performance::TwrPeriod>,
}

#[derive(Deserialize)]
struct XirrInput {
    flows: Vec<CashFlow>,
    #[serde(default)]
    guess: Option<rust_decimal::Decimal>,
}

#[napi]
pub fn twr(input_json: String) -> NapiResult<String> {
    let input: TwrInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        fincalc_core::performance::twr_breakdown(&input.periods).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn xirr(input_json: String) -> NapiResult<String> {
    let input: XirrInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let guess = input
        .guess
        .unwrap_or(fincalc_core::performance::DEFAULT_XIRR_GUESS);
    let rate = fincalc_core::performance::xirr_with_guess(&input.flows, guess)
        .map_err(to_napi_error)?;
    serde_json::to_string(&serde_json::json!({ "xirr": rate })).map_err(to_napi_error)
}

#[napi]
pub fn compute_performance(input_json: String) -> NapiResult<String> {
    let input: fincalc_core::performance::PerformanceInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        fincalc_core::performance::calculate_performance(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn compute_performance_series(input_json: String) -> NapiResult<String> {
    let input: fincalc_core::performance::PerformanceInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let series: Vec<_> =
        fincalc_core::performance::compute_performance_series(&input.valuations, &input.flows)
            .map_err(to_napi_error)?
            .collect();
    serde_json::to_string(&series).map_err(to_napi_error)
}
