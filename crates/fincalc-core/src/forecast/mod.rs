//! Month-by-month withholding forecast driven by an income timeline.

pub mod engine;
pub mod events;
pub mod summary;

pub use engine::{
    calculate_forecast, forecast, ForecastOptions, ForecastOutput, ForecastRequest, ForecastRow,
    MonthMarkers, MonthOutcome,
};
pub use events::{expand_long_term_cash, ForecastEvent, IncomeTimeline};
pub use summary::{summarize_years, YearSummary};
