pub mod reconcile;
pub mod twr;
pub mod xirr;

pub use reconcile::{
    calculate_performance, compute_performance, compute_performance_series, PerformanceInput,
    PerformanceOutput, PerformanceResult, PerformanceSeries, ValuationSnapshot,
};
pub use twr::{twr, twr_breakdown, TwrBreakdown, TwrPeriod};
pub use xirr::{xirr, xirr_with_guess, DEFAULT_XIRR_GUESS};
