pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "policy")]
pub mod policy;

#[cfg(feature = "withholding")]
pub mod withholding;

#[cfg(feature = "forecast")]
pub mod forecast;

#[cfg(feature = "performance")]
pub mod performance;

pub use error::FincalcError;
pub use types::*;

/// Standard result type for all fincalc operations
pub type FincalcResult<T> = Result<T, FincalcError>;
