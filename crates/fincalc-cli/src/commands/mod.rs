pub mod forecast;
pub mod performance;
pub mod policy;
pub mod withholding;
