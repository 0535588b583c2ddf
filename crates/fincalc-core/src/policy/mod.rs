//! Time-versioned tax and contribution policy.
//!
//! A [`PolicyConfig`] is an immutable snapshot of the bracket table,
//! deductions and contribution rates in force for one region over one
//! effective window. Windows are looked up through [`PolicyRepository`].

pub mod config;
pub mod presets;
pub mod repository;
pub mod signature;

pub use config::{
    BracketTable, HousingFundConfig, PolicyConfig, SocialInsuranceConfig, TaxBracket,
};
pub use repository::{resolve_policy, InMemoryPolicyRepository, PolicyRepository, ResolvedPolicy};
pub use signature::PolicySignature;
