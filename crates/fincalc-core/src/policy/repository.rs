use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::config::{BracketTable, PolicyConfig, SocialInsuranceConfig};
use super::signature::PolicySignature;
use crate::error::FincalcError;
use crate::FincalcResult;

/// Read-only source of time-versioned policy, keyed by (region, date).
///
/// Implementations must guarantee at most one window covers any date.
pub trait PolicyRepository {
    /// The window with the latest `effective_from <= date`, provided it
    /// still covers `date`. Fails with `ConfigNotFound` otherwise.
    fn resolve(&self, region: &str, date: NaiveDate) -> FincalcResult<PolicyConfig>;

    fn get_brackets(&self, region: &str, date: NaiveDate) -> FincalcResult<BracketTable> {
        Ok(self.resolve(region, date)?.brackets)
    }

    /// `Ok(None)` when no window covers `date`.
    fn get_social_insurance_config(
        &self,
        region: &str,
        date: NaiveDate,
    ) -> FincalcResult<Option<SocialInsuranceConfig>> {
        match self.resolve(region, date) {
            Ok(policy) => Ok(Some(policy.social_insurance)),
            Err(FincalcError::ConfigNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<R: PolicyRepository + ?Sized> PolicyRepository for &R {
    fn resolve(&self, region: &str, date: NaiveDate) -> FincalcResult<PolicyConfig> {
        (**self).resolve(region, date)
    }
}

/// A resolved policy with its signature computed once.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPolicy {
    pub policy: PolicyConfig,
    pub signature: PolicySignature,
}

impl ResolvedPolicy {
    pub fn new(policy: PolicyConfig) -> Self {
        let signature = policy.signature();
        ResolvedPolicy { policy, signature }
    }
}

pub fn resolve_policy<R: PolicyRepository + ?Sized>(
    repo: &R,
    region: &str,
    date: NaiveDate,
) -> FincalcResult<ResolvedPolicy> {
    repo.resolve(region, date).map(ResolvedPolicy::new)
}

/// Policy windows held in memory, sorted by `effective_from` per region.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyRepository {
    windows: BTreeMap<String, Vec<PolicyConfig>>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a batch of windows. Any invalid or overlapping
    /// window rejects the whole batch.
    pub fn from_policies(policies: impl IntoIterator<Item = PolicyConfig>) -> FincalcResult<Self> {
        let mut repo = Self::new();
        for policy in policies {
            repo.insert(policy)?;
        }
        Ok(repo)
    }

    pub fn insert(&mut self, policy: PolicyConfig) -> FincalcResult<()> {
        policy.validate()?;
        let windows = self.windows.entry(policy.region.clone()).or_default();
        if let Some(existing) = windows.iter().find(|w| w.overlaps(&policy)) {
            return Err(FincalcError::OverlappingPolicy {
                region: policy.region.clone(),
                existing_from: existing.effective_from,
                new_from: policy.effective_from,
            });
        }
        let idx = windows.partition_point(|w| w.effective_from < policy.effective_from);
        windows.insert(idx, policy);
        Ok(())
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    pub fn windows(&self, region: &str) -> &[PolicyConfig] {
        self.windows.get(region).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PolicyRepository for InMemoryPolicyRepository {
    fn resolve(&self, region: &str, date: NaiveDate) -> FincalcResult<PolicyConfig> {
        let windows = self.windows(region);
        let idx = windows.partition_point(|w| w.effective_from <= date);
        windows
            .get(idx.wrapping_sub(1))
            .filter(|w| w.covers(date))
            .cloned()
            .ok_or_else(|| FincalcError::ConfigNotFound {
                region: region.to_string(),
                date,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::presets::standard_policy;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn two_window_repo() -> InMemoryPolicyRepository {
        let mut first = standard_policy("shanghai", date(2023, 1, 1));
        first.effective_to = Some(date(2023, 6, 30));
        let mut second = standard_policy("shanghai", date(2023, 7, 1));
        second.social_insurance.base_max = dec!(36549);
        InMemoryPolicyRepository::from_policies(vec![second, first]).unwrap()
    }

    #[test]
    fn test_resolve_picks_latest_effective_from() {
        let repo = two_window_repo();
        let p = repo.resolve("shanghai", date(2023, 6, 30)).unwrap();
        assert_eq!(p.effective_from, date(2023, 1, 1));
        let p = repo.resolve("shanghai", date(2023, 7, 1)).unwrap();
        assert_eq!(p.effective_from, date(2023, 7, 1));
    }

    #[test]
    fn test_resolve_before_first_window_fails() {
        let repo = two_window_repo();
        let err = repo.resolve("shanghai", date(2022, 12, 31)).unwrap_err();
        assert!(matches!(err, FincalcError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_resolve_unknown_region_fails() {
        let repo = two_window_repo();
        assert!(repo.resolve("shenzhen", date(2023, 3, 1)).is_err());
    }

    #[test]
    fn test_resolve_in_gap_after_closed_window_fails() {
        let mut only = standard_policy("hangzhou", date(2023, 1, 1));
        only.effective_to = Some(date(2023, 3, 31));
        let repo = InMemoryPolicyRepository::from_policies(vec![only]).unwrap();
        assert!(repo.resolve("hangzhou", date(2023, 3, 31)).is_ok());
        assert!(repo.resolve("hangzhou", date(2023, 4, 1)).is_err());
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let a = standard_policy("shanghai", date(2023, 1, 1));
        let b = standard_policy("shanghai", date(2024, 1, 1));
        let err = InMemoryPolicyRepository::from_policies(vec![a, b]).unwrap_err();
        assert!(matches!(err, FincalcError::OverlappingPolicy { .. }));
    }

    #[test]
    fn test_social_insurance_lookup_none_outside_windows() {
        let repo = two_window_repo();
        assert!(repo
            .get_social_insurance_config("shanghai", date(2020, 1, 1))
            .unwrap()
            .is_none());
        let si = repo
            .get_social_insurance_config("shanghai", date(2023, 8, 1))
            .unwrap()
            .unwrap();
        assert_eq!(si.base_max, dec!(36549));
    }

    #[test]
    fn test_get_brackets_through_reference() {
        let repo = two_window_repo();
        let by_ref: &dyn PolicyRepository = &repo;
        let table = by_ref.get_brackets("shanghai", date(2023, 2, 1)).unwrap();
        assert_eq!(table.brackets().len(), 7);
    }
}
