use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::config::{BracketTable, PolicyConfig};

/// Structural hash of the tax-relevant content of a [`PolicyConfig`].
///
/// Region and effective window are not part of the hash, so two windows
/// carrying identical rules share a signature. Decimals are normalised
/// first (`0.10` and `0.1` hash the same).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySignature(String);

impl PolicySignature {
    pub fn of(policy: &PolicyConfig) -> Self {
        let mut hasher = Sha256::new();

        put_table(&mut hasher, "brackets", &policy.brackets);
        put_table(&mut hasher, "bonus_brackets", &policy.bonus_table());
        put(&mut hasher, "basic", policy.monthly_basic_deduction);

        let si = &policy.social_insurance;
        put(&mut hasher, "si.pension", si.pension_rate);
        put(&mut hasher, "si.medical", si.medical_rate);
        put(&mut hasher, "si.unemployment", si.unemployment_rate);
        put(&mut hasher, "si.min", si.base_min);
        put(&mut hasher, "si.max", si.base_max);

        match &policy.housing_fund {
            Some(hf) => {
                put(&mut hasher, "hf.rate", hf.rate);
                put(&mut hasher, "hf.min", hf.base_min);
                put(&mut hasher, "hf.max", hf.base_max);
            }
            None => hasher.update(b"hf=none;"),
        }

        // BTreeMap iteration order is stable.
        for (name, amount) in &policy.special_deductions {
            hasher.update(b"special.");
            hasher.update(name.as_bytes());
            put(&mut hasher, "", *amount);
        }

        PolicySignature(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for PolicySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn put(hasher: &mut Sha256, key: &str, value: Decimal) {
    hasher.update(key.as_bytes());
    hasher.update(b"=");
    hasher.update(value.normalize().to_string().as_bytes());
    hasher.update(b";");
}

fn put_table(hasher: &mut Sha256, key: &str, table: &BracketTable) {
    for (i, b) in table.brackets().iter().enumerate() {
        let prefix = format!("{key}[{i}]");
        put(hasher, &format!("{prefix}.from"), b.threshold_from);
        put(hasher, &format!("{prefix}.rate"), b.rate);
        put(hasher, &format!("{prefix}.qd"), b.quick_deduction);
    }
}
