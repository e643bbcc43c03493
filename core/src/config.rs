use crate::{error::LedgerResult, store::LedgerStore};
use serde::{Deserialize, Serialize};

/// What the expiry sweep does with an investment whose term has ended
/// while it still had uncollected days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Pay the remaining days as a final collection and mark `completed`.
    Settle,
    /// Return capital (when the plan does), drop uncollected profit, mark `expired`.
    Forfeit,
}

impl ExpiryPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "settle" => Some(Self::Settle),
            "forfeit" => Some(Self::Forfeit),
            _ => None,
        }
    }
}

/// All configurable percentages and thresholds (the `admin_settings` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub referral_l1_deposit_percent: f64,
    pub referral_l1_earning_percent: f64,
    pub referral_l2_earning_percent: f64,
    pub referral_l3_earning_percent: f64,
    pub agent_l1_requirement: i64,
    pub agent_l2_requirement: i64,
    pub agent_l3_requirement: i64,
    #[serde(default)]
    pub agent_activation_bonus: f64,
    pub withdrawal_fee_percent: f64,
    pub min_withdrawal_amount: f64,
    pub min_deposit_amount: f64,
    pub expiry_policy: ExpiryPolicy,
    /// When set, a failed audit write aborts the whole operation instead of
    /// being logged and skipped.
    #[serde(default)]
    pub strict_audit: bool,
}

/// One entry of the plan catalogue used to seed a fresh database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSeed {
    pub plan_id: String,
    pub name: String,
    pub duration_days: i64,
    pub profit_percent: f64,
    pub capital_return: bool,
    pub min_amount: f64,
    pub max_amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlanCatalogFile {
    plans: Vec<PlanSeed>,
}

impl LedgerConfig {
    /// Load from the data/ directory.
    /// In tests, use LedgerConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/settings/admin_settings.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Plan catalogue from data/plans/plan_catalog.json.
    pub fn load_plan_catalog(data_dir: &str) -> anyhow::Result<Vec<PlanSeed>> {
        let path = format!("{data_dir}/plans/plan_catalog.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: PlanCatalogFile = serde_json::from_str(&content)?;
        Ok(file.plans)
    }

    /// Overlay any rows present in the persisted `admin_settings` table.
    /// Unknown keys are ignored; malformed values are rejected.
    pub fn with_store_overrides(mut self, store: &LedgerStore) -> LedgerResult<Self> {
        for (key, value) in store.admin_settings()? {
            self.apply_setting(&key, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn apply_setting(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let number = || -> anyhow::Result<f64> {
            value
                .trim()
                .parse::<f64>()
                .map_err(|e| anyhow::anyhow!("admin_settings.{key}: {e}"))
        };
        let count = || -> anyhow::Result<i64> {
            value
                .trim()
                .parse::<i64>()
                .map_err(|e| anyhow::anyhow!("admin_settings.{key}: {e}"))
        };
        match key {
            "referral_l1_deposit_percent" => self.referral_l1_deposit_percent = number()?,
            "referral_l1_earning_percent" => self.referral_l1_earning_percent = number()?,
            "referral_l2_earning_percent" => self.referral_l2_earning_percent = number()?,
            "referral_l3_earning_percent" => self.referral_l3_earning_percent = number()?,
            "agent_l1_requirement" => self.agent_l1_requirement = count()?,
            "agent_l2_requirement" => self.agent_l2_requirement = count()?,
            "agent_l3_requirement" => self.agent_l3_requirement = count()?,
            "agent_activation_bonus" => self.agent_activation_bonus = number()?,
            "withdrawal_fee_percent" => self.withdrawal_fee_percent = number()?,
            "min_withdrawal_amount" => self.min_withdrawal_amount = number()?,
            "min_deposit_amount" => self.min_deposit_amount = number()?,
            "expiry_policy" => {
                self.expiry_policy = ExpiryPolicy::parse(value.trim()).ok_or_else(|| {
                    anyhow::anyhow!("admin_settings.expiry_policy: unknown policy '{value}'")
                })?
            }
            "strict_audit" => self.strict_audit = matches!(value.trim(), "true" | "1"),
            other => log::debug!("config: ignoring unknown admin setting '{other}'"),
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        let percents = [
            ("referral_l1_deposit_percent", self.referral_l1_deposit_percent),
            ("referral_l1_earning_percent", self.referral_l1_earning_percent),
            ("referral_l2_earning_percent", self.referral_l2_earning_percent),
            ("referral_l3_earning_percent", self.referral_l3_earning_percent),
            ("withdrawal_fee_percent", self.withdrawal_fee_percent),
        ];
        for (name, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                anyhow::bail!("{name} must be within [0, 100], got {value}");
            }
        }
        if self.agent_activation_bonus < 0.0
            || self.min_withdrawal_amount < 0.0
            || self.min_deposit_amount < 0.0
        {
            anyhow::bail!("amount thresholds must be non-negative");
        }
        let requirements = [
            ("agent_l1_requirement", self.agent_l1_requirement),
            ("agent_l2_requirement", self.agent_l2_requirement),
            ("agent_l3_requirement", self.agent_l3_requirement),
        ];
        for (name, value) in requirements {
            if value < 0 {
                anyhow::bail!("{name} must be non-negative, got {value}");
            }
        }
        Ok(())
    }

    /// Commission rate for an earning event at ancestor level 1..=3.
    pub fn earning_rate(&self, level: u8) -> f64 {
        match level {
            1 => self.referral_l1_earning_percent,
            2 => self.referral_l2_earning_percent,
            3 => self.referral_l3_earning_percent,
            _ => 0.0,
        }
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            referral_l1_deposit_percent: 5.0,
            referral_l1_earning_percent: 5.0,
            referral_l2_earning_percent: 3.0,
            referral_l3_earning_percent: 2.0,
            agent_l1_requirement: 3,
            agent_l2_requirement: 0,
            agent_l3_requirement: 0,
            agent_activation_bonus: 0.0,
            withdrawal_fee_percent: 10.0,
            min_withdrawal_amount: 100.0,
            min_deposit_amount: 100.0,
            expiry_policy: ExpiryPolicy::Settle,
            strict_audit: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_overrides_replace_defaults() {
        let mut config = LedgerConfig::default_test();
        config.apply_setting("referral_l1_deposit_percent", "7.5").unwrap();
        config.apply_setting("expiry_policy", "forfeit").unwrap();
        config.apply_setting("strict_audit", "true").unwrap();
        assert_eq!(config.referral_l1_deposit_percent, 7.5);
        assert_eq!(config.expiry_policy, ExpiryPolicy::Forfeit);
        assert!(config.strict_audit);
    }

    #[test]
    fn malformed_setting_is_rejected() {
        let mut config = LedgerConfig::default_test();
        assert!(config.apply_setting("withdrawal_fee_percent", "ten").is_err());
        assert!(config.apply_setting("expiry_policy", "vanish").is_err());
    }

    #[test]
    fn agent_requirements_are_whole_counts() {
        let mut config = LedgerConfig::default_test();
        assert!(config.apply_setting("agent_l1_requirement", "2.7").is_err());
        assert_eq!(config.agent_l1_requirement, 3);
        config.apply_setting("agent_l2_requirement", " 4 ").unwrap();
        assert_eq!(config.agent_l2_requirement, 4);
    }

    #[test]
    fn negative_agent_requirement_fails_validation() {
        let mut config = LedgerConfig::default_test();
        config.apply_setting("agent_l3_requirement", "-1").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_percent_fails_validation() {
        let mut config = LedgerConfig::default_test();
        config.referral_l2_earning_percent = 140.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn earning_rate_by_level() {
        let config = LedgerConfig::default_test();
        assert_eq!(config.earning_rate(1), 5.0);
        assert_eq!(config.earning_rate(2), 3.0);
        assert_eq!(config.earning_rate(3), 2.0);
        assert_eq!(config.earning_rate(4), 0.0);
    }
}
