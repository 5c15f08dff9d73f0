//! Settings snapshot for a single distribution run.
//!
//! Settings are stored as string key/value pairs (`package_price`,
//! `level_3_commission`, ...). A run parses them once into a
//! [`SettingsSnapshot`] and never looks at the store again, so a concurrent
//! settings edit only affects later activations.
//!
//! Commission rates are flat amounts per level, indexed by validated level
//! number `1..=max_matrix_levels`. Any level outside that range pays zero.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Well-known settings keys.
pub mod keys {
    pub const PACKAGE_PRICE: &str = "package_price";
    pub const MIN_WITHDRAWAL: &str = "min_withdrawal";
    pub const MAX_MATRIX_LEVELS: &str = "max_matrix_levels";
    pub const REFERRALS_PER_LEVEL: &str = "referrals_per_level";

    /// Key for the flat commission paid at `level`.
    pub fn level_commission(level: u32) -> String {
        format!("level_{}_commission", level)
    }

    /// Extract the level from a `level_{n}_commission` key.
    pub fn parse_level_commission(key: &str) -> Option<u32> {
        key.strip_prefix("level_")?
            .strip_suffix("_commission")?
            .parse()
            .ok()
    }
}

/// Package price for a new activation.
pub const DEFAULT_PACKAGE_PRICE: u64 = 36_000;

/// Smallest withdrawal the platform accepts.
pub const DEFAULT_MIN_WITHDRAWAL: u64 = 5_000;

/// Default matrix depth.
pub const DEFAULT_MAX_MATRIX_LEVELS: u32 = 6;

/// Default matrix width.
pub const DEFAULT_REFERRALS_PER_LEVEL: u32 = 5;

/// Default flat commission per level, level 1 first.
pub const DEFAULT_LEVEL_COMMISSION: [u64; 6] = [4_000, 2_000, 2_000, 1_500, 1_500, 1_500];

/// Upper bound on configurable depth. Deep matrices make spillover search
/// exponential in `referrals_per_level`.
pub const MAX_SUPPORTED_LEVELS: u32 = 32;

/// Immutable settings captured at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    package_price: u64,
    min_withdrawal: u64,
    max_matrix_levels: u32,
    referrals_per_level: u32,
    /// Index 0 holds the level 1 rate. Always `max_matrix_levels` long.
    level_commission: Vec<u64>,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            package_price: DEFAULT_PACKAGE_PRICE,
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
            max_matrix_levels: DEFAULT_MAX_MATRIX_LEVELS,
            referrals_per_level: DEFAULT_REFERRALS_PER_LEVEL,
            level_commission: DEFAULT_LEVEL_COMMISSION.to_vec(),
        }
    }
}

impl SettingsSnapshot {
    /// Build a validated snapshot.
    ///
    /// `level_commission` may be shorter than `max_matrix_levels` (missing
    /// levels pay zero) but not longer.
    pub fn new(
        package_price: u64,
        min_withdrawal: u64,
        max_matrix_levels: u32,
        referrals_per_level: u32,
        mut level_commission: Vec<u64>,
    ) -> Result<Self> {
        validate_shape(max_matrix_levels, referrals_per_level)?;
        if level_commission.len() > max_matrix_levels as usize {
            return Err(Error::InvalidSettings(format!(
                "{} commission levels configured but max_matrix_levels is {}",
                level_commission.len(),
                max_matrix_levels
            )));
        }
        level_commission.resize(max_matrix_levels as usize, 0);

        Ok(Self {
            package_price,
            min_withdrawal,
            max_matrix_levels,
            referrals_per_level,
            level_commission,
        })
    }

    /// Parse a snapshot from stored key/value pairs.
    ///
    /// Keys that are absent keep their default. Rates for levels beyond
    /// `max_matrix_levels` are ignored; unknown keys are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let defaults = Self::default();
        let mut package_price = defaults.package_price;
        let mut min_withdrawal = defaults.min_withdrawal;
        let mut max_matrix_levels = defaults.max_matrix_levels;
        let mut referrals_per_level = defaults.referrals_per_level;
        let mut rates: Vec<(u32, u64)> = Vec::new();

        for (key, value) in pairs {
            match key {
                keys::PACKAGE_PRICE => package_price = parse_value(key, value)?,
                keys::MIN_WITHDRAWAL => min_withdrawal = parse_value(key, value)?,
                keys::MAX_MATRIX_LEVELS => max_matrix_levels = parse_value(key, value)?,
                keys::REFERRALS_PER_LEVEL => referrals_per_level = parse_value(key, value)?,
                other => match keys::parse_level_commission(other) {
                    Some(0) => {
                        return Err(Error::InvalidSettings(format!(
                            "{}: levels start at 1",
                            other
                        )))
                    }
                    Some(level) => rates.push((level, parse_value(key, value)?)),
                    None => tracing::debug!(key = other, "ignoring unknown setting"),
                },
            }
        }

        validate_shape(max_matrix_levels, referrals_per_level)?;

        let mut level_commission: Vec<u64> = (0..max_matrix_levels as usize)
            .map(|i| DEFAULT_LEVEL_COMMISSION.get(i).copied().unwrap_or(0))
            .collect();
        for (level, amount) in rates {
            match level_commission.get_mut(level as usize - 1) {
                Some(slot) => *slot = amount,
                None => tracing::warn!(
                    level,
                    max_matrix_levels,
                    "commission configured beyond max_matrix_levels, ignoring"
                ),
            }
        }

        Ok(Self {
            package_price,
            min_withdrawal,
            max_matrix_levels,
            referrals_per_level,
            level_commission,
        })
    }

    /// Render the snapshot back into key/value pairs (used for seeding).
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (keys::PACKAGE_PRICE.to_string(), self.package_price.to_string()),
            (keys::MIN_WITHDRAWAL.to_string(), self.min_withdrawal.to_string()),
            (
                keys::MAX_MATRIX_LEVELS.to_string(),
                self.max_matrix_levels.to_string(),
            ),
            (
                keys::REFERRALS_PER_LEVEL.to_string(),
                self.referrals_per_level.to_string(),
            ),
        ];
        for (i, amount) in self.level_commission.iter().enumerate() {
            pairs.push((keys::level_commission(i as u32 + 1), amount.to_string()));
        }
        pairs
    }

    /// Flat commission paid to the ancestor at `level`. Zero when out of range.
    pub fn level_commission(&self, level: u32) -> u64 {
        if level == 0 || level > self.max_matrix_levels {
            return 0;
        }
        self.level_commission
            .get(level as usize - 1)
            .copied()
            .unwrap_or(0)
    }

    /// All rates, level 1 first.
    pub fn level_commissions(&self) -> &[u64] {
        &self.level_commission
    }

    pub fn package_price(&self) -> u64 {
        self.package_price
    }

    pub fn min_withdrawal(&self) -> u64 {
        self.min_withdrawal
    }

    pub fn max_matrix_levels(&self) -> u32 {
        self.max_matrix_levels
    }

    pub fn referrals_per_level(&self) -> u32 {
        self.referrals_per_level
    }

    /// Maximum total paid out for one activation.
    pub fn max_payout(&self) -> u64 {
        self.level_commission.iter().sum()
    }
}

fn validate_shape(max_matrix_levels: u32, referrals_per_level: u32) -> Result<()> {
    if max_matrix_levels == 0 || max_matrix_levels > MAX_SUPPORTED_LEVELS {
        return Err(Error::InvalidSettings(format!(
            "max_matrix_levels must be in 1..={}, got {}",
            MAX_SUPPORTED_LEVELS, max_matrix_levels
        )));
    }
    if referrals_per_level == 0 {
        return Err(Error::InvalidSettings(
            "referrals_per_level must be positive".to_string(),
        ));
    }
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidSettings(format!("{}: not a number: {:?}", key, value)))
}

/// Source of settings snapshots.
pub trait SettingsProvider {
    /// Read the full settings in one consistent operation.
    fn snapshot(&self) -> Result<SettingsSnapshot>;
}

impl SettingsProvider for SettingsSnapshot {
    fn snapshot(&self) -> Result<SettingsSnapshot> {
        Ok(self.clone())
    }
}
