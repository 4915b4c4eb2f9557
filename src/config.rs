//! Engine configuration

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::types::{LedgerError, LedgerResult, DEFAULT_MINOR_UNIT_SCALE};

const MAX_COMBINATION_SIZE: usize = 6;
const MAX_AGGREGATE_CANDIDATES: usize = 20;
const MAX_MINOR_UNIT_SCALE: u32 = 6;

/// Top-level configuration for a ledger instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub currency: CurrencyConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub code: String,
    /// Fractional digits of one major unit (2 for cents)
    pub minor_unit_scale: u32,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            code: "CNY".into(),
            minor_unit_scale: DEFAULT_MINOR_UNIT_SCALE,
        }
    }
}

/// Tuning for the reconciliation matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Maximum distance in days between a statement line and a journal line
    pub date_tolerance_days: i64,
    /// Maximum amount difference, in minor units, still treated as equal
    pub amount_epsilon: i64,
    /// Try one-to-many matches once the exact pass is done
    pub aggregate_pass: bool,
    /// Largest number of journal lines combined against one statement line
    pub max_combination_size: usize,
    /// Closest candidates considered per statement line by the aggregate pass
    pub max_aggregate_candidates: usize,
    /// Statement lines processed per batch
    pub batch_size: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: 3,
            amount_epsilon: 0,
            aggregate_pass: true,
            max_combination_size: 4,
            max_aggregate_candidates: 12,
            batch_size: 500,
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.date_tolerance_days < 0 {
            return Err(LedgerError::Config(
                "date_tolerance_days cannot be negative".to_string(),
            ));
        }
        if self.amount_epsilon < 0 {
            return Err(LedgerError::Config(
                "amount_epsilon cannot be negative".to_string(),
            ));
        }
        if !(2..=MAX_COMBINATION_SIZE).contains(&self.max_combination_size) {
            return Err(LedgerError::Config(format!(
                "max_combination_size must be between 2 and {}",
                MAX_COMBINATION_SIZE
            )));
        }
        if self.max_aggregate_candidates == 0
            || self.max_aggregate_candidates > MAX_AGGREGATE_CANDIDATES
        {
            return Err(LedgerError::Config(format!(
                "max_aggregate_candidates must be between 1 and {}",
                MAX_AGGREGATE_CANDIDATES
            )));
        }
        if self.batch_size == 0 {
            return Err(LedgerError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Parse a JSON document; absent fields take their defaults
    pub fn from_json_str(json: &str) -> LedgerResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| LedgerError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> LedgerResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&data)
    }

    pub fn to_json(&self) -> LedgerResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LedgerError::Config(format!("Cannot serialize configuration: {}", e)))
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.currency.code.trim().is_empty() {
            return Err(LedgerError::Config("currency code cannot be empty".to_string()));
        }
        if self.currency.minor_unit_scale > MAX_MINOR_UNIT_SCALE {
            return Err(LedgerError::Config(format!(
                "minor_unit_scale cannot exceed {}",
                MAX_MINOR_UNIT_SCALE
            )));
        }
        self.matching.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "matching": { "date_tolerance_days": 5 } }"#)
                .unwrap();
        assert_eq!(config.matching.date_tolerance_days, 5);
        assert_eq!(config.matching.max_combination_size, 4);
        assert_eq!(config.currency.minor_unit_scale, 2);
        assert_eq!(config.currency.code, "CNY");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err =
            EngineConfig::from_json_str(r#"{ "matching": { "max_combination_size": 9 } }"#)
                .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));

        let err = EngineConfig::from_json_str(r#"{ "matching": { "batch_size": 0 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("batch_size"));

        assert!(EngineConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let missing = EngineConfig::load(Path::new("/nonexistent/ledger.json")).unwrap();
        assert_eq!(missing, EngineConfig::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "currency": {{ "code": "USD" }} }}"#).unwrap();
        let loaded = EngineConfig::load(file.path()).unwrap();
        assert_eq!(loaded.currency.code, "USD");

        let json = loaded.to_json().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), loaded);
    }
}
