use crate::error::{BalanceteError, Result};
use crate::schema::SourceColumn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How each document is mapped onto a period label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    #[schemars(description = "One period per calendar month (YYYY-MM)")]
    Monthly,

    #[schemars(description = "One period per calendar quarter (T<1-4>/YYYY)")]
    Quarterly,

    #[schemars(description = "One period per calendar year (YYYY)")]
    Annual,
}

/// Left-to-right order of the four monetary columns before any header is seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnLayout {
    #[default]
    #[schemars(description = "[prior balance, debit, credit, current balance]")]
    PriorFirst,

    #[schemars(description = "[current balance, prior balance, debit, credit]")]
    CurrentFirst,
}

impl ColumnLayout {
    pub fn columns(self) -> [SourceColumn; 4] {
        match self {
            ColumnLayout::PriorFirst => [
                SourceColumn::PriorBalance,
                SourceColumn::Debit,
                SourceColumn::Credit,
                SourceColumn::CurrentBalance,
            ],
            ColumnLayout::CurrentFirst => [
                SourceColumn::CurrentBalance,
                SourceColumn::PriorBalance,
                SourceColumn::Debit,
                SourceColumn::Credit,
            ],
        }
    }
}

/// Half-open value band `[low, high)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value < self.high
    }
}

/// Heuristic constants calibrated against one extraction tool's corruption
/// pattern. Recalibrate per extraction source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ReconciliationThresholds {
    #[schemars(description = "Assets totals inside this band carry a stray leading digit")]
    pub asset_fused_band: Band,

    #[schemars(description = "Amount subtracted from an assets total inside the fused band")]
    pub asset_fused_offset: f64,

    #[schemars(description = "Liabilities totals inside this band are shifted by one order of magnitude")]
    pub liability_shift_band: Band,

    pub liability_shift_divisor: f64,

    #[schemars(description = "A shifted liabilities value is accepted only within this ratio of the assets total")]
    pub liability_plausible_ratio: Band,

    #[schemars(description = "Liabilities bands corrected by subtracting their lower bound")]
    pub liability_offset_bands: Vec<Band>,

    #[schemars(description = "Candidates above max(multiplier x assets, floor) are discarded")]
    pub implausible_assets_multiplier: f64,

    pub implausible_floor: f64,

    #[schemars(description = "Discard cap used when the assets total is unknown")]
    pub implausible_unknown_cap: f64,

    #[schemars(description = "Liabilities candidate accepted when its relative error to assets is below this")]
    pub max_relative_error: f64,

    pub total_phrase_bonus: f64,
    pub root_classification_bonus: f64,
    pub bare_digit_bonus: f64,
    pub magnitude_weight: f64,

    #[schemars(description = "Rows above this multiple of the assets total are outliers")]
    pub outlier_cap_ratio: f64,

    pub small_assets_threshold: f64,
    pub small_assets_cap: f64,
    pub unknown_assets_cap: f64,

    #[schemars(description = "Variance (percent) at or above which the largest variance is high priority")]
    pub variance_alert_percent: f64,

    pub min_variance_delta: f64,
}

impl Default for ReconciliationThresholds {
    fn default() -> Self {
        Self {
            asset_fused_band: Band::new(10_000_000.0, 20_000_000.0),
            asset_fused_offset: 10_000_000.0,
            liability_shift_band: Band::new(30_000_000.0, 40_000_000.0),
            liability_shift_divisor: 10.0,
            liability_plausible_ratio: Band::new(0.2, 5.0),
            liability_offset_bands: vec![
                Band::new(20_000_000.0, 30_000_000.0),
                Band::new(10_000_000.0, 20_000_000.0),
            ],
            implausible_assets_multiplier: 20.0,
            implausible_floor: 200_000_000.0,
            implausible_unknown_cap: 1_000_000_000.0,
            max_relative_error: 0.35,
            total_phrase_bonus: 1000.0,
            root_classification_bonus: 200.0,
            bare_digit_bonus: 50.0,
            magnitude_weight: 10.0,
            outlier_cap_ratio: 1.05,
            small_assets_threshold: 200_000_000.0,
            small_assets_cap: 1_000_000_000.0,
            unknown_assets_cap: 1e12,
            variance_alert_percent: 50.0,
            min_variance_delta: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct RankingLimits {
    pub top_balances: usize,
    pub top_variances: usize,
    pub pareto: usize,
    pub evidence: usize,
}

impl Default for RankingLimits {
    fn default() -> Self {
        Self {
            top_balances: 10,
            top_variances: 15,
            pareto: 10,
            evidence: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    #[schemars(description = "Governs how each document is mapped onto a period label")]
    pub granularity: Granularity,

    #[schemars(description = "Column order assumed until a column header line is seen")]
    pub default_column_layout: ColumnLayout,

    pub thresholds: ReconciliationThresholds,

    pub limits: RankingLimits,

    #[schemars(description = "Number of characters of each document kept as raw-text sample")]
    pub raw_sample_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::default(),
            default_column_layout: ColumnLayout::default(),
            thresholds: ReconciliationThresholds::default(),
            limits: RankingLimits::default(),
            raw_sample_chars: 2_000,
        }
    }
}

impl AnalysisConfig {
    pub fn with_granularity(granularity: Granularity) -> Self {
        Self {
            granularity,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;

        validate_band("asset_fused_band", &t.asset_fused_band)?;
        validate_band("liability_shift_band", &t.liability_shift_band)?;
        validate_band("liability_plausible_ratio", &t.liability_plausible_ratio)?;
        for band in &t.liability_offset_bands {
            validate_band("liability_offset_bands", band)?;
            if band.low < t.liability_shift_band.high && t.liability_shift_band.low < band.high {
                return Err(BalanceteError::InvalidConfig(format!(
                    "liability offset band [{}, {}) overlaps the shift band [{}, {})",
                    band.low, band.high, t.liability_shift_band.low, t.liability_shift_band.high
                )));
            }
        }

        let positives = [
            ("asset_fused_offset", t.asset_fused_offset),
            ("liability_shift_divisor", t.liability_shift_divisor),
            ("implausible_assets_multiplier", t.implausible_assets_multiplier),
            ("implausible_floor", t.implausible_floor),
            ("implausible_unknown_cap", t.implausible_unknown_cap),
            ("outlier_cap_ratio", t.outlier_cap_ratio),
            ("small_assets_threshold", t.small_assets_threshold),
            ("small_assets_cap", t.small_assets_cap),
            ("unknown_assets_cap", t.unknown_assets_cap),
            ("variance_alert_percent", t.variance_alert_percent),
        ];
        for (name, value) in positives {
            if !value.is_finite() || value <= 0.0 {
                return Err(BalanceteError::InvalidThreshold {
                    name: name.to_string(),
                    details: format!("must be a positive finite number, got {}", value),
                });
            }
        }

        if !(t.max_relative_error > 0.0 && t.max_relative_error <= 1.0) {
            return Err(BalanceteError::InvalidThreshold {
                name: "max_relative_error".to_string(),
                details: format!("must be in (0, 1], got {}", t.max_relative_error),
            });
        }

        if t.min_variance_delta < 0.0 {
            return Err(BalanceteError::InvalidThreshold {
                name: "min_variance_delta".to_string(),
                details: format!("must not be negative, got {}", t.min_variance_delta),
            });
        }

        let limits = [
            ("top_balances", self.limits.top_balances),
            ("top_variances", self.limits.top_variances),
            ("pareto", self.limits.pareto),
            ("evidence", self.limits.evidence),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(BalanceteError::InvalidRankingLimit(name.to_string()));
            }
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }
}

fn validate_band(name: &str, band: &Band) -> Result<()> {
    if !band.low.is_finite() || !band.high.is_finite() || band.low < 0.0 || band.low >= band.high {
        return Err(BalanceteError::InvalidThreshold {
            name: name.to_string(),
            details: format!("band [{}, {}) must be finite, non-negative and non-empty", band.low, band.high),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.granularity, Granularity::Monthly);
        assert_eq!(config.limits.top_variances, 15);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            AnalysisConfig::from_json_str(r#"{ "granularity": "quarterly", "thresholds": { "max_relative_error": 0.5 } }"#)
                .unwrap();
        assert_eq!(config.granularity, Granularity::Quarterly);
        assert_eq!(config.thresholds.max_relative_error, 0.5);
        assert_eq!(config.thresholds.outlier_cap_ratio, 1.05);
        assert_eq!(config.default_column_layout, ColumnLayout::PriorFirst);
    }

    #[test]
    fn test_inverted_band_rejected() {
        let json = r#"{ "thresholds": { "asset_fused_band": { "low": 20000000.0, "high": 10000000.0 } } }"#;
        let err = AnalysisConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, BalanceteError::InvalidThreshold { ref name, .. } if name == "asset_fused_band"));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = AnalysisConfig::default();
        config.limits.pareto = 0;
        assert!(matches!(
            config.validate(),
            Err(BalanceteError::InvalidRankingLimit(_))
        ));
    }

    #[test]
    fn test_relative_error_out_of_range_rejected() {
        let mut config = AnalysisConfig::default();
        config.thresholds.max_relative_error = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_offset_band_overlapping_shift_band_rejected() {
        let mut config = AnalysisConfig::default();
        config.thresholds.liability_offset_bands = vec![Band::new(25_000_000.0, 35_000_000.0)];
        assert!(matches!(config.validate(), Err(BalanceteError::InvalidConfig(_))));
    }

    #[test]
    fn test_layout_columns() {
        assert_eq!(ColumnLayout::PriorFirst.columns()[3], SourceColumn::CurrentBalance);
        assert_eq!(ColumnLayout::CurrentFirst.columns()[0], SourceColumn::CurrentBalance);
    }

    #[test]
    fn test_config_schema_generation() {
        let schema = serde_json::to_string(&AnalysisConfig::generate_json_schema()).unwrap();
        assert!(schema.contains("granularity"));
        assert!(schema.contains("max_relative_error"));
    }
}
