//! Engine configuration
//!
//! Thresholds, forecast horizons, heuristic confidences, renderer budget and
//! personalization defaults.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/pulse/config/engine.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their built-in value.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::personalization::Tone;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

/// Rule thresholds used by the agents and the decision core
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub budget_pressure_pct: f64,
    pub sales_decline_pct: f64,
    pub sales_growth_pct: f64,
    pub trend_band_pct: f64,
    pub payroll_due_days: i64,
    pub cash_squeeze_payroll_days: i64,
    pub upcoming_leave_window_days: i64,
    pub capacity_leave_count: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            budget_pressure_pct: 80.0,
            sales_decline_pct: 10.0,
            sales_growth_pct: 20.0,
            trend_band_pct: 5.0,
            payroll_due_days: 3,
            cash_squeeze_payroll_days: 10,
            upcoming_leave_window_days: 14,
            capacity_leave_count: 2,
        }
    }
}

/// Forecast settings. The confidences are labelled heuristics.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub horizons: Vec<i64>,
    pub cash_flow_confidence: f64,
    pub budget_burn_confidence: f64,
    pub sales_confidence: f64,
    pub seasonal_factor: f64,
    pub invoice_collection_weight: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizons: vec![30, 60, 90],
            cash_flow_confidence: 0.75,
            budget_burn_confidence: 0.7,
            sales_confidence: 0.6,
            seasonal_factor: 1.0,
            invoice_collection_weight: 0.7,
        }
    }
}

/// Per-organization presentation defaults
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalizationDefaults {
    pub tone: Tone,
    pub currency: String,
    /// Local hour (0-23) at which quiet hours begin
    pub quiet_hours_start: u32,
    /// Local hour (0-23) at which quiet hours end
    pub quiet_hours_end: u32,
}

impl Default for PersonalizationDefaults {
    fn default() -> Self {
        Self {
            tone: Tone::Friendly,
            currency: "USD".to_string(),
            quiet_hours_start: 21,
            quiet_hours_end: 7,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub retention_days: i64,
    pub forecast: ForecastConfig,
    pub renderer_timeout: Duration,
    pub renderer_max_tokens: u32,
    pub personalization: PersonalizationDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            retention_days: 7,
            forecast: ForecastConfig::default(),
            renderer_timeout: Duration::from_secs(20),
            renderer_max_tokens: 600,
            personalization: PersonalizationDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit path. A missing file falls back to embedded defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse a TOML document on top of the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("pulse").join("config").join("engine.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<EngineConfig> {
    let path = match override_path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let content = match path {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "Loading engine config override");
            fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    thresholds: Option<RawThresholds>,
    insights: Option<RawInsights>,
    forecast: Option<RawForecast>,
    renderer: Option<RawRenderer>,
    personalization: Option<RawPersonalization>,
}

#[derive(Debug, Deserialize)]
struct RawThresholds {
    budget_pressure_pct: Option<f64>,
    sales_decline_pct: Option<f64>,
    sales_growth_pct: Option<f64>,
    trend_band_pct: Option<f64>,
    payroll_due_days: Option<i64>,
    cash_squeeze_payroll_days: Option<i64>,
    upcoming_leave_window_days: Option<i64>,
    capacity_leave_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawInsights {
    retention_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawForecast {
    horizons: Option<Vec<i64>>,
    cash_flow_confidence: Option<f64>,
    budget_burn_confidence: Option<f64>,
    sales_confidence: Option<f64>,
    seasonal_factor: Option<f64>,
    invoice_collection_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawRenderer {
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawPersonalization {
    tone: Option<String>,
    currency: Option<String>,
    quiet_hours_start: Option<u32>,
    quiet_hours_end: Option<u32>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<EngineConfig> {
    let raw: RawConfig = toml::from_str(content)?;
    let mut config = EngineConfig::default();

    if let Some(t) = raw.thresholds {
        let dst = &mut config.thresholds;
        if let Some(v) = t.budget_pressure_pct {
            dst.budget_pressure_pct = v;
        }
        if let Some(v) = t.sales_decline_pct {
            dst.sales_decline_pct = v;
        }
        if let Some(v) = t.sales_growth_pct {
            dst.sales_growth_pct = v;
        }
        if let Some(v) = t.trend_band_pct {
            dst.trend_band_pct = v;
        }
        if let Some(v) = t.payroll_due_days {
            dst.payroll_due_days = v;
        }
        if let Some(v) = t.cash_squeeze_payroll_days {
            dst.cash_squeeze_payroll_days = v;
        }
        if let Some(v) = t.upcoming_leave_window_days {
            dst.upcoming_leave_window_days = v;
        }
        if let Some(v) = t.capacity_leave_count {
            dst.capacity_leave_count = v;
        }
    }

    if let Some(days) = raw.insights.and_then(|i| i.retention_days) {
        if days < 0 {
            return Err(Error::Config("insights.retention_days must be >= 0".into()));
        }
        config.retention_days = days;
    }

    if let Some(f) = raw.forecast {
        if let Some(horizons) = f.horizons {
            if horizons.is_empty() || horizons.iter().any(|h| *h <= 0) {
                return Err(Error::Config(
                    "forecast.horizons must be a non-empty list of positive day counts".into(),
                ));
            }
            config.forecast.horizons = horizons;
        }
        for (name, value, slot) in [
            (
                "cash_flow_confidence",
                f.cash_flow_confidence,
                &mut config.forecast.cash_flow_confidence,
            ),
            (
                "budget_burn_confidence",
                f.budget_burn_confidence,
                &mut config.forecast.budget_burn_confidence,
            ),
            (
                "sales_confidence",
                f.sales_confidence,
                &mut config.forecast.sales_confidence,
            ),
            (
                "invoice_collection_weight",
                f.invoice_collection_weight,
                &mut config.forecast.invoice_collection_weight,
            ),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(Error::Config(format!("forecast.{} must be within 0..=1", name)));
                }
                *slot = v;
            }
        }
        if let Some(v) = f.seasonal_factor {
            config.forecast.seasonal_factor = v;
        }
    }

    if let Some(r) = raw.renderer {
        if let Some(secs) = r.timeout_secs {
            config.renderer_timeout = Duration::from_secs(secs);
        }
        if let Some(tokens) = r.max_tokens {
            config.renderer_max_tokens = tokens;
        }
    }

    if let Some(p) = raw.personalization {
        if let Some(tone) = p.tone {
            config.personalization.tone = tone.parse().map_err(Error::Config)?;
        }
        if let Some(currency) = p.currency {
            config.personalization.currency = currency.to_uppercase();
        }
        if let Some(h) = p.quiet_hours_start {
            config.personalization.quiet_hours_start = h % 24;
        }
        if let Some(h) = p.quiet_hours_end {
            config.personalization.quiet_hours_end = h % 24;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.forecast.horizons, vec![30, 60, 90]);
        assert_eq!(config.renderer_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [thresholds]
            budget_pressure_pct = 75.0

            [personalization]
            tone = "formal"
            currency = "eur"
            "#,
        )
        .unwrap();

        assert_eq!(config.thresholds.budget_pressure_pct, 75.0);
        assert_eq!(config.thresholds.payroll_due_days, 3);
        assert_eq!(config.personalization.tone, Tone::Formal);
        assert_eq!(config.personalization.currency, "EUR");
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EngineConfig::from_toml("[forecast]\nhorizons = []").is_err());
        assert!(EngineConfig::from_toml("[forecast]\nsales_confidence = 1.5").is_err());
        assert!(EngineConfig::from_toml("[personalization]\ntone = \"sarcastic\"").is_err());
        assert!(EngineConfig::from_toml("not toml [").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[insights]\nretention_days = 3").unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.retention_days, 3);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = EngineConfig::load_from(Path::new("/nonexistent/pulse/engine.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
