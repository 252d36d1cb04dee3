use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::collector::FeedConfig;
use crate::coordination::BreakerConfig;
use crate::safety::RetrainGateConfig;
use crate::strategy::{ConfirmationConfig, ModesConfig, PumpTierConfig, RouterConfig, TargetConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub filter: ConfirmationConfig,
    pub router: RouterConfig,
    pub modes: ModesConfig,
    pub targets: TargetConfig,
    pub pump_tiers: PumpTierConfig,
    pub breaker: BreakerConfig,
    pub retrain: RetrainGateConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
    /// Directory for the daily rolling log file; PUMPGATE_LOG_DIR wins
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,pumpgate=debug".to_string(),
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let config: AppConfig = Config::builder()
            // Built-in defaults, so files and env may override single keys
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PUMPGATE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // PUMPGATE__BREAKER__COOLDOWN_SECS, PUMPGATE__FEED__SYMBOLS=BTCUSDT,ETHUSDT, ...
            .add_source(
                Environment::with_prefix("PUMPGATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("feed.symbols")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config
            .validate()
            .map_err(|errors| ConfigError::Message(errors.join("; ")))?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.filter.buffer_capacity == 0 {
            errors.push("filter.buffer_capacity must be positive".to_string());
        }

        let t = &self.targets;
        if t.min_tp_pct <= 0.0 || t.min_tp_pct > t.max_tp_pct {
            errors.push("targets: need 0 < min_tp_pct <= max_tp_pct".to_string());
        }
        if t.min_sl_pct <= 0.0 || t.min_sl_pct > t.max_sl_pct {
            errors.push("targets: need 0 < min_sl_pct <= max_sl_pct".to_string());
        }
        if t.min_rr_ratio < 1.0 {
            errors.push("targets.min_rr_ratio must be at least 1.0".to_string());
        }
        if t.min_position_usd <= 0.0 || t.max_daily_exposure_usd < t.min_position_usd {
            errors.push("targets: daily exposure must cover the minimum position".to_string());
        }

        let b = &self.breaker;
        if b.max_consecutive_losses == 0 || b.max_daily_losses == 0 {
            errors.push("breaker loss limits must be positive".to_string());
        }
        if b.max_daily_loss_pct <= 0.0 {
            errors.push("breaker.max_daily_loss_pct must be positive".to_string());
        }
        if b.recovery_wins_required == 0 {
            errors.push("breaker.recovery_wins_required must be positive".to_string());
        }
        if b.half_open_max_trades > 0 && b.half_open_max_trades < b.recovery_wins_required {
            errors.push(
                "breaker.half_open_max_trades is lower than recovery_wins_required".to_string(),
            );
        }

        let r = &self.retrain;
        if !(0.0..=1.0).contains(&r.min_win_rate)
            || !(0.0..=1.0).contains(&r.max_win_rate)
            || r.min_win_rate > r.max_win_rate
        {
            errors.push("retrain win-rate band must satisfy 0 <= min <= max <= 1".to_string());
        }

        if self
            .pump_tiers
            .tiers
            .iter()
            .any(|t| t.min_delta_pct <= 0.0 || t.max_target_pct <= 0.0)
        {
            errors.push("pump tiers need positive min_delta_pct and max_target_pct".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("pumpgate-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_dir_yields_defaults() {
        let dir = std::env::temp_dir().join(format!("pumpgate-none-{}", uuid::Uuid::new_v4()));
        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.router.override_buys_per_sec, 500.0);
        assert_eq!(config.targets.max_daily_exposure_usd, 1_000.0);
        assert_eq!(config.modes.swing.timeout_sec, 14_400);
    }

    #[test]
    fn test_partial_file_overrides_single_keys() {
        let dir = temp_dir();
        std::fs::write(
            dir.join("default.toml"),
            "[modes.scalp]\ntarget_pct = 4.0\n\n[retrain]\nmin_samples = 250\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.modes.scalp.target_pct, 4.0);
        assert_eq!(config.modes.scalp.stop_pct, 1.5);
        assert_eq!(config.retrain.min_samples, 250);
        assert_eq!(config.retrain.max_win_rate, 0.75);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_band_rejected() {
        let mut config = AppConfig::default();
        config.retrain.min_win_rate = 0.9;
        config.breaker.recovery_wins_required = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
