use crate::error::SweepError;
use crate::instrument::RangeMode;
use crate::sweep::{PollOptions, SweepConfig};
use crate::transport::Terminator;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub laser: InstrumentConfig,
    pub meter: InstrumentConfig,
    pub sweep: SweepDefaults,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InstrumentConfig {
    pub host: String,
    pub port: u16,
    /// One of "cr", "lf", "crlf".
    pub terminator: String,
}

impl InstrumentConfig {
    pub fn terminator(&self) -> Result<Terminator, SweepError> {
        match self.terminator.as_str() {
            "cr" => Ok(Terminator::Cr),
            "lf" => Ok(Terminator::Lf),
            "crlf" => Ok(Terminator::CrLf),
            other => Err(SweepError::Config(format!(
                "unknown terminator {other:?}, expected cr, lf or crlf"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SweepDefaults {
    pub start_nm: f64,
    pub stop_nm: f64,
    pub step_nm: f64,
    pub speed_nm_per_s: f64,
    pub power_dbm: f64,
    /// Auto dynamic range (MPM-215 modules); manual level 1 otherwise.
    pub auto_range: bool,
    pub module: u8,
    pub channel: u8,
}

impl SweepDefaults {
    pub fn to_sweep_config(&self) -> SweepConfig {
        SweepConfig {
            start_nm: self.start_nm,
            stop_nm: self.stop_nm,
            step_nm: self.step_nm,
            speed_nm_per_s: self.speed_nm_per_s,
            power_dbm: self.power_dbm,
            range: if self.auto_range {
                RangeMode::Auto
            } else {
                RangeMode::Manual { level: 1 }
            },
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PollingConfig {
    pub output_ready_interval_ms: u64,
    pub output_ready_attempts: u32,
    pub mode_confirm_interval_ms: u64,
    pub mode_confirm_attempts: u32,
    pub sweep_start_interval_ms: u64,
    pub sweep_start_attempts: u32,
    pub status_interval_ms: u64,
    pub status_attempts: u32,
}

impl PollingConfig {
    pub fn to_poll_options(&self) -> PollOptions {
        PollOptions {
            output_ready_interval: Duration::from_millis(self.output_ready_interval_ms),
            output_ready_attempts: self.output_ready_attempts,
            mode_confirm_interval: Duration::from_millis(self.mode_confirm_interval_ms),
            mode_confirm_attempts: self.mode_confirm_attempts,
            sweep_start_interval: Duration::from_millis(self.sweep_start_interval_ms),
            sweep_start_attempts: self.sweep_start_attempts,
            status_interval: Duration::from_millis(self.status_interval_ms),
            status_attempts: self.status_attempts,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    pub output_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            laser: InstrumentConfig {
                host: "192.168.1.160".to_string(),
                port: 5000,
                terminator: "crlf".to_string(),
            },
            meter: InstrumentConfig {
                host: "192.168.1.161".to_string(),
                port: 5000,
                terminator: "cr".to_string(),
            },
            sweep: SweepDefaults::default(),
            polling: PollingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SweepDefaults {
    fn default() -> Self {
        Self {
            start_nm: 1500.0,
            stop_nm: 1600.0,
            step_nm: 0.1,
            speed_nm_per_s: 50.0,
            power_dbm: 0.0,
            auto_range: false,
            module: 0,
            channel: 1,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        let poll = PollOptions::default();
        Self {
            output_ready_interval_ms: poll.output_ready_interval.as_millis() as u64,
            output_ready_attempts: poll.output_ready_attempts,
            mode_confirm_interval_ms: poll.mode_confirm_interval.as_millis() as u64,
            mode_confirm_attempts: poll.mode_confirm_attempts,
            sweep_start_interval_ms: poll.sweep_start_interval.as_millis() as u64,
            sweep_start_attempts: poll.sweep_start_attempts,
            status_interval_ms: poll.status_interval.as_millis() as u64,
            status_attempts: poll.status_attempts,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            output_dir: "./sweeps".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else if Path::new("sweep.toml").exists() {
        builder = builder.add_source(File::with_name("sweep.toml"));
    }

    // Add environment variable overrides with prefix "SME_SWEEP_"
    builder = builder.add_source(
        Environment::with_prefix("SME_SWEEP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<AppConfig>()
}

/// Load configuration with better error handling and defaults
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_sweep_config() {
        let config = AppConfig::default();
        assert!(config.sweep.to_sweep_config().validate().is_ok());
        assert_eq!(config.meter.terminator().unwrap(), Terminator::Cr);
    }

    #[test]
    fn unknown_terminator_is_rejected() {
        let instrument = InstrumentConfig {
            host: "10.0.0.2".to_string(),
            port: 5000,
            terminator: "null".to_string(),
        };
        assert!(matches!(
            instrument.terminator(),
            Err(SweepError::Config(_))
        ));
    }

    #[test]
    fn polling_config_converts_to_poll_options() {
        let polling = PollingConfig {
            status_interval_ms: 150,
            status_attempts: 7,
            ..PollingConfig::default()
        };
        let options = polling.to_poll_options();
        assert_eq!(options.status_interval, Duration::from_millis(150));
        assert_eq!(options.status_attempts, 7);
    }
}
