// TOML config adapter - Application configuration from file, environment and CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapters::fs_storage::{AppSpecificStorage, CacheStorage, SaveLocation, SharedStorage};
use crate::app::CompressorOptions;
use crate::domain::rules::MIN_SOURCE_BITRATE;
use crate::engine::PumpConfig;
use crate::error::{VidpressError, VidpressResult};
use crate::ports::{SeekMode, StorageDestination};
use crate::probe::{FALLBACK_HEIGHT, FALLBACK_WIDTH};

/// File picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "vidpress.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "VIDPRESS_";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub compressor: CompressorSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

/// `[compressor]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressorSection {
    /// Defaults to the number of CPUs
    pub max_concurrent_jobs: Option<usize>,
    pub poll_timeout_us: u64,
    pub frame_timeout_ms: u64,
    pub min_source_bitrate: u64,
    pub fallback_width: f64,
    pub fallback_height: f64,
    pub default_frame_rate: u32,
    pub default_i_frame_interval: u32,
    pub audio_buffer_size: usize,
    /// previous_sync, next_sync or closest_sync
    pub seek_mode: SeekMode,
}

impl Default for CompressorSection {
    fn default() -> Self {
        let pump = PumpConfig::default();
        Self {
            max_concurrent_jobs: None,
            poll_timeout_us: pump.poll_timeout.as_micros() as u64,
            frame_timeout_ms: pump.frame_timeout.as_millis() as u64,
            min_source_bitrate: MIN_SOURCE_BITRATE,
            fallback_width: FALLBACK_WIDTH,
            fallback_height: FALLBACK_HEIGHT,
            default_frame_rate: pump.default_frame_rate,
            default_i_frame_interval: pump.default_i_frame_interval,
            audio_buffer_size: pump.audio_buffer_size,
            seek_mode: pump.seek_mode,
        }
    }
}

impl CompressorSection {
    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            poll_timeout: Duration::from_micros(self.poll_timeout_us),
            frame_timeout: Duration::from_millis(self.frame_timeout_ms),
            default_frame_rate: self.default_frame_rate,
            default_i_frame_interval: self.default_i_frame_interval,
            audio_buffer_size: self.audio_buffer_size,
            seek_mode: self.seek_mode,
        }
    }

    pub fn options(&self) -> CompressorOptions {
        CompressorOptions {
            max_concurrent_jobs: self.max_concurrent_jobs.unwrap_or_else(num_cpus::get).max(1),
            min_source_bitrate: self.min_source_bitrate,
            fallback_width: self.fallback_width,
            fallback_height: self.fallback_height,
            pump: self.pump_config(),
        }
    }
}

/// Storage destination flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    #[default]
    AppSpecific,
    Shared,
    Cache,
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub kind: StorageKind,
    /// App-specific root, or shared collections root
    pub base_dir: PathBuf,
    pub sub_folder: Option<String>,
    /// Shared collection to publish into
    pub location: SaveLocation,
    /// Private directory for working files and copied sources
    pub working_dir: Option<PathBuf>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            base_dir: PathBuf::from("compressed"),
            sub_folder: None,
            location: SaveLocation::default(),
            working_dir: None,
        }
    }
}

impl StorageSection {
    /// Working directory, defaulting to a `vidpress` folder in the system temp dir
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("vidpress"))
    }

    pub fn destination(&self) -> Arc<dyn StorageDestination> {
        match self.kind {
            StorageKind::AppSpecific => Arc::new(AppSpecificStorage::new(&self.base_dir, self.sub_folder.clone())),
            StorageKind::Shared => Arc::new(SharedStorage::new(
                &self.base_dir,
                self.working_dir(),
                self.location,
                self.sub_folder.clone(),
            )),
            StorageKind::Cache => Arc::new(CacheStorage::new(self.working_dir.clone())),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Command-line values that take precedence over everything else
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub json_logs: bool,
    pub max_concurrent_jobs: Option<usize>,
}

impl AppConfig {
    /// Load with precedence CLI > environment > file > defaults.
    ///
    /// An explicit `path` must exist; otherwise [`DEFAULT_CONFIG_FILE`] is read
    /// when present.
    pub fn load(path: Option<&Path>, cli: &CliOverrides) -> VidpressResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> VidpressResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidpressError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> VidpressResult<Self> {
        toml::from_str(content).map_err(|e| VidpressError::config(format!("Failed to parse TOML config: {}", e)))
    }

    pub fn to_toml_string(&self) -> VidpressResult<String> {
        toml::to_string_pretty(self).map_err(|e| VidpressError::config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply `VIDPRESS_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> VidpressResult<()> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = var("JSON_LOGS") {
            self.logging.json = parse_env("JSON_LOGS", &json)?;
        }
        if let Some(jobs) = var("MAX_CONCURRENT_JOBS") {
            self.compressor.max_concurrent_jobs = Some(parse_env("MAX_CONCURRENT_JOBS", &jobs)?);
        }
        if let Some(bitrate) = var("MIN_SOURCE_BITRATE") {
            self.compressor.min_source_bitrate = parse_env("MIN_SOURCE_BITRATE", &bitrate)?;
        }
        if let Some(dir) = var("STORAGE_DIR") {
            self.storage.base_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("WORKING_DIR") {
            self.storage.working_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if cli.json_logs {
            self.logging.json = true;
        }
        if let Some(jobs) = cli.max_concurrent_jobs {
            self.compressor.max_concurrent_jobs = Some(jobs);
        }
    }

    pub fn validate(&self) -> VidpressResult<()> {
        if self.compressor.max_concurrent_jobs == Some(0) {
            return Err(VidpressError::config("max_concurrent_jobs must be at least 1"));
        }
        if self.compressor.poll_timeout_us == 0 || self.compressor.frame_timeout_ms == 0 {
            return Err(VidpressError::config("codec timeouts must be positive"));
        }
        if !(self.compressor.fallback_width > 0.0 && self.compressor.fallback_height > 0.0) {
            return Err(VidpressError::config("fallback dimensions must be positive"));
        }
        if self.compressor.default_frame_rate == 0 {
            return Err(VidpressError::config("default_frame_rate must be positive"));
        }
        debug!(?self, "Configuration validated");
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> VidpressResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| VidpressError::config(format!("Invalid {}{}={:?}: {}", ENV_PREFIX, name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_pump_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.compressor.pump_config(), PumpConfig::default());
        assert_eq!(config.compressor.poll_timeout_us, 100);
        assert_eq!(config.compressor.frame_timeout_ms, 2500);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [compressor]
            max_concurrent_jobs = 2
            min_source_bitrate = 1000000

            [storage]
            kind = "shared"
            location = "downloads"
            sub_folder = "clips"
            "#,
        )
        .unwrap();

        assert_eq!(config.compressor.options().max_concurrent_jobs, 2);
        assert_eq!(config.compressor.min_source_bitrate, 1_000_000);
        assert_eq!(config.compressor.audio_buffer_size, 65536);
        assert_eq!(config.storage.kind, StorageKind::Shared);
        assert_eq!(config.storage.location, SaveLocation::Downloads);
        assert_eq!(config.logging, LoggingSection::default());
    }

    #[test]
    fn test_seek_mode_reaches_pump_config() {
        assert_eq!(CompressorSection::default().pump_config().seek_mode, SeekMode::NextSync);

        let config = AppConfig::from_toml_str("[compressor]\nseek_mode = \"previous_sync\"\n").unwrap();
        assert_eq!(config.compressor.pump_config().seek_mode, SeekMode::PreviousSync);
        assert!(AppConfig::from_toml_str("[compressor]\nseek_mode = \"nearest\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(AppConfig::from_toml_str("[compressor]\nthreads = 4\n").is_err());
    }

    #[test]
    fn test_cli_beats_env_beats_file() {
        let mut config = AppConfig::from_toml_str("[logging]\nlevel = \"warn\"\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("VIDPRESS_LOG_LEVEL", "debug"),
            ("VIDPRESS_MAX_CONCURRENT_JOBS", "3"),
        ]
        .into_iter()
        .collect();

        config.apply_env(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.compressor.max_concurrent_jobs, Some(3));

        config.apply_cli(&CliOverrides {
            log_level: Some("trace".to_string()),
            json_logs: true,
            max_concurrent_jobs: None,
        });
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json);
        assert_eq!(config.compressor.max_concurrent_jobs, Some(3));
    }

    #[test]
    fn test_bad_env_value_is_a_config_error() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|key| (key == "VIDPRESS_JSON_LOGS").then(|| "sometimes".to_string()));
        assert!(matches!(result, Err(VidpressError::Config { .. })));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let mut config = AppConfig::default();
        config.compressor.max_concurrent_jobs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vidpress.toml");
        let mut config = AppConfig::default();
        config.storage.kind = StorageKind::Cache;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(AppConfig::from_file(&path).unwrap(), config);
        assert!(AppConfig::load(Some(&dir.path().join("missing.toml")), &CliOverrides::default()).is_err());
    }
}
