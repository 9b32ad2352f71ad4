//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "TESTOPS";

/// Config file name
const CONFIG_FILE_NAME: &str = "testops.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "TESTOPS_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `explicit` path (must exist)
    /// 2. `TESTOPS_CONFIG` environment variable
    /// 3. `./testops.toml`
    /// 4. `$XDG_CONFIG_HOME/testops/testops.toml` (or `%APPDATA%` on Windows)
    /// 5. Built-in defaults
    ///
    /// Environment variables override file values in every case.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let config_path = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => return Err(ConfigError::NotFound(path.to_path_buf())),
            None => resolve_config_path(),
        };

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Defaults plus environment overrides, ignoring any config file.
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(config_dir) = get_config_dir() {
        let app_config = config_dir.join("testops").join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Read `TESTOPS_<key>` and parse it, if set.
fn env_value<T: FromStr>(key: &str, what: &str) -> ConfigResult<Option<T>> {
    let var = format!("{ENV_PREFIX}_{key}");
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, what)),
        Err(_) => Ok(None),
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern `TESTOPS_<SECTION>_<KEY>`, e.g.
/// `TESTOPS_DEVICE_PORT=/dev/ttyACM0` or `TESTOPS_MONITOR_PORT=/dev/ttyUSB0`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some(val) = env_value::<String>("DEVICE_PORT", "Invalid port")? {
        config.device.port = val;
    }
    if let Some(val) = env_value("DEVICE_BAUD_RATE", "Invalid baud rate")? {
        config.device.baud_rate = val;
    }
    if let Some(val) = env_value("DEVICE_LINE_TIMEOUT_MS", "Invalid timeout")? {
        config.device.line_timeout_ms = Some(val);
    }
    if let Some(val) = env_value("DEVICE_RUN_ATTEMPTS", "Invalid attempt count")? {
        config.device.run_attempts = val;
    }
    if let Some(val) = env_value("DEVICE_RETRY_DELAY_MS", "Invalid delay")? {
        config.device.retry_delay_ms = val;
    }

    if let Some(val) = env_value::<String>("MONITOR_PORT", "Invalid port")? {
        config.monitor.port = Some(val);
    }
    if let Some(val) = env_value("MONITOR_BAUD_RATE", "Invalid baud rate")? {
        config.monitor.baud_rate = val;
    }

    if let Some(val) = env_value::<PathBuf>("OUTPUT_DIR", "Invalid path")? {
        config.output.dir = val;
    }
    if let Some(val) = env_value::<String>("OUTPUT_WRITE_JSON", "Invalid flag")? {
        config.output.write_json = parse_bool(&val);
    }

    if let Some(val) = env_value::<String>("LOGGING_LEVEL", "Invalid level")? {
        config.logging.level = val;
    }
    if let Some(val) = env_value::<String>("LOGGING_FORMAT", "Invalid format")? {
        config.logging.format = match val.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{ENV_PREFIX}_LOGGING_FORMAT"),
                    "expected json, pretty or compact",
                ))
            }
        };
    }

    Ok(())
}

fn validate(config: &Config) -> ConfigResult<()> {
    if config.device.baud_rate == 0 {
        return Err(ConfigError::validation("device.baud_rate", "must be positive"));
    }
    if config.monitor.baud_rate == 0 {
        return Err(ConfigError::validation("monitor.baud_rate", "must be positive"));
    }
    if config.device.run_attempts == 0 {
        return Err(ConfigError::validation("device.run_attempts", "must be at least 1"));
    }
    if config.device.await_attempts == 0 {
        return Err(ConfigError::validation("device.await_attempts", "must be at least 1"));
    }
    Ok(())
}
