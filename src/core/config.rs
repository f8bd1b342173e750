use crate::core::source::DataSourceType;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<String>,
    pub backup_dir: Option<String>,
}

/// Knobs for vendor calls and fetch batches. Durations are in seconds.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: f64,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    pub request_throttle_seconds: f64,
    pub decimal_places: u32,
    pub max_workers: usize,
    pub us_max_workers: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_seconds: 30.0,
            max_retries: 5,
            retry_delay_seconds: 5.0,
            request_throttle_seconds: 1.0,
            decimal_places: 4,
            max_workers: 5,
            us_max_workers: 2,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        seconds(self.retry_delay_seconds)
    }

    pub fn request_throttle(&self) -> Duration {
        seconds(self.request_throttle_seconds)
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AkshareProviderConfig {
    pub eastmoney_url: String,
    pub tencent_url: String,
    pub fund_url: String,
    pub fund_estimate_url: String,
}

impl Default for AkshareProviderConfig {
    fn default() -> Self {
        AkshareProviderConfig {
            eastmoney_url: "https://push2his.eastmoney.com".to_string(),
            tencent_url: "https://web.ifzq.gtimg.cn".to_string(),
            fund_url: "https://api.fund.eastmoney.com".to_string(),
            fund_estimate_url: "https://fundgz.1234567.com.cn".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AlphaVantageProviderConfig {
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Takes precedence over the environment when set.
    pub api_key: Option<String>,
}

impl Default for AlphaVantageProviderConfig {
    fn default() -> Self {
        AlphaVantageProviderConfig {
            base_url: "https://www.alphavantage.co".to_string(),
            api_key_env: "ALPHA_VANTAGE_API_KEY".to_string(),
            api_key: None,
        }
    }
}

impl AlphaVantageProviderConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub akshare: AkshareProviderConfig,
    pub yahoo: YahooProviderConfig,
    pub alpha_vantage: AlphaVantageProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Default adapter for markets served by more than one vendor.
    pub data_source: DataSourceType,
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data_source: DataSourceType::Akshare,
            database: DatabaseConfig::default(),
            fetch: FetchConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "holdings", "holdings")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "holdings", "holdings")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::default_data_path()?.join("holdings.db")),
        }
    }

    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.database.backup_dir {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::default_data_path()?.join("backups")),
        }
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        // An empty document deserializes to unit, which the struct rejects.
        if config_str.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
data_source: yfinance
database:
  path: "/tmp/holdings.db"
fetch:
  max_retries: 3
  retry_delay_seconds: 0.5
  us_max_workers: 1
providers:
  yahoo:
    base_url: "http://example.com/yahoo"
  alpha_vantage:
    api_key: "demo"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.data_source, DataSourceType::Yfinance);
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/holdings.db")
        );
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.retry_delay(), Duration::from_millis(500));
        assert_eq!(config.fetch.us_max_workers, 1);
        // Untouched fields keep their defaults
        assert_eq!(config.fetch.max_workers, 5);
        assert_eq!(config.fetch.decimal_places, 4);
        assert_eq!(config.fetch.request_throttle(), Duration::from_secs(1));
        assert_eq!(config.providers.yahoo.base_url, "http://example.com/yahoo");
        assert_eq!(
            config.providers.akshare.eastmoney_url,
            "https://push2his.eastmoney.com"
        );
        assert_eq!(
            config.providers.alpha_vantage.resolve_api_key().as_deref(),
            Some("demo")
        );
    }

    #[test]
    fn test_unknown_data_source_is_rejected() {
        let result: Result<AppConfig, _> = serde_yaml::from_str("data_source: bloomberg");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_config_file_uses_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.data_source, DataSourceType::Akshare);
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        let fetch = FetchConfig {
            request_throttle_seconds: -1.0,
            ..FetchConfig::default()
        };
        assert_eq!(fetch.request_throttle(), Duration::ZERO);
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let config = AlphaVantageProviderConfig {
            api_key: Some("  ".to_string()),
            api_key_env: "HOLDINGS_TEST_UNSET_KEY".to_string(),
            ..AlphaVantageProviderConfig::default()
        };
        assert!(config.resolve_api_key().is_none());
    }
}
