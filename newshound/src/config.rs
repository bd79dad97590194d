use bark::config::Config as BarkConfig;
use fetch::config::Config as FetchConfig;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoggingConfig {
    /// Filter directives such as `info` or `fetch=debug,info`. `RUST_LOG`
    /// takes precedence.
    pub level: Option<String>,
    pub sentry_dsn: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Debug)]
pub struct StoreConfig {
    /// Snapshot file of the alert and event store
    pub path: PathBuf,
}

impl StoreConfig {
    /// Where a reparse builds its replacement store.
    pub fn reparse_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".reparse");
        self.path.with_file_name(name)
    }
}

#[derive(Deserialize, Debug)]
pub struct PubSubConfig {
    /// Base url of the bark server receiving pushed notifications
    pub push_url: Url,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

impl PubSubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub store: Option<StoreConfig>,
    pub pubsub: Option<PubSubConfig>,
    pub fetch: Option<FetchConfig>,
    pub bark: Option<BarkConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(fetch) = &self.fetch {
            fetch.validate()?;
        }
        if let Some(bark) = &self.bark {
            bark.validate()?;
        }
        if self.pubsub.as_ref().is_some_and(|p| p.timeout_secs == 0) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn fetch(&self) -> Result<&FetchConfig, ConfigError> {
        self.fetch.as_ref().ok_or(ConfigError::MissingSection("fetch"))
    }

    pub fn store(&self) -> Result<&StoreConfig, ConfigError> {
        self.store.as_ref().ok_or(ConfigError::MissingSection("store"))
    }

    /// The bark section, or the defaults when there is none.
    pub fn bark(&self) -> BarkConfig {
        self.bark.clone().unwrap_or_default()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid fetch config: {0}")]
    FetchValidation(#[from] fetch::config::ValidationError),
    #[error("invalid bark config: {0}")]
    BarkValidation(#[from] bark::config::ValidationError),
    #[error("pubsub.timeout_secs cannot be 0")]
    ZeroTimeout,
    #[error("missing config section: {0}")]
    MissingSection(&'static str),
}
