use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Sender allow-list is empty")]
    EmptySenders,

    #[error("min_occur_percentage must be within (0, 1], got {0}")]
    InvalidOccurPercentage(f64),

    #[error("{0} cannot be 0")]
    Zero(&'static str),

    #[error("{field} cannot exceed {max} seconds")]
    TooLong { field: &'static str, max: u64 },
}

/// Upper bound for clustering and batching windows.
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 3600;

fn check_window(field: &'static str, secs: u64) -> Result<(), ValidationError> {
    if secs == 0 {
        return Err(ValidationError::Zero(field));
    }
    if secs > MAX_WINDOW_SECS {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_WINDOW_SECS,
        });
    }
    Ok(())
}

/// Fetch configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Where raw mail is read from
    pub mailbox: MailboxConfig,
    /// Phrase extraction service
    pub extractor: ExtractorConfig,
    /// Outlets whose alerts are ingested. Matched case-insensitively.
    pub senders: Vec<String>,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    /// Number of parser workers. Defaults to the number of logical CPUs.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Pause between two fetch runs
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
}

fn default_fetch_interval_secs() -> u64 {
    30
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.senders.iter().all(|s| s.trim().is_empty()) {
            return Err(ValidationError::EmptySenders);
        }
        if self.workers == Some(0) {
            return Err(ValidationError::Zero("workers"));
        }
        if self.extractor.timeout_secs == 0 {
            return Err(ValidationError::Zero("extractor.timeout_secs"));
        }
        self.clustering.validate()?;
        self.batching.validate()?;
        Ok(())
    }

    pub fn allow_list(&self) -> SenderAllowList {
        SenderAllowList::new(&self.senders)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MailboxConfig {
    /// JSON-lines spool file holding one raw message per line
    pub spool_path: PathBuf,
    /// The mailbox's own address. Scrubbed from stored bodies.
    pub address: String,
    /// Move the spool aside once it has been read
    #[serde(default)]
    pub mark_read: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExtractorConfig {
    pub url: Url,
    #[serde(default = "default_extractor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_extractor_timeout_secs() -> u64 {
    5
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Thresholds of the event clustering algorithm
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Alerts within this many seconds of each other are clustering candidates
    pub event_timeframe_secs: u64,
    /// Share of candidates a phrase must appear in to survive
    pub min_occur_percentage: f64,
    pub min_senders: usize,
    pub min_alerts: usize,
    pub min_like_phrases: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            event_timeframe_secs: 3600,
            min_occur_percentage: 0.4,
            min_senders: 2,
            min_alerts: 3,
            min_like_phrases: 2,
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_window("clustering.event_timeframe_secs", self.event_timeframe_secs)?;
        if !(self.min_occur_percentage > 0.0 && self.min_occur_percentage <= 1.0) {
            return Err(ValidationError::InvalidOccurPercentage(
                self.min_occur_percentage,
            ));
        }
        if self.min_alerts == 0 {
            return Err(ValidationError::Zero("clustering.min_alerts"));
        }
        if self.min_senders == 0 {
            return Err(ValidationError::Zero("clustering.min_senders"));
        }
        if self.min_like_phrases == 0 {
            return Err(ValidationError::Zero("clustering.min_like_phrases"));
        }
        Ok(())
    }

    pub fn event_timeframe(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.event_timeframe_secs as i64)
    }

    /// The number of occurrences a phrase must exceed to be kept.
    pub fn min_occurrences(&self, candidates: usize) -> usize {
        let min = (candidates as f64 * self.min_occur_percentage).ceil() as usize;
        min.max(2)
    }
}

/// Controls how often stored alerts trigger event refreshes
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchingConfig {
    /// Width of a timeframe bucket
    pub bucket_secs: u64,
    /// Buckets are flushed once more than this many are pending
    pub max_pending_buckets: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        BatchingConfig {
            bucket_secs: 600,
            max_pending_buckets: 5,
        }
    }
}

impl BatchingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_window("batching.bucket_secs", self.bucket_secs)
    }
}

/// Case-insensitive set of outlets whose alerts are accepted.
#[derive(Clone, Debug, Default)]
pub struct SenderAllowList {
    senders: HashSet<String>,
}

impl SenderAllowList {
    pub fn new<S: AsRef<str>>(senders: &[S]) -> Self {
        SenderAllowList {
            senders: senders
                .iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, sender: &str) -> bool {
        self.senders.contains(&sender.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
mailbox:
    spool_path: /var/spool/newshound/alerts.jsonl
    address: alerts@example.com
    mark_read: true
extractor:
    url: "http://127.0.0.1:1029/"
senders:
    - CNN
    - NYTimes.com
    - The Washington Post
clustering:
    event_timeframe_secs: 7200
    min_occur_percentage: 0.5
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = serde_yaml::from_str(YAML).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.extractor.timeout_secs, 5);
        assert_eq!(config.clustering.event_timeframe_secs, 7200);
        assert_eq!(config.clustering.min_occur_percentage, 0.5);
        // unspecified thresholds keep their defaults
        assert_eq!(config.clustering.min_like_phrases, 2);
        assert_eq!(config.clustering.min_alerts, 3);
        assert_eq!(config.batching, BatchingConfig::default());
        assert_eq!(config.fetch_interval(), Duration::from_secs(30));
        assert!(config.mailbox.mark_read);
    }

    #[test]
    fn test_validation_errors() {
        let base: Config = serde_yaml::from_str(YAML).unwrap();

        let mut config = base.clone();
        config.senders = vec![" ".into()];
        assert_eq!(config.validate(), Err(ValidationError::EmptySenders));

        let mut config = base.clone();
        config.clustering.min_occur_percentage = 1.5;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidOccurPercentage(1.5))
        );

        let mut config = base.clone();
        config.workers = Some(0);
        assert_eq!(config.validate(), Err(ValidationError::Zero("workers")));

        let mut config = base.clone();
        config.batching.bucket_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::Zero("batching.bucket_secs"))
        );

        let mut config = base.clone();
        config.clustering.min_like_phrases = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::Zero("clustering.min_like_phrases"))
        );

        let mut config = base.clone();
        config.clustering.event_timeframe_secs = u64::MAX;
        assert_eq!(
            config.validate(),
            Err(ValidationError::TooLong {
                field: "clustering.event_timeframe_secs",
                max: MAX_WINDOW_SECS,
            })
        );

        let mut config = base;
        config.batching.bucket_secs = MAX_WINDOW_SECS + 1;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::TooLong {
                field: "batching.bucket_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_extractor_url() {
        let yaml = YAML.replace("http://127.0.0.1:1029/", "not a url");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn test_min_occurrences() {
        let config = ClusteringConfig::default();
        assert_eq!(config.min_occurrences(0), 2);
        assert_eq!(config.min_occurrences(4), 2);
        // ceil(6 * 0.4) = 3
        assert_eq!(config.min_occurrences(6), 3);
        assert_eq!(config.min_occurrences(10), 4);
    }

    #[test]
    fn test_allow_list() {
        let list = SenderAllowList::new(&["CNN", "The Washington Post"]);
        assert!(list.allows("cnn"));
        assert!(list.allows("the washington post"));
        assert!(!list.allows("Reuters"));
    }
}
