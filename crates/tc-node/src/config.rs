//! Node configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tc_hash_chain::ChainConfig;
use thiserror::Error;

/// Rejected configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("{needs} is required when {because} is set")]
    Missing {
        needs: &'static str,
        because: &'static str,
    },
    #[error("{var}={value} needs a build with the `{feature}` feature")]
    Unsupported {
        var: &'static str,
        value: &'static str,
        feature: &'static str,
    },
}

/// Where the ledger lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Append-only log file (`ledger.db`).
    File,
    /// RocksDB directory (`ledger.rocksdb`).
    RocksDb,
}

impl std::str::FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "rocksdb" => Ok(StorageBackend::RocksDb),
            _ => Err(()),
        }
    }
}

/// External timestamp authority reached over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    pub name: String,
    pub url: String,
    pub api_key: String,
}

/// Configuration for the timestamp node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Directory holding the ledger and the process lock.
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    /// HTTP listen address.
    pub http_addr: SocketAddr,
    /// Period of the extension job (default: hourly).
    pub process_interval: Duration,
    /// Period of the publish job (default: daily).
    pub publish_interval: Duration,
    /// Authority name used for publication records.
    pub authority_name: String,
    /// Present when `TC_AUTHORITY_URL` is set. Publishing is disabled otherwise.
    pub authority: Option<AuthorityConfig>,
    /// Webhook receiving publication reports. Reports are logged otherwise.
    pub notify_webhook_url: Option<String>,
    /// Recipient passed along with each report.
    pub notify_to: Option<String>,
    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,
    /// Whether to emit JSON formatted logs.
    pub json_logs: bool,
    /// Capacity of the ingestion queue.
    pub queue_capacity: usize,
    /// Longest wait between retries of a fingerprint the store failed on.
    pub ingest_retry_max: Duration,
    pub store_timeout: Duration,
    pub authority_timeout: Duration,
    pub notify_timeout: Duration,
    /// Deadline for one HTTP request to the node.
    pub request_timeout: Duration,
    /// Start proofs one entry before the queried position.
    pub proof_includes_preceding: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage: if cfg!(feature = "rocksdb") {
                StorageBackend::RocksDb
            } else {
                StorageBackend::File
            },
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            process_interval: Duration::from_secs(3600),
            publish_interval: Duration::from_secs(86_400),
            authority_name: "OriginStamp".to_string(),
            authority: None,
            notify_webhook_url: None,
            notify_to: None,
            log_level: "info".to_string(),
            json_logs: false,
            queue_capacity: 1024,
            ingest_retry_max: Duration::from_secs(30),
            store_timeout: Duration::from_secs(5),
            authority_timeout: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            proof_includes_preceding: true,
        }
    }
}

impl NodeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TC_DATA_DIR`: Ledger directory (default: ./data)
    /// - `TC_STORAGE`: `file` or `rocksdb` (default: rocksdb when built with
    ///   the `rocksdb` feature, file otherwise)
    /// - `TC_HTTP_ADDR`: Listen address (default: 127.0.0.1:8080)
    /// - `TC_PROCESS_INTERVAL_SECS`: Extension period (default: 3600)
    /// - `TC_PUBLISH_INTERVAL_SECS`: Publish period (default: 86400)
    /// - `TC_AUTHORITY_NAME`: Authority name (default: OriginStamp)
    /// - `TC_AUTHORITY_URL`, `TC_AUTHORITY_API_KEY`: Authority endpoint and key
    /// - `TC_NOTIFY_WEBHOOK_URL`, `TC_NOTIFY_TO`: Report delivery
    /// - `TC_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `TC_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `TC_QUEUE_CAPACITY`: Ingestion queue size (default: 1024)
    /// - `TC_INGEST_RETRY_MAX_SECS`: Retry backoff cap (default: 30)
    /// - `TC_STORE_TIMEOUT_MS`, `TC_AUTHORITY_TIMEOUT_SECS`,
    ///   `TC_NOTIFY_TIMEOUT_SECS`, `TC_REQUEST_TIMEOUT_SECS`: Deadlines
    /// - `TC_PROOF_INCLUDES_PRECEDING`: Proof start convention (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup, then validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let authority_name = var("TC_AUTHORITY_NAME").unwrap_or(defaults.authority_name);
        let authority = match (var("TC_AUTHORITY_URL"), var("TC_AUTHORITY_API_KEY")) {
            (Some(url), Some(api_key)) => Some(AuthorityConfig {
                name: authority_name.clone(),
                url,
                api_key,
            }),
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    needs: "TC_AUTHORITY_API_KEY",
                    because: "TC_AUTHORITY_URL",
                })
            }
            (None, _) => None,
        };

        let config = Self {
            data_dir: var("TC_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            storage: parse(&var, "TC_STORAGE", "storage backend (file, rocksdb)")?
                .unwrap_or(defaults.storage),
            http_addr: parse(&var, "TC_HTTP_ADDR", "socket address")?
                .unwrap_or(defaults.http_addr),
            process_interval: secs(&var, "TC_PROCESS_INTERVAL_SECS")?
                .unwrap_or(defaults.process_interval),
            publish_interval: secs(&var, "TC_PUBLISH_INTERVAL_SECS")?
                .unwrap_or(defaults.publish_interval),
            authority_name,
            authority,
            notify_webhook_url: var("TC_NOTIFY_WEBHOOK_URL"),
            notify_to: var("TC_NOTIFY_TO"),
            log_level: var("TC_LOG_LEVEL")
                .or_else(|| var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            json_logs: var("TC_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
            queue_capacity: parse(&var, "TC_QUEUE_CAPACITY", "integer")?
                .unwrap_or(defaults.queue_capacity),
            ingest_retry_max: secs(&var, "TC_INGEST_RETRY_MAX_SECS")?
                .unwrap_or(defaults.ingest_retry_max),
            store_timeout: parse::<u64>(&var, "TC_STORE_TIMEOUT_MS", "integer")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            authority_timeout: secs(&var, "TC_AUTHORITY_TIMEOUT_SECS")?
                .unwrap_or(defaults.authority_timeout),
            notify_timeout: secs(&var, "TC_NOTIFY_TIMEOUT_SECS")?
                .unwrap_or(defaults.notify_timeout),
            request_timeout: secs(&var, "TC_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout),
            proof_includes_preceding: var("TC_PROOF_INCLUDES_PRECEDING")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.proof_includes_preceding),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("TC_PROCESS_INTERVAL_SECS", self.process_interval),
            ("TC_PUBLISH_INTERVAL_SECS", self.publish_interval),
            ("TC_STORE_TIMEOUT_MS", self.store_timeout),
            ("TC_AUTHORITY_TIMEOUT_SECS", self.authority_timeout),
            ("TC_NOTIFY_TIMEOUT_SECS", self.notify_timeout),
            ("TC_REQUEST_TIMEOUT_SECS", self.request_timeout),
            ("TC_INGEST_RETRY_MAX_SECS", self.ingest_retry_max),
        ];
        for (var, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::Zero { var });
            }
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero {
                var: "TC_QUEUE_CAPACITY",
            });
        }
        if self.storage == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::Unsupported {
                var: "TC_STORAGE",
                value: "rocksdb",
                feature: "rocksdb",
            });
        }
        if self.notify_to.is_some() && self.notify_webhook_url.is_none() {
            return Err(ConfigError::Missing {
                needs: "TC_NOTIFY_WEBHOOK_URL",
                because: "TC_NOTIFY_TO",
            });
        }
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig::default()
            .with_store_timeout(self.store_timeout)
            .with_authority_timeout(self.authority_timeout)
            .with_notifier_timeout(self.notify_timeout)
            .with_preceding_entry(self.proof_includes_preceding)
    }

    pub fn ledger_path(&self) -> PathBuf {
        match self.storage {
            StorageBackend::File => self.data_dir.join("ledger.db"),
            StorageBackend::RocksDb => self.data_dir.join("ledger.rocksdb"),
        }
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    var(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: name,
                expected,
                value,
            })
        })
        .transpose()
}

fn secs(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(var, name, "number of seconds")?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_match_original_schedule() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.process_interval, Duration::from_secs(3600));
        assert_eq!(config.publish_interval, Duration::from_secs(86_400));
        assert_eq!(config.authority_name, "OriginStamp");
        assert_eq!(config.storage == StorageBackend::RocksDb, cfg!(feature = "rocksdb"));
        assert_eq!(config.ingest_retry_max, Duration::from_secs(30));
        assert!(config.authority.is_none());
        assert!(config.chain_config().include_preceding_entry);
    }

    #[test]
    fn test_authority_requires_api_key() {
        assert_eq!(
            config_from(&[("TC_AUTHORITY_URL", "https://authority.test/stamp")]).unwrap_err(),
            ConfigError::Missing {
                needs: "TC_AUTHORITY_API_KEY",
                because: "TC_AUTHORITY_URL"
            }
        );

        let config = config_from(&[
            ("TC_AUTHORITY_URL", "https://authority.test/stamp"),
            ("TC_AUTHORITY_API_KEY", "secret"),
            ("TC_AUTHORITY_NAME", "Backup"),
        ])
        .unwrap();
        let authority = config.authority.unwrap();
        assert_eq!(authority.name, "Backup");
        assert_eq!(authority.api_key, "secret");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("TC_PROCESS_INTERVAL_SECS", "hourly")]),
            Err(ConfigError::Invalid { var: "TC_PROCESS_INTERVAL_SECS", .. })
        ));
        assert!(matches!(
            config_from(&[("TC_HTTP_ADDR", "localhost")]),
            Err(ConfigError::Invalid { var: "TC_HTTP_ADDR", .. })
        ));
        assert_eq!(
            config_from(&[("TC_QUEUE_CAPACITY", "0")]).unwrap_err(),
            ConfigError::Zero {
                var: "TC_QUEUE_CAPACITY"
            }
        );
        assert!(matches!(
            config_from(&[("TC_NOTIFY_TO", "ops@example.org")]),
            Err(ConfigError::Missing { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("TC_DATA_DIR", "/var/lib/tc"),
            ("TC_STORAGE", "file"),
            ("TC_STORE_TIMEOUT_MS", "250"),
            ("TC_PROOF_INCLUDES_PRECEDING", "false"),
            ("RUST_LOG", "debug"),
            ("TC_JSON_LOGS", "1"),
        ])
        .unwrap();
        assert_eq!(config.ledger_path(), PathBuf::from("/var/lib/tc/ledger.db"));
        assert_eq!(config.chain_config().store_timeout, Duration::from_millis(250));
        assert!(!config.chain_config().include_preceding_entry);
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs);
    }

    #[test]
    fn test_storage_backend_selection() {
        assert!(matches!(
            config_from(&[("TC_STORAGE", "sqlite")]),
            Err(ConfigError::Invalid { var: "TC_STORAGE", .. })
        ));
        assert_eq!(
            config_from(&[("TC_INGEST_RETRY_MAX_SECS", "0")]).unwrap_err(),
            ConfigError::Zero {
                var: "TC_INGEST_RETRY_MAX_SECS"
            }
        );

        let rocks = config_from(&[("TC_STORAGE", "RocksDB"), ("TC_DATA_DIR", "/var/lib/tc")]);
        if cfg!(feature = "rocksdb") {
            assert_eq!(
                rocks.unwrap().ledger_path(),
                PathBuf::from("/var/lib/tc/ledger.rocksdb")
            );
        } else {
            assert_eq!(
                rocks.unwrap_err(),
                ConfigError::Unsupported {
                    var: "TC_STORAGE",
                    value: "rocksdb",
                    feature: "rocksdb"
                }
            );
        }
    }
}
