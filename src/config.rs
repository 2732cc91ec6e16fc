use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{
    CYREST_PORT, FORCE_LAYOUT_THRESHOLD, HEARTBEAT_INTERVAL, JOB_POLL_INTERVAL, MAX_NETWORK_SIZE,
};
use crate::error::SearchError;

pub const CONFIG_FILE_NAME: &str = "gns.json";
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://search.ndexbio.org/integratedsearch/v1";
pub const DEFAULT_GENE_ANNOTATION_URL: &str = "https://mygene.info/v3";
pub const DEFAULT_NDEX_BASE_URL: &str = "https://www.ndexbio.org";
pub const DEFAULT_SPECIES: &str = "human";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub search_base_url: Option<String>,
    #[serde(default)]
    pub gene_annotation_url: Option<String>,
    #[serde(default)]
    pub ndex_base_url: Option<String>,
    #[serde(default)]
    pub cyrest_port: Option<u16>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub job_poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_network_size: Option<usize>,
    #[serde(default)]
    pub force_layout_threshold: Option<usize>,
    #[serde(default)]
    pub max_job_polls: Option<u32>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub search_base_url: String,
    pub gene_annotation_url: String,
    pub ndex_base_url: String,
    pub cyrest_port: u16,
    pub species: String,
    pub job_poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub max_network_size: usize,
    pub force_layout_threshold: usize,
    pub max_job_polls: Option<u32>,
    pub request_timeout: Option<Duration>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            search_base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
            gene_annotation_url: DEFAULT_GENE_ANNOTATION_URL.to_string(),
            ndex_base_url: DEFAULT_NDEX_BASE_URL.to_string(),
            cyrest_port: CYREST_PORT,
            species: DEFAULT_SPECIES.to_string(),
            job_poll_interval: JOB_POLL_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            max_network_size: MAX_NETWORK_SIZE,
            force_layout_threshold: FORCE_LAYOUT_THRESHOLD,
            max_job_polls: None,
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config from `path`, else `gns.json` in the working directory,
    /// else the per-user config directory. Falls back to defaults when no file
    /// exists; an explicit `path` must exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SearchError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SearchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SearchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SearchError> {
        let defaults = ResolvedConfig::default();

        let job_poll_interval = config
            .job_poll_interval_ms
            .map(|ms| non_zero_millis("job_poll_interval_ms", ms))
            .transpose()?
            .unwrap_or(defaults.job_poll_interval);
        let heartbeat_interval = config
            .heartbeat_interval_ms
            .map(|ms| non_zero_millis("heartbeat_interval_ms", ms))
            .transpose()?
            .unwrap_or(defaults.heartbeat_interval);

        if config.max_job_polls == Some(0) {
            return Err(SearchError::ConfigInvalid(
                "max_job_polls must be at least 1".to_string(),
            ));
        }

        let request_timeout = match config.request_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.request_timeout,
        };

        Ok(ResolvedConfig {
            search_base_url: non_empty_url(
                "search_base_url",
                config.search_base_url,
                defaults.search_base_url,
            )?,
            gene_annotation_url: non_empty_url(
                "gene_annotation_url",
                config.gene_annotation_url,
                defaults.gene_annotation_url,
            )?,
            ndex_base_url: non_empty_url(
                "ndex_base_url",
                config.ndex_base_url,
                defaults.ndex_base_url,
            )?,
            cyrest_port: config.cyrest_port.unwrap_or(defaults.cyrest_port),
            species: config.species.unwrap_or(defaults.species),
            job_poll_interval,
            heartbeat_interval,
            max_network_size: config.max_network_size.unwrap_or(defaults.max_network_size),
            force_layout_threshold: config
                .force_layout_threshold
                .unwrap_or(defaults.force_layout_threshold),
            max_job_polls: config.max_job_polls,
            request_timeout,
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("org", "ndexbio", "gene-network-search")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}

fn non_zero_millis(field: &str, ms: u64) -> Result<Duration, SearchError> {
    if ms == 0 {
        return Err(SearchError::ConfigInvalid(format!("{field} must be positive")));
    }
    Ok(Duration::from_millis(ms))
}

fn non_empty_url(
    field: &str,
    value: Option<String>,
    default: String,
) -> Result<String, SearchError> {
    match value {
        Some(url) if url.trim().is_empty() => {
            Err(SearchError::ConfigInvalid(format!("{field} must not be empty")))
        }
        Some(url) => Ok(url.trim().trim_end_matches('/').to_string()),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.job_poll_interval, Duration::from_millis(500));
        assert_eq!(resolved.heartbeat_interval, Duration::from_millis(5000));
        assert_eq!(resolved.max_network_size, 5000);
        assert_eq!(resolved.force_layout_threshold, 500);
        assert_eq!(resolved.cyrest_port, 1234);
        assert_eq!(resolved.max_job_polls, None);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config {
            job_poll_interval_ms: Some(0),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(SearchError::ConfigInvalid(_))
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = Config {
            search_base_url: Some("http://localhost:8080/v1/".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.search_base_url, "http://localhost:8080/v1");
    }
}
