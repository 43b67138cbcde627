use crate::gateway::{RateLimiter, RetryPolicy};
use crate::model::{Mapping, MappingSnapshot};
use crate::orchestrator::OrchestratorConfig;
use crate::resolver::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const APP_NAME: &str = "playbridge";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Name of the environment variable holding the Spotify access token
    pub spotify_token_env: String,

    /// Path to the Google OAuth2 client secret JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth2_json: Option<String>,

    pub sync: SyncSettings,

    /// Throttling and retries against Spotify
    pub source_limits: CatalogLimits,

    /// Throttling and retries against YouTube
    pub target_limits: CatalogLimits,

    /// Source playlist -> target playlist, processed in this order
    pub mappings: Vec<MappingEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Spotify playlist ID
    pub source_id: String,

    /// YouTube playlist ID
    pub target_id: String,

    /// Optional label shown in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub max_parallel_mappings: usize,
    pub max_parallel_searches: usize,
    pub search_limit: usize,

    /// Minimum score (exclusive) for a search result to be accepted
    pub match_threshold: f64,
    pub duration_tolerance_secs: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CatalogLimits {
    pub requests_per_second: f64,
    pub burst: u32,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spotify_token_env: "PLAYBRIDGE_SPOTIFY_TOKEN".to_string(),
            oauth2_json: None,
            sync: SyncSettings::default(),
            source_limits: CatalogLimits::default(),
            target_limits: CatalogLimits {
                requests_per_second: 2.0,
                burst: 2,
                ..CatalogLimits::default()
            },
            mappings: Vec::new(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        let resolver = ResolverConfig::default();
        let orchestrator = OrchestratorConfig::default();
        Self {
            max_parallel_mappings: orchestrator.max_parallel_mappings,
            max_parallel_searches: orchestrator.max_parallel_searches,
            search_limit: resolver.search_limit,
            match_threshold: resolver.threshold,
            duration_tolerance_secs: resolver.duration_tolerance_secs,
        }
    }
}

impl Default for CatalogLimits {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            requests_per_second: 5.0,
            burst: 5,
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl Config {
    /// Read the configuration from the file
    pub fn read() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, None)
    }

    /// The mappings as one immutable snapshot for a run.
    pub fn snapshot(&self) -> MappingSnapshot {
        MappingSnapshot::new(
            self.mappings
                .iter()
                .map(|m| Mapping::new(m.source_id.clone(), m.target_id.clone()))
                .collect(),
        )
    }

    /// Display label for a source playlist, if one is configured.
    pub fn label_for(&self, source_id: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.source_id == source_id)
            .and_then(|m| m.name.as_deref())
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            threshold: self.sync.match_threshold,
            duration_tolerance_secs: self.sync.duration_tolerance_secs,
            search_limit: self.sync.search_limit.max(1),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_parallel_mappings: self.sync.max_parallel_mappings.max(1),
            max_parallel_searches: self.sync.max_parallel_searches.max(1),
        }
    }
}

impl CatalogLimits {
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.requests_per_second, self.burst)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}
