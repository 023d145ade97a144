//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::application::SessionConfig;
use crate::application::services::{
    HistoryConfig, PlaybackConfig, ReplacementPolicy, VisibilityConfig,
};
use crate::domain::entities::SearchFilter;

use super::args::CliArgs;

pub(super) const APP_NAME: &str = "tdmedia";
pub(super) const APP_QUALIFIER: &str = "org";
pub(super) const APP_ORGANIZATION: &str = "tdmedia";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and CLI overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Viewport tracking.
    #[serde(default)]
    pub visibility: VisibilitySection,

    /// Media playback.
    #[serde(default)]
    pub playback: PlaybackSection,

    /// Media viewer history.
    #[serde(default)]
    pub history: HistorySection,

    /// File and blob cache.
    #[serde(default)]
    pub cache: CacheSection,
}

/// `[visibility]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilitySection {
    /// Margin around the viewport that still counts as visible, in px.
    #[serde(default)]
    pub padding: f64,

    /// Minimum spacing of recomputations while scrolling.
    #[serde(default = "default_debounce_ms")]
    pub scroll_throttle_ms: u64,

    /// Quiet time after scrolling before the final recomputation.
    #[serde(default = "default_debounce_ms")]
    pub scroll_debounce_ms: u64,

    /// Quiet time after a resize before recomputing.
    #[serde(default = "default_debounce_ms")]
    pub resize_debounce_ms: u64,

    /// Scroll jumps above this many px are skipped away from the edges.
    #[serde(default = "default_fast_scroll_threshold")]
    pub fast_scroll_threshold: f64,

    /// Distance from top or bottom that still counts as at the edge.
    #[serde(default = "default_edge_epsilon")]
    pub edge_epsilon: f64,
}

impl Default for VisibilitySection {
    fn default() -> Self {
        Self {
            padding: 0.0,
            scroll_throttle_ms: default_debounce_ms(),
            scroll_debounce_ms: default_debounce_ms(),
            resize_debounce_ms: default_debounce_ms(),
            fast_scroll_threshold: default_fast_scroll_threshold(),
            edge_epsilon: default_edge_epsilon(),
        }
    }
}

/// `[playback]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSection {
    /// Press duration before a hold preview starts.
    #[serde(default = "default_hold_delay_ms")]
    pub hold_delay_ms: u64,

    /// Loops a hover preview may finish after the pointer leaves.
    #[serde(default = "default_preview_loops")]
    pub preview_loops: u32,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            hold_delay_ms: default_hold_delay_ms(),
            preview_loops: default_preview_loops(),
        }
    }
}

/// `[history]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySection {
    /// Messages per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Neighbour chosen when the current item is deleted.
    #[serde(default)]
    pub replacement_policy: ReplacementPolicy,

    /// Maximum results of an in-chat search.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            replacement_policy: ReplacementPolicy::default(),
            search_limit: default_search_limit(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Unreferenced blobs kept before the oldest is revoked.
    #[serde(default = "default_parked_blobs")]
    pub parked_blobs: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            parked_blobs: default_parked_blobs(),
        }
    }
}

const fn default_debounce_ms() -> u64 {
    250
}

const fn default_fast_scroll_threshold() -> f64 {
    50.0
}

const fn default_edge_epsilon() -> f64 {
    1.0
}

const fn default_hold_delay_ms() -> u64 {
    500
}

const fn default_preview_loops() -> u32 {
    1
}

const fn default_page_size() -> u32 {
    20
}

const fn default_search_limit() -> u32 {
    crate::application::services::message_search::DEFAULT_SEARCH_LIMIT
}

const fn default_parked_blobs() -> usize {
    crate::application::services::file_cache::DEFAULT_PARKED_CAPACITY
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(page_size) = args.page_size {
            self.history.page_size = page_size;
        }
        if let Some(policy) = args.replacement_policy {
            self.history.replacement_policy = policy;
        }
        if let Some(threshold) = args.fast_scroll_threshold {
            self.visibility.fast_scroll_threshold = threshold;
        }
        if let Some(parked_blobs) = args.parked_blobs {
            self.cache.parked_blobs = parked_blobs;
        }
    }

    /// Builds the tunables for a new session.
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        let visibility = &self.visibility;
        SessionConfig {
            visibility: VisibilityConfig {
                padding: visibility.padding,
                scroll_throttle: Duration::from_millis(visibility.scroll_throttle_ms),
                scroll_debounce: Duration::from_millis(visibility.scroll_debounce_ms),
                resize_debounce: Duration::from_millis(visibility.resize_debounce_ms),
                fast_scroll_threshold: visibility.fast_scroll_threshold,
                edge_epsilon: visibility.edge_epsilon,
            },
            playback: PlaybackConfig {
                hold_delay: Duration::from_millis(self.playback.hold_delay_ms),
                preview_loops: self.playback.preview_loops,
            },
            history: HistoryConfig {
                page_size: self.history.page_size.max(1),
                filter: SearchFilter::PhotoAndVideo,
                replacement_policy: self.history.replacement_policy,
            },
            parked_blobs: self.cache.parked_blobs,
            search_limit: self.history.search_limit,
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("tdmedia.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            visibility: VisibilitySection::default(),
            playback: PlaybackSection::default(),
            history: HistorySection::default(),
            cache: CacheSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_partial_sections() {
        let toml_content = r#"
            log_level = "debug"

            [visibility]
            fast_scroll_threshold = 80.0

            [history]
            page_size = 10
            replacement_policy = "older_first"
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert!((config.visibility.fast_scroll_threshold - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.visibility.scroll_throttle_ms, 250);
        assert_eq!(config.history.page_size, 10);
        assert_eq!(config.history.replacement_policy, ReplacementPolicy::OlderFirst);
        assert_eq!(config.playback, PlaybackSection::default());
    }

    #[test]
    fn test_default_config_matches_session_defaults() {
        let session = AppConfig::default().to_session_config();
        assert_eq!(session, SessionConfig::default());
    }

    #[test]
    fn test_args_override_file_values() {
        let mut config = AppConfig::default();
        let args = CliArgs::parse_from([
            "tdmedia",
            "--fixture",
            "chat.json",
            "--page-size",
            "6",
            "--log-level",
            "trace",
        ]);

        config.merge_with_args(&args);
        assert_eq!(config.history.page_size, 6);
        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.to_session_config().history.page_size, 6);
    }
}
