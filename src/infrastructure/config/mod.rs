//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{
    AppConfig, CacheSection, HistorySection, LogLevel, PlaybackSection, VisibilitySection,
};
pub use args::{CliArgs, Walk};
pub use storage::{ConfigError, StorageManager};
