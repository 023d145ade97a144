use super::app_config::LogLevel;
use crate::application::services::ReplacementPolicy;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Direction the replay walks the media viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Walk {
    /// Toward newer messages.
    Newer,
    /// Toward older messages.
    #[default]
    Older,
}

#[derive(Debug, Parser)]
#[command(
    name = "tdmedia",
    version,
    about = "Replays a chat fixture through the media viewer pipeline",
    long_about = None
)]
pub struct CliArgs {
    /// JSON fixture with chats, messages and files.
    #[arg(short, long, value_name = "PATH")]
    pub fixture: PathBuf,

    /// Chat to open; defaults to the fixture's first chat.
    #[arg(long)]
    pub chat: Option<i64>,

    /// Message to open the viewer on; defaults to the newest media message.
    #[arg(long)]
    pub anchor: Option<i64>,

    /// Navigation steps to take after opening.
    #[arg(long, default_value_t = 10)]
    pub steps: usize,

    /// Navigation direction.
    #[arg(long, value_enum, default_value_t = Walk::Older)]
    pub walk: Walk,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Messages per history page.
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Neighbour chosen when the current item is deleted.
    #[arg(long, value_enum)]
    pub replacement_policy: Option<ReplacementPolicy>,

    /// Fast-scroll threshold in px.
    #[arg(long)]
    pub fast_scroll_threshold: Option<f64>,

    /// Unreferenced blobs kept before revocation.
    #[arg(long)]
    pub parked_blobs: Option<usize>,
}
