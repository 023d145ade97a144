//! tdmedia - media viewer and content-loading core for a messaging client.
//!
//! This crate tracks which items of a scroll region are on screen, drives
//! playback of the media inside them, pages through a chat's photo and video
//! history for the media viewer, and caches downloaded files behind
//! reference-counted blob handles.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the media services and session wiring.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for configuration and the engine.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "tdmedia";
