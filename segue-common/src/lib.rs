//! # Segue Common Library
//!
//! Shared code for all Segue components including:
//! - Observer-facing event types (PlayerEvent enum) and the EventBus
//! - Playback state shared by the engine and its observers
//! - Configuration file discovery and TOML loading
//! - Utility functions for timestamps and durations

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, PlayerEvent, TrackInfo};
