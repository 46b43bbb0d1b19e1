//! Segue playback transition engine
//!
//! Moves a player between tracks through ordered playback chains, honoring
//! gaps, transcoding and loops, and keeps an audio sink fed by decoding ahead.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod track;

pub use config::PlayerConfig;
pub use error::{DecodeError, Error, PlaybackError, Result};
pub use track::Track;
