//! Error types for segue-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Two layers:
//! - [`PlaybackError`]: track-scoped failures that terminate a playback chain and are
//!   surfaced to observers. Never fatal to the process.
//! - [`Error`]: crate-level failures (configuration, I/O, setup).

use thiserror::Error;

/// Track-scoped failure surfaced by a playback chain
///
/// `Clone` so that a preparation failure can be cached on the track and
/// replayed on later requests without re-probing the file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// A chain needed a requested track and none was present
    #[error("No track was requested")]
    NoRequestedTrack,

    /// The track could not be opened or probed
    #[error("Unable to prepare '{track}' for playback: {message}")]
    Preparation { track: String, message: String },

    /// Conversion into a playable format failed
    #[error("Unable to transcode '{track}': {message}")]
    Transcoding { track: String, message: String },

    /// Decoding could not continue
    #[error("Audio decode error: {0}")]
    Decode(String),
}

/// Codec/format level failure while reading or decoding audio
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Failed to open the source file
    #[error("Failed to open file: {0}")]
    Open(#[from] std::io::Error),

    /// Container format not recognised
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Container holds no decodable audio track
    #[error("No audio track found")]
    NoAudioTrack,

    /// Reading the next packet failed
    #[error("Failed to read packet: {0}")]
    Packet(String),

    /// Codec rejected a packet
    #[error("Codec error: {0}")]
    Codec(String),

    /// Packet data is damaged; later packets may still decode
    #[error("Corrupt packet: {0}")]
    CorruptPacket(String),

    /// Seeking failed
    #[error("Seek failed: {0}")]
    Seek(String),
}

impl From<DecodeError> for PlaybackError {
    fn from(err: DecodeError) -> Self {
        PlaybackError::Decode(err.to_string())
    }
}

/// Main error type for segue-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Track-scoped playback errors
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Audio device could not be opened or driven
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Errors bubbled up from segue-common
    #[error(transparent)]
    Common(#[from] segue_common::Error),
}

/// Convenience Result type using segue-player Error
pub type Result<T> = std::result::Result<T, Error>;
