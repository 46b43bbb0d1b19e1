//! External collaborators consumed by the playback engine
//!
//! The engine does not own playlist ordering or format conversion; it consumes
//! them through these narrow interfaces.

use crate::track::Track;
use std::path::PathBuf;
use tracing::debug;

/// Yields tracks according to the current repeat/shuffle mode
pub trait Sequencer: Send {
    /// Track that follows the current one when it completes naturally
    fn subsequent(&mut self) -> Option<Track>;

    /// Track selected by an explicit "next" request
    fn next(&mut self) -> Option<Track>;

    /// Track selected by an explicit "previous" request
    fn previous(&mut self) -> Option<Track>;
}

/// Outcome of a synchronous transcode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeResult {
    /// Transcoded output is ready at the given path
    Ready(PathBuf),
    /// Still running in the background; completion arrives via
    /// `PlaybackHandle::transcoding_finished`
    InProgress,
    /// Conversion failed
    Failed(String),
}

/// Converts tracks into a natively decodable format
pub trait Transcoder: Send + Sync {
    /// Transcode, waiting only briefly for the result
    fn transcode_immediately(&self, track: &Track) -> TranscodeResult;

    /// Abandon an in-flight transcode of `track`
    fn cancel(&self, track: &Track);
}

/// Transcoder used when no conversion backend is configured
#[derive(Debug, Default)]
pub struct UnavailableTranscoder;

impl Transcoder for UnavailableTranscoder {
    fn transcode_immediately(&self, track: &Track) -> TranscodeResult {
        let ext = track.extension().unwrap_or_default();
        TranscodeResult::Failed(format!("no transcoder available for '.{}' files", ext))
    }

    fn cancel(&self, track: &Track) {
        debug!(track = %track, "Nothing to cancel");
    }
}
