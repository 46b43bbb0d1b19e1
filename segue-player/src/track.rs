//! Track handle shared between the delegate, chains, scheduler and collaborators
//!
//! A [`Track`] is cheap to clone (reference counted) and compares by identity.
//! Preparation results (probe outcome, transcoding state, preparation error) are
//! cached on the track so later requests do not re-probe the file.

use crate::audio::AudioFormat;
use crate::error::PlaybackError;
use parking_lot::Mutex;
use segue_common::TrackInfo;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Lazily populated playback facts about a track
#[derive(Debug, Clone, Default)]
pub struct LazyLoadingInfo {
    /// Probing has run (successfully or not)
    pub validated: bool,
    /// The track can be handed to the decoder as-is
    pub prepared_for_playback: bool,
    /// The track must be transcoded before it can be decoded
    pub needs_transcoding: bool,
    /// Cached preparation failure
    pub preparation_error: Option<PlaybackError>,
    /// Output of a finished transcode
    pub transcoded_path: Option<PathBuf>,
    /// Message of a failed transcode
    pub transcoding_error: Option<String>,
    /// Stream format discovered by probing
    pub format: Option<AudioFormat>,
    /// Duration in seconds, when known
    pub duration: Option<f64>,
}

struct TrackInner {
    id: Uuid,
    path: PathBuf,
    display_name: String,
    info: Mutex<LazyLoadingInfo>,
}

/// A playable item
#[derive(Clone)]
pub struct Track(Arc<TrackInner>);

impl Track {
    /// Create a track for a file, deriving the display name from the file stem
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>")
            .to_string();
        Self::with_name(path, display_name)
    }

    pub fn with_name(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self(Arc::new(TrackInner {
            id: Uuid::new_v4(),
            path: path.into(),
            display_name: display_name.into(),
            info: Mutex::new(LazyLoadingInfo::default()),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    pub fn display_name(&self) -> &str {
        &self.0.display_name
    }

    /// Lowercase file extension
    pub fn extension(&self) -> Option<String> {
        self.0
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Snapshot of the cached preparation state
    pub fn info(&self) -> LazyLoadingInfo {
        self.0.info.lock().clone()
    }

    pub fn needs_transcoding(&self) -> bool {
        self.0.info.lock().needs_transcoding
    }

    /// Transcoding is required and has not produced a playable file yet
    pub fn awaiting_transcode(&self) -> bool {
        let info = self.0.info.lock();
        info.needs_transcoding && info.transcoded_path.is_none()
    }

    /// A transcode was required and has reported neither output nor failure
    pub fn transcode_in_flight(&self) -> bool {
        let info = self.0.info.lock();
        info.needs_transcoding && info.transcoded_path.is_none() && info.transcoding_error.is_none()
    }

    pub fn duration(&self) -> Option<f64> {
        self.0.info.lock().duration
    }

    /// Record a successful probe
    pub fn mark_prepared(&self, format: AudioFormat, duration: Option<f64>) {
        let mut info = self.0.info.lock();
        info.validated = true;
        info.prepared_for_playback = true;
        info.preparation_error = None;
        info.format = Some(format);
        info.duration = duration;
    }

    /// Record that the track cannot be decoded natively
    pub fn mark_needs_transcoding(&self) {
        let mut info = self.0.info.lock();
        info.validated = true;
        info.needs_transcoding = true;
    }

    pub fn mark_preparation_failed(&self, error: PlaybackError) {
        let mut info = self.0.info.lock();
        info.validated = true;
        info.prepared_for_playback = false;
        info.preparation_error = Some(error);
    }

    /// Record the outcome of a transcode
    pub fn mark_transcoded(&self, result: Result<PathBuf, String>) {
        let mut info = self.0.info.lock();
        match result {
            Ok(path) => {
                info.transcoded_path = Some(path);
                info.transcoding_error = None;
                info.prepared_for_playback = true;
            }
            Err(message) => {
                info.transcoded_path = None;
                info.transcoding_error = Some(message);
            }
        }
    }

    /// File the decoder should open: the transcoded output when there is one
    pub fn playable_path(&self) -> PathBuf {
        self.0
            .info
            .lock()
            .transcoded_path
            .clone()
            .unwrap_or_else(|| self.0.path.clone())
    }

    /// Observer-facing description
    pub fn to_info(&self) -> TrackInfo {
        TrackInfo {
            track_id: self.0.id,
            display_name: self.0.display_name.clone(),
            path: self.0.path.display().to_string(),
        }
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Track {}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.0.id)
            .field("name", &self.0.display_name)
            .finish()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.display_name)
    }
}
