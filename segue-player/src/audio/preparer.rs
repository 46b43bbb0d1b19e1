//! Track preparation
//!
//! Preparation is lazy and cached on the [`Track`]: the first request probes the
//! file, later requests reuse the outcome (including a cached failure).

use super::decoder::{FrameSource, StreamDecoder, SymphoniaSource};
use crate::config::TranscodingConfig;
use crate::error::PlaybackError;
use crate::track::Track;
use tracing::{debug, warn};

/// Makes tracks ready for scheduling
pub trait TrackPreparer: Send + Sync {
    /// Probe the track (once) and record whether it is playable or needs transcoding
    fn prepare(&self, track: &Track) -> Result<(), PlaybackError>;

    /// Open a positioned decoder for the track's playable file
    fn open_decoder(&self, track: &Track) -> Result<StreamDecoder, PlaybackError>;
}

/// Preparer backed by symphonia probing
pub struct SymphoniaPreparer {
    transcoding: TranscodingConfig,
}

impl SymphoniaPreparer {
    pub fn new(transcoding: TranscodingConfig) -> Self {
        Self { transcoding }
    }
}

impl TrackPreparer for SymphoniaPreparer {
    fn prepare(&self, track: &Track) -> Result<(), PlaybackError> {
        let info = track.info();
        if let Some(err) = info.preparation_error {
            return Err(err);
        }
        if info.prepared_for_playback || info.needs_transcoding {
            return Ok(());
        }

        if let Some(ext) = track.extension() {
            if self.transcoding.needs_transcoding(&ext) {
                debug!(track = %track, extension = %ext, "Track requires transcoding");
                track.mark_needs_transcoding();
                return Ok(());
            }
        }

        match SymphoniaSource::open(track.path()) {
            Ok(source) => {
                track.mark_prepared(source.format(), source.duration());
                debug!(track = %track, duration = ?source.duration(), "Track prepared");
                Ok(())
            }
            Err(e) => {
                let err = PlaybackError::Preparation {
                    track: track.display_name().to_string(),
                    message: e.to_string(),
                };
                warn!(track = %track, error = %e, "Track preparation failed");
                track.mark_preparation_failed(err.clone());
                Err(err)
            }
        }
    }

    fn open_decoder(&self, track: &Track) -> Result<StreamDecoder, PlaybackError> {
        let path = track.playable_path();
        let source = SymphoniaSource::open(&path).map_err(|e| PlaybackError::Preparation {
            track: track.display_name().to_string(),
            message: e.to_string(),
        })?;
        Ok(StreamDecoder::new(Box::new(source)))
    }
}
