//! Internal playback events (not exposed to observers)
//!
//! Asynchronous sources (delay timers, the transcoder, the scheduler's decode
//! thread and sink callbacks) never touch chain or player state directly. They send
//! a `PlaybackEvent` to the delegate task, which validates it against the current
//! request token / session before acting. Observer-facing events are
//! `segue_common::events::PlayerEvent`.

use crate::error::PlaybackError;
use crate::playback::context::RequestToken;
use crate::playback::session::PlaybackSession;
use crate::track::Track;
use std::path::PathBuf;

/// Internal events for async source → delegate communication
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// A gap timer fired for the request identified by `token`
    DelayElapsed { token: RequestToken },

    /// Background transcoding of `track` finished
    TranscodingFinished {
        track: Track,
        result: Result<PathBuf, String>,
    },

    /// Every buffer of the session has played and the stream is exhausted
    SessionCompleted { session: PlaybackSession },

    /// Every buffer of the current loop pass has played
    LoopCompleted { session: PlaybackSession },

    /// Decoding cannot continue for the session
    DecodeFailed {
        session: PlaybackSession,
        error: PlaybackError,
    },
}

impl PlaybackEvent {
    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::DelayElapsed { .. } => "DelayElapsed",
            PlaybackEvent::TranscodingFinished { .. } => "TranscodingFinished",
            PlaybackEvent::SessionCompleted { .. } => "SessionCompleted",
            PlaybackEvent::LoopCompleted { .. } => "LoopCompleted",
            PlaybackEvent::DecodeFailed { .. } => "DecodeFailed",
        }
    }
}
