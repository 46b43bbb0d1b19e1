//! Playback request context
//!
//! One [`PlaybackRequestContext`] describes one transition attempt and is owned by
//! exactly one chain execution. Every new context receives a fresh
//! [`RequestToken`]; deferred continuations (gap timers, transcoder completions)
//! carry the token they were created under and are dropped unless it is still
//! the current one.

use crate::playback::gap::{GapContext, PlaybackGap};
use crate::playback::session::PlaybackLoop;
use crate::track::Track;
use segue_common::PlaybackState;
use std::fmt;
use std::time::Duration;

/// Identity of one playback request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues request tokens and holds the single authoritative current token
#[derive(Debug, Default)]
pub struct RequestTokens {
    current: u64,
}

impl RequestTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for a new request, making every earlier token stale
    pub fn issue(&mut self) -> RequestToken {
        self.current += 1;
        RequestToken(self.current)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.current
    }

    pub fn current(&self) -> Option<RequestToken> {
        (self.current > 0).then_some(RequestToken(self.current))
    }
}

/// Caller-supplied knobs for a playback request
#[derive(Debug, Clone)]
pub struct RequestParams {
    /// Gaps and explicit delays are honoured
    pub allow_delay: bool,
    /// Explicit delay before the track starts
    pub delay: Option<Duration>,
    /// Start position in seconds (defaults to the remembered profile, then 0)
    pub start_position: Option<f64>,
    /// Loop to enter as soon as playback starts
    pub playback_loop: Option<PlaybackLoop>,
    /// Schedule the track but leave the sink paused
    pub start_paused: bool,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            allow_delay: true,
            delay: None,
            start_position: None,
            playback_loop: None,
            start_paused: false,
        }
    }
}

impl RequestParams {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_start_position(mut self, position: f64) -> Self {
        self.start_position = Some(position);
        self
    }

    pub fn with_loop(mut self, playback_loop: PlaybackLoop) -> Self {
        self.playback_loop = Some(playback_loop);
        self
    }

    pub fn without_delay(mut self) -> Self {
        self.allow_delay = false;
        self
    }

    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }
}

/// Mutable record of one transition in flight
#[derive(Debug, Clone)]
pub struct PlaybackRequestContext {
    pub token: RequestToken,
    pub current_track: Option<Track>,
    pub current_state: PlaybackState,
    pub current_seek_position: Option<f64>,
    pub requested_track: Option<Track>,
    pub requested_state: PlaybackState,
    /// Effective delay before the requested track starts
    pub delay: Option<Duration>,
    pub gaps: GapContext,
    pub request_params: RequestParams,
}

impl PlaybackRequestContext {
    pub fn new(
        token: RequestToken,
        current_track: Option<Track>,
        current_state: PlaybackState,
        requested_track: Option<Track>,
        request_params: RequestParams,
    ) -> Self {
        let requested_state = if requested_track.is_none() {
            PlaybackState::NoTrack
        } else if request_params.start_paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };

        Self {
            token,
            current_track,
            current_state,
            current_seek_position: None,
            requested_track,
            requested_state,
            delay: request_params.delay,
            gaps: GapContext::default(),
            request_params,
        }
    }

    /// Apply a gap; the effective delay is the longest of all applicable pauses
    pub fn add_gap(&mut self, gap: PlaybackGap) {
        self.gaps.add(gap);
        self.delay = self.delay.max(self.gaps.gap_length());
    }

    /// A delay is both allowed and present
    pub fn has_pending_delay(&self) -> bool {
        self.request_params.allow_delay && self.delay.is_some_and(|d| !d.is_zero())
    }

    /// The requested track differs from the current one
    pub fn track_changes(&self) -> bool {
        self.requested_track != self.current_track
    }

    /// Point the context at a new requested track (chain-of-chains advance)
    pub fn request(&mut self, track: Track) {
        self.requested_track = Some(track);
        self.requested_state = if self.request_params.start_paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
    }

    /// Clear the delay once it has elapsed so a resumed chain proceeds
    pub fn delay_elapsed(&mut self) {
        self.delay = None;
        self.request_params.allow_delay = false;
    }
}
