//! Loop-mode scheduling
//!
//! Identical double-buffering discipline to normal mode, with decoding bounded by
//! the loop end. Reaching the loop end with no outstanding buffers reports
//! `LoopCompleted` instead of `SessionCompleted`; the delegate then replays the
//! loop from its start while the session stays current.

use super::Scheduler;
use crate::error::PlaybackError;
use crate::playback::session::PlaybackSession;
use tracing::debug;

impl Scheduler {
    /// Schedule `[start_position, loop_end)` of the session's track
    ///
    /// `start_position` is normally the loop start, but may lie inside the loop
    /// after a seek. A region producing no audio (start at or beyond the end of the
    /// stream) completes the session instead of looping.
    pub fn play_loop(
        &self,
        session: &PlaybackSession,
        start_position: f64,
        loop_end: f64,
        begin_playback: bool,
    ) -> Result<(), PlaybackError> {
        self.inner
            .begin(session, start_position, Some(loop_end), begin_playback)
    }

    /// Start the next pass of the session's loop
    ///
    /// Returns `Ok(false)` when the session carries no complete loop.
    pub fn replay_loop(
        &self,
        session: &PlaybackSession,
        begin_playback: bool,
    ) -> Result<bool, PlaybackError> {
        let Some((start, end)) = session.playback_loop.and_then(|l| l.bounds()) else {
            return Ok(false);
        };

        debug!(session_id = session.id, start, end, "Replaying loop");
        self.play_loop(session, start, end, begin_playback)?;
        Ok(true)
    }

    /// Loop end of the active epoch, when scheduling in loop mode
    pub fn active_loop_end(&self) -> Option<f64> {
        self.inner
            .active
            .lock()
            .as_ref()
            .and_then(|epoch| epoch.loop_end)
    }
}
