//! Player state and scheduler front-end
//!
//! **Responsibilities:**
//! - Own the observable playback state (track, state, session, loop)
//! - Start, pause, resume, seek and stop scheduled playback
//! - Manage the segment loop of the playing track
//! - Publish `PlayerEvent`s to observers
//!
//! The player is owned by the delegate task and is only ever touched from there;
//! asynchronous work reaches it through `PlaybackEvent`s.

use crate::audio::StreamDecoder;
use crate::error::PlaybackError;
use crate::playback::context::RequestToken;
use crate::playback::events::PlaybackEvent;
use crate::playback::scheduler::Scheduler;
use crate::playback::session::{PlaybackLoop, PlaybackSession, SessionManager};
use crate::track::Track;
use chrono::{DateTime, Utc};
use segue_common::{time, EventBus, PlaybackState, PlayerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Result of a loop toggle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopToggle {
    /// Loop start marked; playback continues normally
    Started(PlaybackLoop),
    /// Loop end marked; loop playback started
    Completed(PlaybackLoop),
    /// Existing loop removed
    Removed,
}

pub struct Player {
    state: PlaybackState,
    track: Option<Track>,
    session: Option<PlaybackSession>,
    playback_loop: Option<PlaybackLoop>,
    scheduler: Scheduler,
    sessions: SessionManager,
    event_bus: Arc<EventBus>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl Player {
    pub fn new(
        scheduler: Scheduler,
        sessions: SessionManager,
        event_bus: Arc<EventBus>,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Self {
        Self {
            state: PlaybackState::NoTrack,
            track: None,
            session: None,
            playback_loop: None,
            scheduler,
            sessions,
            event_bus,
            events,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Position reached in the playing or paused track, in seconds
    pub fn position(&self) -> Option<f64> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Paused => self.scheduler.playback_position(),
            _ => None,
        }
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn playback_loop(&self) -> Option<PlaybackLoop> {
        self.playback_loop
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Is `session` the one currently playing?
    pub fn is_current(&self, session: &PlaybackSession) -> bool {
        self.sessions.is_current(session)
    }

    /// Start scheduled playback of `track` with a freshly opened decoder
    ///
    /// A complete loop starts loop-mode scheduling at `start_position` when it lies
    /// inside the loop, otherwise at the loop start.
    pub fn play(
        &mut self,
        track: &Track,
        decoder: StreamDecoder,
        start_position: f64,
        playback_loop: Option<PlaybackLoop>,
        paused: bool,
    ) -> Result<PlaybackSession, PlaybackError> {
        let session = self.sessions.start(track, playback_loop);
        self.scheduler.load_decoder(decoder);

        if let Err(e) = self.schedule(&session, start_position, !paused) {
            self.stop();
            return Err(e);
        }

        self.state = if paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        self.track = Some(track.clone());
        self.playback_loop = playback_loop;
        self.session = Some(session.clone());

        info!(
            track = %track,
            session_id = session.id,
            start_position,
            state = %self.state,
            "Playback started"
        );
        Ok(session)
    }

    fn schedule(
        &self,
        session: &PlaybackSession,
        position: f64,
        begin_playback: bool,
    ) -> Result<(), PlaybackError> {
        match session.playback_loop.and_then(|l| l.bounds()) {
            Some((start, end)) => {
                let from = if position >= start && position < end {
                    position
                } else {
                    start
                };
                self.scheduler.play_loop(session, from, end, begin_playback)
            }
            None => self.scheduler.play_track(session, position, begin_playback),
        }
    }

    /// Enter the waiting state for `track` (a gap is pending)
    pub fn waiting(&mut self, track: &Track) {
        self.reset_session();
        self.state = PlaybackState::Waiting;
        self.track = Some(track.clone());
        debug!(track = %track, "Waiting");
    }

    /// Enter the transcoding state for `track`
    pub fn transcoding(&mut self, track: &Track) {
        self.reset_session();
        self.state = PlaybackState::Transcoding;
        self.track = Some(track.clone());
        debug!(track = %track, "Transcoding");
    }

    /// Stop everything and return to `NoTrack` without notifying observers
    pub fn stop(&mut self) {
        self.reset_session();
        if let Some(track) = self.track.take() {
            debug!(track = %track, state = %self.state, "Player stopped");
        }
        self.state = PlaybackState::NoTrack;
    }

    fn reset_session(&mut self) {
        self.sessions.end_current();
        self.scheduler.stop();
        self.session = None;
        self.playback_loop = None;
    }

    /// Returns whether the state changed
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        self.scheduler.pause();
        self.state = PlaybackState::Paused;
        true
    }

    /// Returns whether the state changed
    pub fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        self.scheduler.resume();
        self.state = PlaybackState::Playing;
        true
    }

    /// Jump to `position` (seconds) in the playing track
    ///
    /// Starts a new session; a loop not containing the target position is removed.
    /// Returns `Ok(None)` when nothing is playing.
    pub fn seek(&mut self, position: f64) -> Result<Option<PlaybackSession>, PlaybackError> {
        if !self.state.is_playing_or_paused() {
            return Ok(None);
        }
        let Some(track) = self.track.clone() else {
            return Ok(None);
        };

        let position = position.max(0.0);
        if let Some(l) = self.playback_loop {
            if !l.contains(position) {
                debug!(track = %track, position, "Seek left the loop, removing it");
                self.playback_loop = None;
            }
        }

        let session = self.restart(&track, position)?;
        Ok(Some(session))
    }

    /// Mark the start, then the end, of a loop; a third toggle removes it
    ///
    /// `position` is the current playback position. Returns `Ok(None)` when
    /// nothing is playing.
    pub fn toggle_loop(&mut self, position: f64) -> Result<Option<LoopToggle>, PlaybackError> {
        if !self.state.is_playing_or_paused() {
            return Ok(None);
        }
        let Some(track) = self.track.clone() else {
            return Ok(None);
        };

        match self.playback_loop {
            None => {
                let half = PlaybackLoop::starting_at(position.max(0.0));
                self.playback_loop = Some(half);
                self.refresh_session_loop();
                debug!(track = %track, start = half.start_time, "Loop start marked");
                Ok(Some(LoopToggle::Started(half)))
            }
            Some(l) if !l.is_complete() => {
                let (start, end) = if position < l.start_time {
                    (position.max(0.0), l.start_time)
                } else {
                    (l.start_time, position)
                };
                if end <= start {
                    // Zero-length region: keep waiting for a usable end point
                    return Ok(Some(LoopToggle::Started(l)));
                }

                let full = PlaybackLoop::new(start, end);
                self.playback_loop = Some(full);
                self.restart(&track, start)?;
                info!(track = %track, start, end, "Loop playback started");
                Ok(Some(LoopToggle::Completed(full)))
            }
            Some(_) => {
                self.remove_loop(position)?;
                Ok(Some(LoopToggle::Removed))
            }
        }
    }

    /// Drop the loop, continuing normal playback from `position`
    ///
    /// Returns whether a loop was removed.
    pub fn remove_loop(&mut self, position: f64) -> Result<bool, PlaybackError> {
        let Some(removed) = self.playback_loop.take() else {
            return Ok(false);
        };
        let Some(track) = self.track.clone() else {
            return Ok(false);
        };

        if removed.is_complete() {
            self.restart(&track, position.max(0.0))?;
        } else {
            self.refresh_session_loop();
        }
        debug!(track = %track, "Loop removed");
        Ok(true)
    }

    /// Start the next pass of the current loop
    ///
    /// Returns `Ok(false)` for stale sessions or when no loop is set.
    pub fn replay_loop(&mut self, session: &PlaybackSession) -> Result<bool, PlaybackError> {
        if !self.sessions.is_current(session) {
            trace!(session_id = session.id, "Not replaying loop of stale session");
            return Ok(false);
        }
        let replayed = self
            .scheduler
            .replay_loop(session, self.state == PlaybackState::Playing);
        if replayed.is_err() {
            self.stop();
        }
        replayed
    }

    /// Re-schedule the current track from `position` under a new session
    fn restart(&mut self, track: &Track, position: f64) -> Result<PlaybackSession, PlaybackError> {
        let session = self.sessions.start(track, self.playback_loop);
        let begin_playback = self.state == PlaybackState::Playing;

        if let Err(e) = self.schedule(&session, position, begin_playback) {
            self.stop();
            return Err(e);
        }
        self.session = Some(session.clone());
        Ok(session)
    }

    fn refresh_session_loop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.playback_loop = self.playback_loop;
        }
    }

    /// Fire a `DelayElapsed` event for `token` at `deadline`
    pub fn schedule_delay(&self, token: RequestToken, deadline: tokio::time::Instant) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if events.send(PlaybackEvent::DelayElapsed { token }).is_err() {
                trace!(%token, "Delegate gone before delay elapsed");
            }
        });
    }

    /// Publish an event to observers
    pub fn publish(&self, event: PlayerEvent) {
        trace!(event = event.event_type(), "Publishing");
        self.event_bus.emit_lossy(event);
    }

    /// Publish a transition from `(begin_track, begin_state)` to the current
    /// track and state
    pub fn publish_transition(
        &self,
        begin_track: Option<&Track>,
        begin_state: PlaybackState,
        gap_end_time: Option<DateTime<Utc>>,
    ) {
        self.publish(PlayerEvent::TrackTransition {
            begin_track: begin_track.map(Track::to_info),
            begin_state,
            end_track: self.track.as_ref().map(Track::to_info),
            end_state: self.state,
            gap_end_time,
            timestamp: time::now(),
        });
    }
}
