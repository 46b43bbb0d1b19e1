//! Playback delegate
//!
//! **Responsibilities:**
//! - Single owner of the player, the chains and the deferred request
//! - Entry point for playback commands (play, stop, next, seek, loops, ...)
//! - Validate asynchronous events against the current request token or session
//!   and resume, terminate or advance chains accordingly
//!
//! Everything here runs on one task. Timers, the transcoder and the scheduler
//! reach it through [`PlaybackEvent`]s; observers receive [`PlayerEvent`]s from
//! the event bus.

use crate::audio::TrackPreparer;
use crate::config::PlayerConfig;
use crate::error::{PlaybackError, Result};
use crate::playback::chain::{
    ChainResources, ChainResult, CompletionDecision, DeferReason, DeferredChain, PlaybackChain,
    PlaybackChains,
};
use crate::playback::collaborators::{Sequencer, Transcoder};
use crate::playback::context::{PlaybackRequestContext, RequestParams, RequestToken, RequestTokens};
use crate::playback::events::PlaybackEvent;
use crate::playback::gap::GapStore;
use crate::playback::player::{LoopToggle, Player};
use crate::playback::profiles::PlaybackProfiles;
use crate::playback::scheduler::Scheduler;
use crate::playback::session::{PlaybackSession, SessionManager};
use crate::playback::sink::AudioSink;
use crate::track::Track;
use segue_common::{time, EventBus, PlaybackState, PlayerEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

/// External pieces the delegate is assembled from
pub struct PlayerComponents {
    pub sink: Arc<dyn AudioSink>,
    pub preparer: Arc<dyn TrackPreparer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub gap_store: Arc<dyn GapStore>,
    pub sequencer: Box<dyn Sequencer>,
}

/// Cloneable handle for reporting asynchronous results to the delegate
#[derive(Clone)]
pub struct PlaybackHandle {
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackHandle {
    /// Report the outcome of a background transcode
    ///
    /// Returns false when the delegate is gone.
    pub fn transcoding_finished(&self, track: &Track, result: std::result::Result<PathBuf, String>) -> bool {
        self.events
            .send(PlaybackEvent::TranscodingFinished {
                track: track.clone(),
                result,
            })
            .is_ok()
    }
}

/// Commands accepted by [`PlaybackDelegate::run`]
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    Play(Track),
    PlayWith(Track, RequestParams),
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    /// Position in seconds
    Seek(f64),
    /// Current position in seconds
    ToggleLoop(f64),
    /// Current position in seconds
    RemoveLoop(f64),
    Shutdown,
}

pub struct PlaybackDelegate {
    player: Player,
    chains: PlaybackChains,
    sequencer: Box<dyn Sequencer>,
    gap_store: Arc<dyn GapStore>,
    profiles: Arc<PlaybackProfiles>,
    tokens: RequestTokens,
    pending: Option<DeferredChain>,
    events_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    handle: PlaybackHandle,
}

impl PlaybackDelegate {
    /// Assemble the engine; must be called within a tokio runtime
    pub fn new(config: &PlayerConfig, components: PlayerComponents) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.event_capacity));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sessions = SessionManager::new();

        let scheduler = Scheduler::new(
            components.sink,
            sessions.clone(),
            events_tx.clone(),
            config.scheduling.clone(),
        )?;
        let player = Player::new(scheduler, sessions, event_bus, events_tx.clone());

        let profiles = Arc::new(PlaybackProfiles::new());
        let chains = PlaybackChains::new(&ChainResources {
            preparer: components.preparer,
            transcoder: components.transcoder,
            gap_store: components.gap_store.clone(),
            profiles: profiles.clone(),
            gap_between_tracks: config.gaps.gap_between_tracks(),
        });

        info!(
            event_capacity = config.event_capacity,
            gap_between_tracks = ?config.gaps.gap_between_tracks(),
            "Playback delegate created"
        );

        Ok(Self {
            player,
            chains,
            sequencer: components.sequencer,
            gap_store: components.gap_store,
            profiles,
            tokens: RequestTokens::new(),
            pending: None,
            events_rx,
            handle: PlaybackHandle { events: events_tx },
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.player.event_bus().subscribe()
    }

    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.player.track().cloned()
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn chains(&self) -> &PlaybackChains {
        &self.chains
    }

    pub fn profiles(&self) -> &Arc<PlaybackProfiles> {
        &self.profiles
    }

    /// The request waiting on a gap or a transcode, if any
    pub fn pending(&self) -> Option<&DeferredChain> {
        self.pending.as_ref()
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub fn play(&mut self, track: Track) {
        self.play_with(track, RequestParams::default());
    }

    pub fn play_with(&mut self, track: Track, params: RequestParams) {
        let context = self.begin_request(Some(track), params);
        let result = self.chains.start.execute(context, &mut self.player);
        self.settle(result);
    }

    pub fn stop(&mut self) {
        let context = self.begin_request(None, RequestParams::default());
        let result = self.chains.stop.execute(context, &mut self.player);
        self.settle(result);
    }

    /// Returns whether playback was paused
    pub fn pause(&mut self) -> bool {
        let old_state = self.player.state();
        if !self.player.pause() {
            return false;
        }
        self.publish_state_change(old_state);
        true
    }

    /// Returns whether playback was resumed
    pub fn resume(&mut self) -> bool {
        let old_state = self.player.state();
        if !self.player.resume() {
            return false;
        }
        self.publish_state_change(old_state);
        true
    }

    /// Skip to the sequencer's next track
    ///
    /// Does nothing without an active track; when the sequencer has nothing to
    /// offer the current track and state are left as they are.
    pub fn next(&mut self) -> bool {
        if self.player.state() == PlaybackState::NoTrack {
            return false;
        }
        match self.sequencer.next() {
            Some(track) => {
                self.play(track);
                true
            }
            None => {
                debug!("No next track");
                false
            }
        }
    }

    /// Go back to the sequencer's previous track (same rules as [`Self::next`])
    pub fn previous(&mut self) -> bool {
        if self.player.state() == PlaybackState::NoTrack {
            return false;
        }
        match self.sequencer.previous() {
            Some(track) => {
                self.play(track);
                true
            }
            None => {
                debug!("No previous track");
                false
            }
        }
    }

    /// Jump to `position` seconds in the playing track
    pub fn seek(&mut self, position: f64) -> bool {
        let before = self.snapshot();
        let had_loop = self.player.playback_loop().is_some();
        match self.player.seek(position) {
            Ok(Some(session)) => {
                let position = position.max(0.0);
                self.profiles.save(&session.track, position);
                self.player.publish(PlayerEvent::TrackSeeked {
                    track: session.track.to_info(),
                    position,
                    timestamp: time::now(),
                });
                if had_loop && self.player.playback_loop().is_none() {
                    self.publish_loop_change(None, None);
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.playback_failed(before, e);
                false
            }
        }
    }

    /// Mark loop start, then loop end; a third call removes the loop
    pub fn toggle_loop(&mut self, position: f64) -> Option<LoopToggle> {
        let before = self.snapshot();
        match self.player.toggle_loop(position) {
            Ok(Some(toggle)) => {
                let (start_time, end_time) = match toggle {
                    LoopToggle::Started(l) | LoopToggle::Completed(l) => (Some(l.start_time), l.end_time),
                    LoopToggle::Removed => (None, None),
                };
                self.publish_loop_change(start_time, end_time);
                Some(toggle)
            }
            Ok(None) => None,
            Err(e) => {
                self.playback_failed(before, e);
                None
            }
        }
    }

    /// Remove the loop and continue normally from `position`
    pub fn remove_loop(&mut self, position: f64) -> bool {
        let before = self.snapshot();
        match self.player.remove_loop(position) {
            Ok(true) => {
                self.publish_loop_change(None, None);
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.playback_failed(before, e);
                false
            }
        }
    }

    pub fn execute(&mut self, command: PlayerCommand) {
        debug!(?command, "Command");
        match command {
            PlayerCommand::Play(track) => self.play(track),
            PlayerCommand::PlayWith(track, params) => self.play_with(track, params),
            PlayerCommand::Pause => {
                self.pause();
            }
            PlayerCommand::Resume => {
                self.resume();
            }
            PlayerCommand::Stop => self.stop(),
            PlayerCommand::Next => {
                self.next();
            }
            PlayerCommand::Previous => {
                self.previous();
            }
            PlayerCommand::Seek(position) => {
                self.seek(position);
            }
            PlayerCommand::ToggleLoop(position) => {
                self.toggle_loop(position);
            }
            PlayerCommand::RemoveLoop(position) => {
                self.remove_loop(position);
            }
            PlayerCommand::Shutdown => self.shutdown(),
        }
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Drive the delegate until `Shutdown` or until every command sender is gone
    pub async fn run(mut self, mut commands: mpsc::Receiver<PlayerCommand>) {
        info!("Playback delegate running");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PlayerCommand::Shutdown) | None => break,
                    Some(command) => self.execute(command),
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }
        self.shutdown();
        info!("Playback delegate stopped");
    }

    /// Handle every event already queued, without waiting
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next event and handle it
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    pub fn handle_event(&mut self, event: PlaybackEvent) {
        trace!(event = event.name(), "Handling playback event");
        match event {
            PlaybackEvent::DelayElapsed { token } => self.on_delay_elapsed(token),
            PlaybackEvent::TranscodingFinished { track, result } => {
                self.on_transcoding_finished(track, result)
            }
            PlaybackEvent::SessionCompleted { session } => self.on_session_completed(session),
            PlaybackEvent::LoopCompleted { session } => self.on_loop_completed(session),
            PlaybackEvent::DecodeFailed { session, error } => self.on_decode_failed(session, error),
        }
    }

    fn on_delay_elapsed(&mut self, token: RequestToken) {
        if !self.tokens.is_current(token) {
            debug!(%token, "Ignoring delay of superseded request");
            return;
        }

        match self.pending.take() {
            Some(mut deferred)
                if deferred.context.token == token
                    && matches!(deferred.reason, DeferReason::Delay { .. }) =>
            {
                for gap in deferred.context.gaps.one_time_gaps() {
                    self.gap_store.remove_gap(gap);
                }
                deferred.context.gaps.clear();
                deferred.context.delay_elapsed();

                info!(%token, "Gap elapsed");
                let result = self.chains.start.resume(deferred, &mut self.player);
                self.settle(result);
            }
            other => {
                self.pending = other;
                debug!(%token, "No request waiting on this delay");
            }
        }
    }

    fn on_transcoding_finished(&mut self, track: Track, result: std::result::Result<PathBuf, String>) {
        track.mark_transcoded(result.clone());

        match self.pending.take() {
            Some(deferred)
                if deferred.reason == DeferReason::Transcoding
                    && deferred.context.requested_track.as_ref() == Some(&track)
                    && self.tokens.is_current(deferred.context.token) =>
            {
                match result {
                    Ok(path) => {
                        info!(track = %track, path = %path.display(), "Transcoding finished");
                        let result = self.chains.start.resume(deferred, &mut self.player);
                        self.settle(result);
                    }
                    Err(message) => {
                        let error = PlaybackError::Transcoding {
                            track: track.display_name().to_string(),
                            message,
                        };
                        warn!(track = %track, error = %error, "Transcoding failed");
                        PlaybackChain::terminate(&deferred.context, &mut self.player, &error);
                    }
                }
            }
            other => {
                self.pending = other;
                debug!(track = %track, "No request waiting on this transcode");
            }
        }
    }

    fn on_session_completed(&mut self, session: PlaybackSession) {
        if !self.player.is_current(&session) {
            debug!(session_id = session.id, "Ignoring completion of stale session");
            return;
        }

        let track = session.track.clone();
        info!(track = %track, session_id = session.id, "Track playback completed");
        self.player.publish(PlayerEvent::PlaybackCompleted {
            track: track.to_info(),
            timestamp: time::now(),
        });

        let context = self.begin_request(None, RequestParams::default());
        let mut context = match self.chains.completed.execute(context, &mut self.player) {
            ChainResult::Completed(context) => context,
            other => {
                self.settle(other);
                return;
            }
        };

        let result = match CompletionDecision::decide(self.sequencer.as_mut()) {
            CompletionDecision::Advance(next) => {
                debug!(completed = %track, next = %next, "Advancing to subsequent track");
                context.request(next);
                self.chains.start.execute(context, &mut self.player)
            }
            CompletionDecision::Halt => {
                debug!(completed = %track, "No subsequent track");
                self.chains.stop.execute(context, &mut self.player)
            }
        };
        self.settle(result);
    }

    fn on_loop_completed(&mut self, session: PlaybackSession) {
        if !self.player.is_current(&session) {
            trace!(session_id = session.id, "Ignoring loop completion of stale session");
            return;
        }

        let before = self.snapshot();
        if let Err(e) = self.player.replay_loop(&session) {
            self.playback_failed(before, e);
        }
    }

    fn on_decode_failed(&mut self, session: PlaybackSession, error: PlaybackError) {
        if !self.player.is_current(&session) {
            debug!(session_id = session.id, "Ignoring decode failure of stale session");
            return;
        }

        error!(track = %session.track, session_id = session.id, error = %error, "Playback cannot continue");
        self.player.publish(PlayerEvent::TrackNotPlayed {
            track: Some(session.track.to_info()),
            message: error.to_string(),
            timestamp: time::now(),
        });
        self.stop();
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Supersede any deferred request and open a context for a new one
    fn begin_request(&mut self, requested: Option<Track>, params: RequestParams) -> PlaybackRequestContext {
        if let Some(mut superseded) = self.pending.take() {
            debug!(
                token = %superseded.context.token,
                reason = ?superseded.reason,
                "Superseding deferred request"
            );
            superseded.context.gaps.clear();
        }

        let token = self.tokens.issue();
        PlaybackRequestContext::new(
            token,
            self.player.track().cloned(),
            self.player.state(),
            requested,
            params,
        )
    }

    fn settle(&mut self, result: ChainResult) {
        match result {
            ChainResult::Completed(context) => {
                trace!(token = %context.token, "Chain completed");
            }
            ChainResult::Terminated(error) => {
                debug!(error = %error, "Request failed");
            }
            ChainResult::Deferred(deferred) => {
                self.pending = Some(deferred);
            }
        }
    }

    fn snapshot(&self) -> (Option<Track>, PlaybackState) {
        (self.player.track().cloned(), self.player.state())
    }

    /// Report a failure the player has already stopped for
    fn playback_failed(&mut self, before: (Option<Track>, PlaybackState), error: PlaybackError) {
        let (track, state) = before;
        error!(track = ?track, error = %error, "Playback failed");
        self.player.publish(PlayerEvent::TrackNotPlayed {
            track: track.as_ref().map(Track::to_info),
            message: error.to_string(),
            timestamp: time::now(),
        });
        if state != PlaybackState::NoTrack {
            self.player.publish_transition(track.as_ref(), state, None);
        }
    }

    fn publish_state_change(&self, old_state: PlaybackState) {
        info!(old_state = %old_state, new_state = %self.player.state(), "Playback state changed");
        self.player.publish(PlayerEvent::PlaybackStateChanged {
            old_state,
            new_state: self.player.state(),
            timestamp: time::now(),
        });
    }

    fn publish_loop_change(&self, start_time: Option<f64>, end_time: Option<f64>) {
        let Some(track) = self.player.track() else {
            return;
        };
        self.player.publish(PlayerEvent::LoopChanged {
            track: track.to_info(),
            start_time,
            end_time,
            timestamp: time::now(),
        });
    }

    fn shutdown(&mut self) {
        if self.player.state() != PlaybackState::NoTrack || self.pending.is_some() {
            self.stop();
        }
        self.player.scheduler().wait_idle();
    }
}
