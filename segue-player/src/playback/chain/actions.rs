//! Playback chain actions

use super::{ActionOutcome, DeferReason, PlaybackChainAction};
use crate::audio::TrackPreparer;
use crate::error::PlaybackError;
use crate::playback::collaborators::{TranscodeResult, Transcoder};
use crate::playback::context::PlaybackRequestContext;
use crate::playback::gap::{GapPosition, GapStore, GapType, PlaybackGap};
use crate::playback::player::Player;
use crate::playback::profiles::PlaybackProfiles;
use crate::track::Track;
use segue_common::{time, PlaybackState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Collaborators shared by the chain actions
#[derive(Clone)]
pub struct ChainResources {
    pub preparer: Arc<dyn TrackPreparer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub gap_store: Arc<dyn GapStore>,
    pub profiles: Arc<PlaybackProfiles>,
    /// Gap after every track that has no gap of its own
    pub gap_between_tracks: Option<Duration>,
}

fn transcoding_error(track: &Track, message: impl Into<String>) -> PlaybackError {
    PlaybackError::Transcoding {
        track: track.display_name().to_string(),
        message: message.into(),
    }
}

/// Cancels the transcode of a track being replaced
pub struct CancelTranscodingAction {
    pub(super) transcoder: Arc<dyn Transcoder>,
}

impl PlaybackChainAction for CancelTranscodingAction {
    fn name(&self) -> &'static str {
        "CancelTranscodingAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, _player: &mut Player) -> ActionOutcome {
        if !context.track_changes() {
            return ActionOutcome::Proceed;
        }
        let Some(track) = &context.current_track else {
            return ActionOutcome::Proceed;
        };

        // A transcode started during a gap keeps running while the track waits
        let in_flight = match context.current_state {
            PlaybackState::Transcoding => true,
            PlaybackState::Waiting => track.transcode_in_flight(),
            _ => false,
        };
        if in_flight {
            debug!(track = %track, state = %context.current_state, "Cancelling transcoding");
            self.transcoder.cancel(track);
        }
        ActionOutcome::Proceed
    }
}

/// Stops whatever the player is doing
///
/// A track being replaced mid-playback gets a profile at the position it
/// reached. Observers are not notified here; the context keeps the old track
/// and state so the next transition published describes the whole change.
pub struct HaltPlaybackAction {
    pub(super) profiles: Arc<PlaybackProfiles>,
}

impl PlaybackChainAction for HaltPlaybackAction {
    fn name(&self) -> &'static str {
        "HaltPlaybackAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, player: &mut Player) -> ActionOutcome {
        if player.state() == PlaybackState::NoTrack {
            return ActionOutcome::Proceed;
        }

        if context.track_changes() {
            if let (Some(track), Some(position)) = (player.track(), player.position()) {
                if position > 0.0 {
                    debug!(track = %track, position, "Saving playback profile");
                    self.profiles.save(track, position);
                }
            }
        }
        player.stop();
        ActionOutcome::Proceed
    }
}

/// Resumes a track where it was last left
pub struct ApplyPlaybackProfileAction {
    pub(super) profiles: Arc<PlaybackProfiles>,
}

impl PlaybackChainAction for ApplyPlaybackProfileAction {
    fn name(&self) -> &'static str {
        "ApplyPlaybackProfileAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, _player: &mut Player) -> ActionOutcome {
        if context.request_params.start_position.is_some() {
            return ActionOutcome::Proceed;
        }
        let Some(track) = &context.requested_track else {
            return ActionOutcome::Proceed;
        };

        if let Some(profile) = self.profiles.get(track) {
            debug!(track = %track, position = profile.last_position, "Applying playback profile");
            context.request_params.start_position = Some(profile.last_position);
        }
        ActionOutcome::Proceed
    }
}

/// Adds the gap before the requested track
pub struct SetPlaybackDelayAction {
    pub(super) gap_store: Arc<dyn GapStore>,
}

impl PlaybackChainAction for SetPlaybackDelayAction {
    fn name(&self) -> &'static str {
        "SetPlaybackDelayAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, _player: &mut Player) -> ActionOutcome {
        if !context.request_params.allow_delay {
            return ActionOutcome::Proceed;
        }
        let Some(track) = &context.requested_track else {
            return ActionOutcome::Proceed;
        };

        if let Some(gap) = self.gap_store.gap_before_track(track) {
            debug!(track = %track, duration = ?gap.duration, "Gap before track");
            context.add_gap(gap);
        }
        ActionOutcome::Proceed
    }
}

/// Makes the requested track ready to schedule
///
/// Waits out a pending gap, probes the track and gets it transcoded when needed.
/// While a gap is pending the player is `Waiting`, which takes precedence over
/// `Transcoding` for what observers see.
pub struct AudioFilePreparationAction {
    pub(super) preparer: Arc<dyn TrackPreparer>,
    pub(super) transcoder: Arc<dyn Transcoder>,
}

impl PlaybackChainAction for AudioFilePreparationAction {
    fn name(&self) -> &'static str {
        "AudioFilePreparationAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, player: &mut Player) -> ActionOutcome {
        let Some(track) = context.requested_track.clone() else {
            return ActionOutcome::Terminate(PlaybackError::NoRequestedTrack);
        };

        let mut deadline = None;
        if context.has_pending_delay() {
            if let Some(delay) = context.delay {
                let at = tokio::time::Instant::now() + delay;
                player.schedule_delay(context.token, at);
                deadline = Some((at, time::deadline_after(delay)));
            }
        }
        let waiting = deadline.is_some();

        if let Err(e) = self.preparer.prepare(&track) {
            return ActionOutcome::Terminate(e);
        }

        if let Some((_, gap_end_time)) = deadline {
            player.waiting(&track);
            player.publish_transition(
                context.current_track.as_ref(),
                context.current_state,
                Some(gap_end_time),
            );
            info!(track = %track, gap_end = %gap_end_time, "Waiting for gap");
            context.current_track = Some(track.clone());
            context.current_state = PlaybackState::Waiting;
        }

        if let Some(message) = track.info().transcoding_error {
            return ActionOutcome::Terminate(transcoding_error(&track, message));
        }

        if track.awaiting_transcode() {
            match self.transcoder.transcode_immediately(&track) {
                TranscodeResult::Ready(path) => {
                    debug!(track = %track, path = %path.display(), "Transcoded output ready");
                    track.mark_transcoded(Ok(path));
                }
                TranscodeResult::Failed(message) => {
                    track.mark_transcoded(Err(message.clone()));
                    return ActionOutcome::Terminate(transcoding_error(&track, message));
                }
                TranscodeResult::InProgress if !waiting => {
                    player.transcoding(&track);
                    player.publish_transition(
                        context.current_track.as_ref(),
                        context.current_state,
                        None,
                    );
                    info!(track = %track, "Transcoding in progress");
                    context.current_track = Some(track.clone());
                    context.current_state = PlaybackState::Transcoding;
                    return ActionOutcome::Defer(DeferReason::Transcoding);
                }
                TranscodeResult::InProgress => {
                    debug!(track = %track, "Transcoding behind pending gap");
                }
            }
        }

        match deadline {
            Some((at, _)) => ActionOutcome::Defer(DeferReason::Delay { deadline: at }),
            None => ActionOutcome::Proceed,
        }
    }
}

/// Opens a decoder and hands the track to the scheduler
pub struct StartPlaybackAction {
    pub(super) preparer: Arc<dyn TrackPreparer>,
}

impl PlaybackChainAction for StartPlaybackAction {
    fn name(&self) -> &'static str {
        "StartPlaybackAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, player: &mut Player) -> ActionOutcome {
        let Some(track) = context.requested_track.clone() else {
            return ActionOutcome::Terminate(PlaybackError::NoRequestedTrack);
        };

        let decoder = match self.preparer.open_decoder(&track) {
            Ok(decoder) => decoder,
            Err(e) => return ActionOutcome::Terminate(e),
        };

        let start_position = context.request_params.start_position.unwrap_or(0.0);
        let paused = context.requested_state == PlaybackState::Paused;

        if let Err(e) = player.play(
            &track,
            decoder,
            start_position,
            context.request_params.playback_loop,
            paused,
        ) {
            return ActionOutcome::Terminate(e);
        }

        player.publish_transition(context.current_track.as_ref(), context.current_state, None);
        context.current_track = Some(track);
        context.current_state = player.state();
        context.current_seek_position = Some(start_position);
        ActionOutcome::Proceed
    }
}

/// Tells observers playback has stopped
pub struct StopPlaybackAction;

impl PlaybackChainAction for StopPlaybackAction {
    fn name(&self) -> &'static str {
        "StopPlaybackAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, player: &mut Player) -> ActionOutcome {
        if context.current_state != PlaybackState::NoTrack {
            player.publish_transition(context.current_track.as_ref(), context.current_state, None);
            info!(track = ?context.current_track, "Playback stopped");
        }
        context.current_track = None;
        context.current_state = PlaybackState::NoTrack;
        context.current_seek_position = None;
        ActionOutcome::Proceed
    }
}

/// Forgets where the completed track was left
pub struct ResetPlaybackProfileAction {
    pub(super) profiles: Arc<PlaybackProfiles>,
}

impl PlaybackChainAction for ResetPlaybackProfileAction {
    fn name(&self) -> &'static str {
        "ResetPlaybackProfileAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, _player: &mut Player) -> ActionOutcome {
        if let Some(track) = &context.current_track {
            if self.profiles.remove(track).is_some() {
                debug!(track = %track, "Playback profile reset");
            }
        }
        ActionOutcome::Proceed
    }
}

/// Adds the gap after the completed track (or the global gap between tracks)
pub struct DelayAfterTrackCompletionAction {
    pub(super) gap_store: Arc<dyn GapStore>,
    pub(super) gap_between_tracks: Option<Duration>,
}

impl PlaybackChainAction for DelayAfterTrackCompletionAction {
    fn name(&self) -> &'static str {
        "DelayAfterTrackCompletionAction"
    }

    fn run(&self, context: &mut PlaybackRequestContext, _player: &mut Player) -> ActionOutcome {
        if !context.request_params.allow_delay {
            return ActionOutcome::Proceed;
        }
        let Some(completed) = &context.current_track else {
            return ActionOutcome::Proceed;
        };

        let gap = self.gap_store.gap_after_track(completed).or_else(|| {
            self.gap_between_tracks
                .filter(|d| !d.is_zero())
                .map(|d| PlaybackGap::new(d, GapPosition::AfterTrack, GapType::Persistent))
        });

        if let Some(gap) = gap {
            debug!(track = %completed, duration = ?gap.duration, "Gap after track");
            context.add_gap(gap);
        }
        ActionOutcome::Proceed
    }
}
