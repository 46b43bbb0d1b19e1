//! Playback chains
//!
//! A chain runs an ordered list of actions against one [`PlaybackRequestContext`].
//! Each action either proceeds, terminates the chain with an error, or defers it
//! (waiting for a gap timer or a background transcode). A deferred chain is parked
//! by the delegate together with the index to resume at.
//!
//! **Module Structure:**
//! - `actions.rs`: the individual actions
//! - `start.rs`: StartPlaybackChain
//! - `stop.rs`: StopPlaybackChain
//! - `completed.rs`: TrackPlaybackCompletedChain and the completion decision

mod actions;
mod completed;
mod start;
mod stop;

pub use actions::ChainResources;
pub use completed::{track_playback_completed_chain, CompletionDecision};
pub use start::start_playback_chain;
pub use stop::stop_playback_chain;

use crate::error::PlaybackError;
use crate::playback::context::PlaybackRequestContext;
use crate::playback::player::Player;
use segue_common::{time, PlaybackState, PlayerEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Why a chain stopped short of completion without failing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeferReason {
    /// A gap is pending until `deadline`
    Delay { deadline: tokio::time::Instant },
    /// The requested track is being transcoded in the background
    Transcoding,
}

/// Outcome of a single action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Proceed,
    Terminate(PlaybackError),
    Defer(DeferReason),
}

pub trait PlaybackChainAction: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, context: &mut PlaybackRequestContext, player: &mut Player) -> ActionOutcome;
}

/// A parked chain execution
#[derive(Debug)]
pub struct DeferredChain {
    pub context: PlaybackRequestContext,
    pub reason: DeferReason,
    /// Index of the action to run on resumption
    pub resume_at: usize,
}

#[derive(Debug)]
pub enum ChainResult {
    Completed(PlaybackRequestContext),
    Terminated(PlaybackError),
    Deferred(DeferredChain),
}

pub struct PlaybackChain {
    name: &'static str,
    actions: Vec<Box<dyn PlaybackChainAction>>,
    executions: AtomicUsize,
}

impl PlaybackChain {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            actions: Vec::new(),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn with_action(mut self, action: impl PlaybackChainAction + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn action_names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Number of times `execute` was called
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Run all actions from the first
    pub fn execute(&self, context: PlaybackRequestContext, player: &mut Player) -> ChainResult {
        self.executions.fetch_add(1, Ordering::Relaxed);
        debug!(
            chain = self.name,
            token = %context.token,
            requested = ?context.requested_track,
            "Executing chain"
        );
        self.run_from(context, player, 0)
    }

    /// Continue a deferred execution
    pub fn resume(&self, deferred: DeferredChain, player: &mut Player) -> ChainResult {
        debug!(
            chain = self.name,
            token = %deferred.context.token,
            resume_at = deferred.resume_at,
            "Resuming chain"
        );
        self.run_from(deferred.context, player, deferred.resume_at)
    }

    fn run_from(
        &self,
        mut context: PlaybackRequestContext,
        player: &mut Player,
        from: usize,
    ) -> ChainResult {
        for (index, action) in self.actions.iter().enumerate().skip(from) {
            match action.run(&mut context, player) {
                ActionOutcome::Proceed => {}
                ActionOutcome::Terminate(error) => {
                    warn!(
                        chain = self.name,
                        action = action.name(),
                        token = %context.token,
                        error = %error,
                        "Chain terminated"
                    );
                    Self::terminate(&context, player, &error);
                    return ChainResult::Terminated(error);
                }
                ActionOutcome::Defer(reason) => {
                    // A delay re-runs its action once the timer fires
                    let resume_at = match reason {
                        DeferReason::Delay { .. } => index,
                        DeferReason::Transcoding => index + 1,
                    };
                    debug!(
                        chain = self.name,
                        action = action.name(),
                        token = %context.token,
                        ?reason,
                        "Chain deferred"
                    );
                    return ChainResult::Deferred(DeferredChain {
                        context,
                        reason,
                        resume_at,
                    });
                }
            }
        }
        ChainResult::Completed(context)
    }

    /// Surface `error` to observers and leave the player stopped
    pub fn terminate(context: &PlaybackRequestContext, player: &mut Player, error: &PlaybackError) {
        let failed = context.requested_track.as_ref().map(|t| t.to_info());
        let event = match (error, failed) {
            (PlaybackError::Transcoding { .. }, Some(track)) => PlayerEvent::TrackNotTranscoded {
                track,
                message: error.to_string(),
                timestamp: time::now(),
            },
            (_, track) => PlayerEvent::TrackNotPlayed {
                track,
                message: error.to_string(),
                timestamp: time::now(),
            },
        };
        player.publish(event);

        // Observers last saw either the player's own state or, after a halt,
        // the state recorded on the context
        let (begin_track, begin_state) = if player.state() != PlaybackState::NoTrack {
            (player.track().cloned(), player.state())
        } else {
            (context.current_track.clone(), context.current_state)
        };

        player.stop();
        if begin_state != PlaybackState::NoTrack {
            player.publish_transition(begin_track.as_ref(), begin_state, None);
        }
    }
}

/// The three chains driven by the delegate
pub struct PlaybackChains {
    pub start: PlaybackChain,
    pub stop: PlaybackChain,
    pub completed: PlaybackChain,
}

impl PlaybackChains {
    pub fn new(resources: &ChainResources) -> Self {
        Self {
            start: start_playback_chain(resources),
            stop: stop_playback_chain(resources),
            completed: track_playback_completed_chain(resources),
        }
    }
}
