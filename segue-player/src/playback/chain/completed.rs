//! Natural track completion
//!
//! The completed chain only prepares the context (profile reset, gap after the
//! track). What happens next is a [`CompletionDecision`] taken by the delegate:
//! advance with the StartPlaybackChain or halt with the StopPlaybackChain.

use super::actions::{ChainResources, DelayAfterTrackCompletionAction, ResetPlaybackProfileAction};
use super::PlaybackChain;
use crate::playback::collaborators::Sequencer;
use crate::track::Track;

pub fn track_playback_completed_chain(resources: &ChainResources) -> PlaybackChain {
    PlaybackChain::new("TrackPlaybackCompletedChain")
        .with_action(ResetPlaybackProfileAction {
            profiles: resources.profiles.clone(),
        })
        .with_action(DelayAfterTrackCompletionAction {
            gap_store: resources.gap_store.clone(),
            gap_between_tracks: resources.gap_between_tracks,
        })
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionDecision {
    /// Continue with the subsequent track
    Advance(Track),
    /// Nothing follows; stop
    Halt,
}

impl CompletionDecision {
    pub fn decide(sequencer: &mut dyn Sequencer) -> Self {
        match sequencer.subsequent() {
            Some(track) => CompletionDecision::Advance(track),
            None => CompletionDecision::Halt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::sequencer::{ListSequencer, RepeatMode};

    #[test]
    fn test_decision_follows_sequencer() {
        let a = Track::new("/music/a.flac");
        let b = Track::new("/music/b.flac");
        let mut seq = ListSequencer::new(vec![a, b.clone()], RepeatMode::Off);
        seq.begin();

        assert_eq!(CompletionDecision::decide(&mut seq), CompletionDecision::Advance(b));
        assert_eq!(CompletionDecision::decide(&mut seq), CompletionDecision::Halt);
    }
}
