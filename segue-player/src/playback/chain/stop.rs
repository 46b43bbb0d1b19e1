use super::actions::{
    CancelTranscodingAction, ChainResources, HaltPlaybackAction, StopPlaybackAction,
};
use super::PlaybackChain;

/// Stop playback (or waiting/transcoding) and return to `NoTrack`
pub fn stop_playback_chain(resources: &ChainResources) -> PlaybackChain {
    PlaybackChain::new("StopPlaybackChain")
        .with_action(CancelTranscodingAction {
            transcoder: resources.transcoder.clone(),
        })
        .with_action(HaltPlaybackAction {
            profiles: resources.profiles.clone(),
        })
        .with_action(StopPlaybackAction)
}
