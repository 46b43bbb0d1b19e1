use super::actions::{
    ApplyPlaybackProfileAction, AudioFilePreparationAction, CancelTranscodingAction,
    ChainResources, HaltPlaybackAction, SetPlaybackDelayAction, StartPlaybackAction,
};
use super::PlaybackChain;

/// Begin playback of the requested track
pub fn start_playback_chain(resources: &ChainResources) -> PlaybackChain {
    PlaybackChain::new("StartPlaybackChain")
        .with_action(CancelTranscodingAction {
            transcoder: resources.transcoder.clone(),
        })
        .with_action(HaltPlaybackAction {
            profiles: resources.profiles.clone(),
        })
        .with_action(ApplyPlaybackProfileAction {
            profiles: resources.profiles.clone(),
        })
        .with_action(SetPlaybackDelayAction {
            gap_store: resources.gap_store.clone(),
        })
        .with_action(AudioFilePreparationAction {
            preparer: resources.preparer.clone(),
            transcoder: resources.transcoder.clone(),
        })
        .with_action(StartPlaybackAction {
            preparer: resources.preparer.clone(),
        })
}
