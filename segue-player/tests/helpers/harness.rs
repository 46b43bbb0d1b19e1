//! A delegate wired to mock collaborators

use super::mocks::{ManualSink, MockSequencer, MockTranscoder, SyntheticPreparer};
use segue_common::{PlaybackState, PlayerEvent};
use segue_player::playback::{InMemoryGapStore, PlaybackDelegate, PlayerComponents};
use segue_player::{PlayerConfig, Track};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Small buffers so a few seconds of audio span several decode jobs
pub fn test_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.scheduling.immediate_playback_seconds = 0.5;
    config.scheduling.deferred_playback_seconds = 1.0;
    config
}

pub fn track(name: &str) -> Track {
    Track::new(format!("/music/{}.flac", name))
}

/// A track whose format requires transcoding
pub fn transcoded_track(name: &str) -> Track {
    Track::new(format!("/music/{}.wma", name))
}

/// `TrackTransition` reduced to comparable parts
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub begin_track: Option<Uuid>,
    pub begin_state: PlaybackState,
    pub end_track: Option<Uuid>,
    pub end_state: PlaybackState,
    pub has_gap_end: bool,
}

impl Transition {
    pub fn new(
        begin: Option<&Track>,
        begin_state: PlaybackState,
        end: Option<&Track>,
        end_state: PlaybackState,
    ) -> Self {
        Self {
            begin_track: begin.map(Track::id),
            begin_state,
            end_track: end.map(Track::id),
            end_state,
            has_gap_end: end_state == PlaybackState::Waiting,
        }
    }

    fn from_event(event: &PlayerEvent) -> Option<Self> {
        match event {
            PlayerEvent::TrackTransition {
                begin_track,
                begin_state,
                end_track,
                end_state,
                gap_end_time,
                ..
            } => Some(Self {
                begin_track: begin_track.as_ref().map(|t| t.track_id),
                begin_state: *begin_state,
                end_track: end_track.as_ref().map(|t| t.track_id),
                end_state: *end_state,
                has_gap_end: gap_end_time.is_some(),
            }),
            _ => None,
        }
    }
}

pub struct Harness {
    pub delegate: PlaybackDelegate,
    pub sink: Arc<ManualSink>,
    pub preparer: Arc<SyntheticPreparer>,
    pub sequencer: MockSequencer,
    pub transcoder: MockTranscoder,
    pub gap_store: Arc<InMemoryGapStore>,
    events: broadcast::Receiver<PlayerEvent>,
}

impl Harness {
    /// Three-second tracks with the test configuration
    pub fn new() -> Self {
        Self::with(test_config(), SyntheticPreparer::new(3.0))
    }

    pub fn with(config: PlayerConfig, preparer: SyntheticPreparer) -> Self {
        let sink = ManualSink::new();
        let preparer = Arc::new(preparer);
        let sequencer = MockSequencer::new();
        let transcoder = MockTranscoder::new();
        let gap_store = Arc::new(InMemoryGapStore::new());

        let delegate = PlaybackDelegate::new(
            &config,
            PlayerComponents {
                sink: sink.clone(),
                preparer: preparer.clone(),
                transcoder: Arc::new(transcoder.clone()),
                gap_store: gap_store.clone(),
                sequencer: Box::new(sequencer.clone()),
            },
        )
        .expect("delegate");
        let events = delegate.subscribe();

        Self {
            delegate,
            sink,
            preparer,
            sequencer,
            transcoder,
            gap_store,
            events,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.delegate.state()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.delegate.current_track()
    }

    /// Wait for queued decode jobs, then handle the events they produced
    pub fn settle(&mut self) -> usize {
        self.delegate.player().scheduler().wait_idle();
        self.delegate.process_pending_events()
    }

    /// Let the sink finish buffers until the engine reacts with an event
    ///
    /// Returns the number of buffers completed.
    pub fn play_until_event(&mut self) -> usize {
        let mut completed = 0;
        loop {
            if self.settle() > 0 {
                return completed;
            }
            assert!(self.sink.complete_next(), "playback stalled with nothing queued");
            completed += 1;
        }
    }

    /// Every observer event published since the last call
    pub fn take_events(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    /// Track transitions published since the last `take_*` call
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        self.take_events()
            .iter()
            .filter_map(Transition::from_event)
            .collect()
    }

    pub fn assert_playing(&self, track: &Track) {
        assert_eq!(self.state(), PlaybackState::Playing);
        assert_eq!(self.current_track().as_ref(), Some(track));
    }

    pub fn assert_state(&self, state: PlaybackState, track: Option<&Track>) {
        assert_eq!(self.state(), state);
        assert_eq!(self.current_track().as_ref(), track);
    }
}
