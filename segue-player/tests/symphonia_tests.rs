//! Decode tests against real files
//!
//! WAV files are generated with hound and decoded through symphonia, then
//! played end to end through the clocked sink.

mod helpers;

use helpers::audio_generator::generate_sine_wav;
use helpers::{test_config, MockSequencer};
use segue_common::{PlaybackState, PlayerEvent};
use segue_player::audio::{SymphoniaPreparer, TrackPreparer};
use segue_player::config::TranscodingConfig;
use segue_player::playback::{
    ClockedSink, InMemoryGapStore, PlaybackDelegate, PlayerComponents, UnavailableTranscoder,
};
use segue_player::{PlaybackError, Track};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn preparer() -> SymphoniaPreparer {
    SymphoniaPreparer::new(TranscodingConfig::default())
}

fn sine_track(dir: &TempDir, name: &str, sample_rate: u32, duration_ms: u64) -> Track {
    let path = dir.path().join(format!("{}.wav", name));
    generate_sine_wav(&path, sample_rate, 1, duration_ms).expect("write wav");
    Track::new(path)
}

#[test]
fn test_prepare_probes_format_and_duration() {
    let dir = TempDir::new().unwrap();
    let track = sine_track(&dir, "tone", 8000, 2000);

    preparer().prepare(&track).unwrap();

    let info = track.info();
    assert!(info.validated);
    assert!(info.prepared_for_playback);
    assert!(!info.needs_transcoding);
    let format = info.format.unwrap();
    assert_eq!(format.sample_rate, 8000);
    assert_eq!(format.channels, 1);
    let duration = info.duration.unwrap();
    assert!((duration - 2.0).abs() < 0.01, "duration {}", duration);
}

#[test]
fn test_decoder_reads_whole_stream() {
    let dir = TempDir::new().unwrap();
    let track = sine_track(&dir, "tone", 8000, 2000);
    let mut decoder = preparer().open_decoder(&track).unwrap();

    let mut total = 0;
    let mut first_start = None;
    while !decoder.eof() {
        let buffer = decoder.decode(4000).unwrap();
        if first_start.is_none() {
            first_start = buffer.start_time();
        }
        total += buffer.frame_count();
    }

    assert_eq!(first_start, Some(0.0));
    assert_eq!(total, 16000);
    assert!(decoder.decode(4000).unwrap().is_empty());
}

#[test]
fn test_decoder_seek_is_sample_accurate() {
    let dir = TempDir::new().unwrap();
    let track = sine_track(&dir, "tone", 8000, 2000);
    let mut decoder = preparer().open_decoder(&track).unwrap();

    decoder.seek(1.0).unwrap();
    let buffer = decoder.decode(800).unwrap();

    let start = buffer.start_time().unwrap();
    assert!((start - 1.0).abs() < 0.001, "start {}", start);
    assert!(buffer.frame_count() >= 800);
}

#[test]
fn test_decode_loop_stops_at_loop_end() {
    let dir = TempDir::new().unwrap();
    let track = sine_track(&dir, "tone", 8000, 2000);
    let mut decoder = preparer().open_decoder(&track).unwrap();

    decoder.seek(0.5).unwrap();
    let buffer = decoder.decode_loop(16000, 0.75).unwrap();

    assert!(decoder.end_of_loop());
    assert!(!decoder.eof());
    let pcm = buffer.into_pcm();
    assert!((pcm.end_time() - 0.75).abs() < 0.001, "end {}", pcm.end_time());
}

#[test]
fn test_missing_file_failure_is_cached() {
    let dir = TempDir::new().unwrap();
    let track = Track::new(dir.path().join("missing.wav"));
    let preparer = preparer();

    let first = preparer.prepare(&track).unwrap_err();
    assert!(matches!(first, PlaybackError::Preparation { .. }));

    let info = track.info();
    assert!(info.validated);
    assert_eq!(info.preparation_error.as_ref(), Some(&first));

    // Second attempt replays the cached failure
    assert_eq!(preparer.prepare(&track).unwrap_err(), first);
}

#[test]
fn test_transcoded_extension_is_not_probed() {
    let track = Track::new(PathBuf::from("/nonexistent/legacy.WMA"));

    preparer().prepare(&track).unwrap();

    assert!(track.needs_transcoding());
    assert!(track.awaiting_transcode());
    assert!(!track.info().prepared_for_playback);
}

#[tokio::test]
async fn test_plays_file_to_completion_through_clocked_sink() {
    let dir = TempDir::new().unwrap();
    let track = sine_track(&dir, "short", 8000, 1200);

    let mut delegate = PlaybackDelegate::new(
        &test_config(),
        PlayerComponents {
            sink: Arc::new(ClockedSink::new()),
            preparer: Arc::new(preparer()),
            transcoder: Arc::new(UnavailableTranscoder),
            gap_store: Arc::new(InMemoryGapStore::new()),
            sequencer: Box::new(MockSequencer::new()),
        },
    )
    .unwrap();
    let mut events = delegate.subscribe();

    delegate.play(track.clone());
    assert_eq!(delegate.state(), PlaybackState::Playing);

    tokio::time::timeout(Duration::from_secs(10), async {
        while delegate.state() != PlaybackState::NoTrack {
            assert!(delegate.next_event().await);
        }
    })
    .await
    .expect("track should finish playing");

    let mut types = Vec::new();
    while let Ok(event) = events.try_recv() {
        types.push(event.event_type());
        if let PlayerEvent::PlaybackCompleted { track: done, .. } = event {
            assert_eq!(done.track_id, track.id());
        }
    }
    assert_eq!(
        types,
        vec!["TrackTransition", "PlaybackCompleted", "TrackTransition"]
    );
}
