//! Integration tests for the decode-ahead scheduler
//!
//! Tests double buffering, end-of-stream detection, stale sessions, loop mode
//! and decode failure reporting against a manual sink.

mod helpers;

use helpers::{ManualSink, SineSource};
use segue_player::config::SchedulingConfig;
use segue_player::playback::{PlaybackEvent, PlaybackLoop, Scheduler, SessionManager};
use segue_player::Track;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Fixture {
    scheduler: Scheduler,
    sink: Arc<ManualSink>,
    sessions: SessionManager,
    events: mpsc::UnboundedReceiver<PlaybackEvent>,
    track: Track,
}

fn fixture() -> Fixture {
    let sink = ManualSink::new();
    let sessions = SessionManager::new();
    let (tx, events) = mpsc::unbounded_channel();
    let config = SchedulingConfig {
        immediate_playback_seconds: 0.5,
        deferred_playback_seconds: 1.0,
        ..SchedulingConfig::default()
    };
    let scheduler = Scheduler::new(sink.clone(), sessions.clone(), tx, config).expect("scheduler");

    Fixture {
        scheduler,
        sink,
        sessions,
        events,
        track: Track::new("/music/sine.flac"),
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn test_keeps_one_buffer_ahead_and_completes_once() {
    let mut f = fixture();
    f.scheduler.load_decoder(SineSource::new(1000, 1, 3.0).into_decoder());
    let session = f.sessions.start(&f.track, None);

    f.scheduler.play_track(&session, 0.0, true).unwrap();
    assert_eq!(f.sink.play_calls(), 1);
    assert_eq!(f.sink.seek_positions(), vec![0.0]);

    f.scheduler.wait_idle();
    assert_eq!(
        f.sink.queued_buffers(),
        vec![(0.0, 500, session.id), (0.5, 1000, session.id)]
    );
    assert_eq!(f.scheduler.scheduled_buffer_count(), 2);

    // Steady state: every completion is replaced by one lookahead buffer
    assert!(f.sink.complete_next());
    f.scheduler.wait_idle();
    assert_eq!(f.sink.queued(), 2);
    assert_eq!(f.sink.queued_buffers()[1].0, 1.5);

    assert!(f.sink.complete_next());
    f.scheduler.wait_idle();
    assert!(f.scheduler.end_reached());
    assert_eq!(f.sink.queued_buffers()[1], (2.5, 500, session.id));

    // Draining: nothing more is decoded and completion waits for the last buffer
    assert!(f.sink.complete_next());
    f.scheduler.wait_idle();
    assert!(drain(&mut f.events).is_empty());
    assert_eq!(f.scheduler.scheduled_buffer_count(), 1);

    assert!(f.sink.complete_next());
    f.scheduler.wait_idle();
    assert_eq!(f.scheduler.scheduled_buffer_count(), 0);
    assert_eq!(f.sink.scheduled_total(), 4);

    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        PlaybackEvent::SessionCompleted { session: done } => assert_eq!(done.id, session.id),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!f.sink.complete_next());
}

#[test]
fn test_track_ending_on_buffer_boundary_completes() {
    let mut f = fixture();
    // 0.5 + 1.0 + 1.0: the last lookahead decode finds nothing left
    f.scheduler.load_decoder(SineSource::new(1000, 1, 2.5).into_decoder());
    let session = f.sessions.start(&f.track, None);
    f.scheduler.play_track(&session, 0.0, true).unwrap();

    let mut completed = 0;
    loop {
        f.scheduler.wait_idle();
        if !f.sink.complete_next() {
            break;
        }
        completed += 1;
    }
    f.scheduler.wait_idle();

    assert_eq!(completed, 3);
    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], PlaybackEvent::SessionCompleted { .. }));
}

#[test]
fn test_start_at_end_of_stream_completes_immediately() {
    let mut f = fixture();
    f.scheduler.load_decoder(SineSource::new(1000, 1, 3.0).into_decoder());
    let session = f.sessions.start(&f.track, None);

    f.scheduler.play_track(&session, 5.0, true).unwrap();
    f.scheduler.wait_idle();

    assert_eq!(f.sink.play_calls(), 0);
    assert_eq!(f.sink.queued(), 0);
    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], PlaybackEvent::SessionCompleted { .. }));
}

#[test]
fn test_paused_start_schedules_without_playing() {
    let f = fixture();
    f.scheduler.load_decoder(SineSource::new(1000, 1, 3.0).into_decoder());
    let session = f.sessions.start(&f.track, None);

    f.scheduler.play_track(&session, 1.0, false).unwrap();
    f.scheduler.wait_idle();

    assert_eq!(f.sink.play_calls(), 0);
    assert_eq!(f.sink.queued_buffers()[0].0, 1.0);

    f.scheduler.resume();
    assert!(f.sink.is_playing_now());
}

#[test]
fn test_superseded_session_is_ignored() {
    let mut f = fixture();
    f.scheduler.load_decoder(SineSource::new(1000, 1, 3.0).into_decoder());
    let first = f.sessions.start(&f.track, None);
    f.scheduler.play_track(&first, 0.0, true).unwrap();
    f.scheduler.wait_idle();

    // Seek: same decoder, new session
    let second = f.sessions.start(&f.track, None);
    f.scheduler.play_track(&second, 2.0, true).unwrap();
    f.scheduler.wait_idle();

    let queued = f.sink.queued_buffers();
    assert!(queued.iter().all(|(_, _, id)| *id == second.id));
    assert_eq!(queued[0].0, 2.0);
    assert_eq!(f.scheduler.scheduled_buffer_count(), 2);
    assert!(drain(&mut f.events).is_empty());
}

#[test]
fn test_stop_discards_buffers_and_decoder() {
    let mut f = fixture();
    f.scheduler.load_decoder(SineSource::new(1000, 1, 3.0).into_decoder());
    let session = f.sessions.start(&f.track, None);
    f.scheduler.play_track(&session, 0.0, true).unwrap();
    f.scheduler.wait_idle();

    f.sessions.end_current();
    f.scheduler.stop();
    f.scheduler.wait_idle();

    assert_eq!(f.sink.queued(), 0);
    assert_eq!(f.scheduler.scheduled_buffer_count(), 0);
    assert!(!f.scheduler.has_decoder());
    assert!(drain(&mut f.events).is_empty());
    assert!(f.scheduler.play_track(&session, 0.0, true).is_err());
}

#[test]
fn test_loop_is_bounded_and_repeats() {
    let mut f = fixture();
    f.scheduler.load_decoder(SineSource::new(1000, 1, 3.0).into_decoder());
    let session = f.sessions.start(&f.track, Some(PlaybackLoop::new(0.5, 1.2)));

    f.scheduler.play_loop(&session, 0.5, 1.2, true).unwrap();
    f.scheduler.wait_idle();
    assert_eq!(f.scheduler.active_loop_end(), Some(1.2));
    assert_eq!(
        f.sink.queued_buffers(),
        vec![(0.5, 500, session.id), (1.0, 200, session.id)]
    );

    for pass in 0..3 {
        while f.sink.complete_next() {
            f.scheduler.wait_idle();
        }
        let events = drain(&mut f.events);
        assert_eq!(events.len(), 1, "pass {}", pass);
        assert!(matches!(events[0], PlaybackEvent::LoopCompleted { .. }));

        assert!(f.scheduler.replay_loop(&session, true).unwrap());
        f.scheduler.wait_idle();
        assert_eq!(f.sink.queued_buffers()[0].0, 0.5);
    }
}

#[test]
fn test_loop_past_end_of_stream_completes_session() {
    let mut f = fixture();
    f.scheduler.load_decoder(SineSource::new(1000, 1, 1.0).into_decoder());
    let session = f.sessions.start(&f.track, Some(PlaybackLoop::new(2.0, 2.5)));

    f.scheduler.play_loop(&session, 2.0, 2.5, true).unwrap();
    f.scheduler.wait_idle();

    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], PlaybackEvent::SessionCompleted { .. }));
}

#[test]
fn test_decode_failure_reported_once() {
    let mut f = fixture();
    f.scheduler
        .load_decoder(SineSource::new(1000, 1, 3.0).failing_at(0.8).into_decoder());
    let session = f.sessions.start(&f.track, None);

    f.scheduler.play_track(&session, 0.0, true).unwrap();
    f.scheduler.wait_idle();
    // Audio decoded before the failure is still scheduled
    assert_eq!(
        f.sink.queued_buffers(),
        vec![(0.0, 500, session.id), (0.5, 300, session.id)]
    );
    assert!(drain(&mut f.events).is_empty());

    // The next lookahead keeps failing until the retries run out
    assert!(f.sink.complete_next());
    f.scheduler.wait_idle();
    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        PlaybackEvent::DecodeFailed { session: failed, .. } => assert_eq!(failed.id, session.id),
        other => panic!("unexpected event {:?}", other),
    }

    assert!(f.sink.complete_next());
    f.scheduler.wait_idle();
    assert!(!f.sink.complete_next());
    assert!(drain(&mut f.events).is_empty());
}

#[test]
fn test_damaged_chunk_keeps_decoded_audio_and_lookahead() {
    let mut f = fixture();
    f.scheduler
        .load_decoder(SineSource::new(1000, 1, 3.0).failing_once_at(1.4).into_decoder());
    let session = f.sessions.start(&f.track, None);

    f.scheduler.play_track(&session, 0.0, true).unwrap();
    f.scheduler.wait_idle();
    assert_eq!(
        f.sink.queued_buffers(),
        vec![(0.0, 500, session.id), (0.5, 900, session.id)]
    );

    // Only the damaged 0.1 s is missing, and a lookahead is queued again
    assert!(f.sink.complete_next());
    f.scheduler.wait_idle();
    assert_eq!(
        f.sink.queued_buffers(),
        vec![(0.5, 900, session.id), (1.5, 1000, session.id)]
    );

    while f.sink.complete_next() {
        f.scheduler.wait_idle();
    }
    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], PlaybackEvent::SessionCompleted { .. }));
}

#[test]
fn test_damaged_chunk_in_immediate_buffer_does_not_fail_start() {
    let mut f = fixture();
    f.scheduler
        .load_decoder(SineSource::new(1000, 1, 3.0).failing_once_at(0.0).into_decoder());
    let session = f.sessions.start(&f.track, None);

    f.scheduler.play_track(&session, 0.0, true).unwrap();
    f.scheduler.wait_idle();

    assert_eq!(f.sink.play_calls(), 1);
    assert_eq!(f.sink.queued_buffers()[0], (0.1, 500, session.id));
}
