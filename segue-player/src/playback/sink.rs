//! Audio sink interface and the bundled real-time null sink
//!
//! A sink plays scheduled PCM buffers in the order they were scheduled and calls
//! each buffer's completion handler once it has finished playing. Handlers also
//! run (immediately) when the sink is stopped with buffers still queued, so the
//! scheduler's outstanding-buffer count always returns to zero.
//!
//! Handlers may run on any thread and must not block on the scheduler's decoder.

use crate::audio::PcmBuffer;
use crate::playback::session::PlaybackSession;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Called once a scheduled buffer has finished playing (or was discarded by `stop`)
pub type CompletionHandler = Box<dyn FnOnce(&PlaybackSession) + Send + 'static>;

/// Real-time audio output consumed by the scheduler
pub trait AudioSink: Send + Sync {
    /// Queue a buffer behind any already scheduled
    ///
    /// `seek_position` is set on the first buffer after a seek/start so that
    /// position reporting can be re-anchored.
    fn schedule_buffer(
        &self,
        buffer: PcmBuffer,
        session: &PlaybackSession,
        completion: CompletionHandler,
        seek_position: Option<f64>,
    );

    /// Start or resume output
    fn play(&self);

    /// Suspend output, keeping queued buffers
    fn pause(&self);

    /// Discard all queued buffers, running their completion handlers
    fn stop(&self);

    fn is_playing(&self) -> bool;
}

struct ScheduledBuffer {
    buffer: PcmBuffer,
    session: PlaybackSession,
    completion: CompletionHandler,
}

#[derive(Default)]
struct ClockState {
    queue: VecDeque<ScheduledBuffer>,
    playing: bool,
    /// Time already spent playing the head buffer
    head_elapsed: Duration,
    /// When the head buffer (re)started playing
    head_started: Option<Instant>,
    /// Bumped on every change that invalidates the clock task's current wait
    generation: u64,
    /// Track position reported at the last seek
    anchor: Option<f64>,
}

impl ClockState {
    fn settle_head(&mut self) {
        if let Some(started) = self.head_started.take() {
            self.head_elapsed += started.elapsed();
        }
    }
}

/// Sink that consumes buffers in real time without producing sound
///
/// Used by the command-line player and for soak testing: buffer completions
/// arrive at the same cadence a hardware device would produce them.
pub struct ClockedSink {
    state: Arc<Mutex<ClockState>>,
    notify: Arc<Notify>,
}

impl ClockedSink {
    /// Create the sink and spawn its clock task on the current tokio runtime
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(ClockState::default()));
        let notify = Arc::new(Notify::new());

        tokio::spawn(Self::clock_task(Arc::downgrade(&state), Arc::clone(&notify)));

        Self { state, notify }
    }

    /// Track position of the most recent seek, if any
    pub fn anchor(&self) -> Option<f64> {
        self.state.lock().anchor
    }

    /// Number of buffers scheduled and not yet finished
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    async fn clock_task(state: Weak<Mutex<ClockState>>, notify: Arc<Notify>) {
        loop {
            let next = {
                let Some(state) = state.upgrade() else { break };
                let mut s = state.lock();
                s.settle_head();
                match s.queue.front() {
                    Some(head) if s.playing => {
                        let remaining = head.buffer.duration().saturating_sub(s.head_elapsed);
                        s.head_started = Some(Instant::now());
                        Some((remaining, s.generation))
                    }
                    _ => None,
                }
            };

            let Some((remaining, generation)) = next else {
                notify.notified().await;
                continue;
            };

            tokio::select! {
                _ = tokio::time::sleep(remaining) => {
                    let finished = {
                        let Some(state) = state.upgrade() else { break };
                        let mut s = state.lock();
                        if s.generation == generation && s.playing {
                            s.head_elapsed = Duration::ZERO;
                            s.head_started = None;
                            s.queue.pop_front()
                        } else {
                            None
                        }
                    };
                    if let Some(done) = finished {
                        trace!(session_id = done.session.id, "Buffer finished playing");
                        (done.completion)(&done.session);
                    }
                }
                _ = notify.notified() => {}
            }
        }
        debug!("Clocked sink task exiting");
    }
}

impl Default for ClockedSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for ClockedSink {
    fn schedule_buffer(
        &self,
        buffer: PcmBuffer,
        session: &PlaybackSession,
        completion: CompletionHandler,
        seek_position: Option<f64>,
    ) {
        let was_empty = {
            let mut s = self.state.lock();
            if seek_position.is_some() {
                s.anchor = seek_position;
            }
            let was_empty = s.queue.is_empty();
            s.queue.push_back(ScheduledBuffer {
                buffer,
                session: session.clone(),
                completion,
            });
            if was_empty {
                s.generation += 1;
            }
            was_empty
        };
        if was_empty {
            self.notify.notify_one();
        }
    }

    fn play(&self) {
        {
            let mut s = self.state.lock();
            if s.playing {
                return;
            }
            s.playing = true;
            s.generation += 1;
        }
        self.notify.notify_one();
    }

    fn pause(&self) {
        {
            let mut s = self.state.lock();
            if !s.playing {
                return;
            }
            s.settle_head();
            s.playing = false;
            s.generation += 1;
        }
        self.notify.notify_one();
    }

    fn stop(&self) {
        let drained: Vec<ScheduledBuffer> = {
            let mut s = self.state.lock();
            s.playing = false;
            s.head_elapsed = Duration::ZERO;
            s.head_started = None;
            s.generation += 1;
            s.queue.drain(..).collect()
        };
        self.notify.notify_one();

        for done in drained {
            (done.completion)(&done.session);
        }
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }
}

impl Drop for ClockedSink {
    fn drop(&mut self) {
        self.notify.notify_one();
    }
}
