//! Decode-ahead scheduler
//!
//! Keeps an audio sink continuously fed with decoded PCM for the current session,
//! optionally bounded to a loop region.
//!
//! **Module Structure:**
//! - `mod.rs`: types, lifecycle (load, pause, resume, stop)
//! - `decode_ahead.rs`: normal mode, decode jobs, buffer completions
//! - `looping.rs`: loop mode
//!
//! **Per-session state machine:**
//! `idle → decoding-initial → steady-state → draining → completed`
//!
//! Every (re)start creates a fresh [`SchedulingEpoch`] holding the outstanding
//! buffer count. True end of playback is *end reached* **and** *count == 0*; the
//! completion signal is sent at most once per epoch. Completions and decode jobs
//! belonging to an epoch that is no longer active, or a session that is no longer
//! current, are no-ops.
//!
//! **Locking:** `decoder` is taken before `active`. Sink completion handlers never
//! take `decoder`, so the scheduler may stop the sink while holding it.

mod decode_ahead;
mod looping;

use crate::audio::StreamDecoder;
use crate::config::SchedulingConfig;
use crate::playback::events::PlaybackEvent;
use crate::playback::session::{PlaybackSession, SessionManager};
use crate::playback::sink::AudioSink;
use crate::playback::work_queue::WorkQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Buffers scheduled in the sink but not yet finished playing
///
/// Saturates at zero: a stray extra completion can never drive it negative.
#[derive(Debug, Default)]
pub struct ScheduledBufferCount(AtomicUsize);

impl ScheduledBufferCount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new count
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the new count
    pub fn decrement(&self) -> usize {
        match self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scheduling state for one start/seek/loop pass of a session
pub(crate) struct SchedulingEpoch {
    session: PlaybackSession,
    /// Decoding is bounded to `[.., loop_end)` in loop mode
    loop_end: Option<f64>,
    count: ScheduledBufferCount,
    total_scheduled: AtomicUsize,
    end_reached: AtomicBool,
    completion_signalled: AtomicBool,
    decode_failures: AtomicU32,
    failure_signalled: AtomicBool,
    /// End of the last buffer that finished playing (start position until then)
    played_until: Mutex<f64>,
}

impl SchedulingEpoch {
    fn new(session: PlaybackSession, start_position: f64, loop_end: Option<f64>) -> Self {
        Self {
            session,
            loop_end,
            count: ScheduledBufferCount::new(),
            total_scheduled: AtomicUsize::new(0),
            end_reached: AtomicBool::new(false),
            completion_signalled: AtomicBool::new(false),
            decode_failures: AtomicU32::new(0),
            failure_signalled: AtomicBool::new(false),
            played_until: Mutex::new(start_position),
        }
    }

    fn end_reached(&self) -> bool {
        self.end_reached.load(Ordering::SeqCst)
    }
}

struct SchedulerInner {
    sink: Arc<dyn AudioSink>,
    sessions: SessionManager,
    work_queue: WorkQueue,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    config: SchedulingConfig,
    decoder: Mutex<Option<StreamDecoder>>,
    active: Mutex<Option<Arc<SchedulingEpoch>>>,
}

/// Decode-ahead scheduler handle
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create the scheduler and start its decode work queue
    pub fn new(
        sink: Arc<dyn AudioSink>,
        sessions: SessionManager,
        events: mpsc::UnboundedSender<PlaybackEvent>,
        config: SchedulingConfig,
    ) -> std::io::Result<Self> {
        let work_queue = WorkQueue::new("segue-decode", config.work_queue_capacity)?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                sink,
                sessions,
                work_queue,
                events,
                config,
                decoder: Mutex::new(None),
                active: Mutex::new(None),
            }),
        })
    }

    /// Install the decoder for the next session, replacing any previous one
    pub fn load_decoder(&self, decoder: StreamDecoder) {
        *self.inner.decoder.lock() = Some(decoder);
    }

    pub fn has_decoder(&self) -> bool {
        self.inner.decoder.lock().is_some()
    }

    pub fn pause(&self) {
        self.inner.sink.pause();
    }

    pub fn resume(&self) {
        self.inner.sink.play();
    }

    /// Stop output, discard queued buffers and release the decoder
    pub fn stop(&self) {
        let mut decoder = self.inner.decoder.lock();
        let previous = self.inner.active.lock().take();
        self.inner.sink.stop();
        *decoder = None;

        if let Some(epoch) = previous {
            debug!(session_id = epoch.session.id, "Scheduler stopped");
        }
    }

    /// Outstanding buffers of the active epoch
    pub fn scheduled_buffer_count(&self) -> usize {
        self.inner
            .active
            .lock()
            .as_ref()
            .map_or(0, |epoch| epoch.count.get())
    }

    /// The active epoch has decoded its last buffer
    pub fn end_reached(&self) -> bool {
        self.inner
            .active
            .lock()
            .as_ref()
            .is_some_and(|epoch| epoch.end_reached())
    }

    /// Session of the active epoch
    pub fn active_session(&self) -> Option<PlaybackSession> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|epoch| epoch.session.clone())
    }

    /// Track position reached by the active epoch, in seconds
    ///
    /// `None` once the epoch has finished or failed: there is nothing to resume.
    pub fn playback_position(&self) -> Option<f64> {
        let active = self.inner.active.lock();
        let epoch = active.as_ref()?;
        if epoch.completion_signalled.load(Ordering::SeqCst)
            || epoch.failure_signalled.load(Ordering::SeqCst)
        {
            return None;
        }
        let position = *epoch.played_until.lock();
        Some(position)
    }

    /// Block until queued decode jobs have run (tests and shutdown)
    pub fn wait_idle(&self) {
        self.inner.work_queue.wait_idle();
    }

    pub fn sink(&self) -> &Arc<dyn AudioSink> {
        &self.inner.sink
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.inner.work_queue.shutdown();
    }
}
