//! Normal-mode decode-ahead scheduling
//!
//! **Responsibilities:**
//! - Seek, decode and schedule the immediate buffer synchronously
//! - Keep one lookahead buffer queued via work-queue decode jobs
//! - Detect true end of playback (end reached && count == 0) exactly once
//! - Report decode failures that stop playback from continuing

use super::{Scheduler, SchedulerInner, SchedulingEpoch};
use crate::audio::StreamDecoder;
use crate::error::{DecodeError, PlaybackError};
use crate::playback::events::PlaybackEvent;
use crate::playback::session::PlaybackSession;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

impl Scheduler {
    /// Start scheduling `session` from `start_position` (seconds)
    ///
    /// Stops the sink, seeks, decodes and schedules the immediate buffer on the
    /// calling thread, and queues the first lookahead decode. The sink is started
    /// when `begin_playback` is set and at least one buffer was scheduled.
    pub fn play_track(
        &self,
        session: &PlaybackSession,
        start_position: f64,
        begin_playback: bool,
    ) -> Result<(), PlaybackError> {
        self.inner
            .begin(session, start_position, None, begin_playback)
    }
}

impl SchedulerInner {
    pub(super) fn begin(
        self: &Arc<Self>,
        session: &PlaybackSession,
        start_position: f64,
        loop_end: Option<f64>,
        begin_playback: bool,
    ) -> Result<(), PlaybackError> {
        let mut guard = self.decoder.lock();
        let decoder = guard
            .as_mut()
            .ok_or_else(|| PlaybackError::Decode("no decoder loaded".to_string()))?;

        let epoch = Arc::new(SchedulingEpoch::new(session.clone(), start_position, loop_end));
        *self.active.lock() = Some(Arc::clone(&epoch));

        // Old buffers complete against the superseded epoch and are ignored
        self.sink.stop();

        decoder.seek(start_position)?;
        let scheduled = self.decode_immediate(decoder, &epoch, start_position)?;
        drop(guard);

        debug!(
            session_id = session.id,
            track = %session.track,
            start_position,
            ?loop_end,
            scheduled,
            "Scheduling started"
        );

        if epoch.end_reached() {
            if epoch.count.get() == 0 {
                self.signal_completion(&epoch);
            }
        } else {
            self.enqueue_decode(&epoch);
        }

        if scheduled && begin_playback {
            self.sink.play();
        }
        Ok(())
    }

    /// Decode and schedule the first buffer, retrying past decode errors
    fn decode_immediate(
        self: &Arc<Self>,
        decoder: &mut StreamDecoder,
        epoch: &Arc<SchedulingEpoch>,
        start_position: f64,
    ) -> Result<bool, DecodeError> {
        let frames = self.config.immediate_frames(decoder.format().sample_rate);
        let mut failures = 0;
        loop {
            match self.decode_and_schedule(decoder, epoch, frames, Some(start_position)) {
                Ok(scheduled) => return Ok(scheduled),
                Err(e) => {
                    failures += 1;
                    if failures >= self.config.max_consecutive_decode_errors {
                        return Err(e);
                    }
                    warn!(session_id = epoch.session.id, failures, error = %e, "Immediate decode failed, retrying");
                }
            }
        }
    }

    /// Decode up to `max_frames` and hand the result to the sink
    ///
    /// Returns whether a buffer was scheduled. The count is incremented before
    /// `end_reached` is published so a concurrent completion can never observe
    /// end-of-stream with a count that excludes this buffer.
    fn decode_and_schedule(
        self: &Arc<Self>,
        decoder: &mut StreamDecoder,
        epoch: &Arc<SchedulingEpoch>,
        max_frames: usize,
        seek_position: Option<f64>,
    ) -> Result<bool, DecodeError> {
        let buffer = match epoch.loop_end {
            Some(loop_end) => decoder.decode_loop(max_frames, loop_end)?,
            None => decoder.decode(max_frames)?,
        };
        let reached = match epoch.loop_end {
            Some(_) => decoder.end_of_loop(),
            None => decoder.eof(),
        };

        if buffer.is_empty() {
            if reached {
                epoch.end_reached.store(true, Ordering::SeqCst);
            }
            return Ok(false);
        }

        let pcm = buffer.into_pcm();
        let end_time = pcm.end_time();
        let outstanding = epoch.count.increment();
        epoch.total_scheduled.fetch_add(1, Ordering::SeqCst);
        if reached {
            epoch.end_reached.store(true, Ordering::SeqCst);
        }

        trace!(
            session_id = epoch.session.id,
            start = pcm.start_time,
            frames = pcm.frame_count,
            outstanding,
            end_reached = reached,
            "Scheduling buffer"
        );

        let weak = Arc::downgrade(self);
        let completed_epoch = Arc::clone(epoch);
        self.sink.schedule_buffer(
            pcm,
            &epoch.session,
            Box::new(move |session| {
                if let Some(inner) = weak.upgrade() {
                    inner.buffer_completed(&completed_epoch, session, end_time);
                }
            }),
            seek_position,
        );
        Ok(true)
    }

    /// Queue a lookahead decode for the epoch
    fn enqueue_decode(self: &Arc<Self>, epoch: &Arc<SchedulingEpoch>) {
        let weak = Arc::downgrade(self);
        let job_epoch = Arc::clone(epoch);
        let queued = self.work_queue.enqueue(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_decode_job(&job_epoch);
            }
        }));

        if !queued {
            self.decode_failed(
                epoch,
                PlaybackError::Decode("decode work queue is full".to_string()),
            );
        }
    }

    /// Work-queue job: decode and schedule one lookahead buffer
    ///
    /// A failed decode is retried in place while queued audio keeps playback
    /// going, so one bad stretch does not leave the sink without a lookahead.
    fn run_decode_job(self: &Arc<Self>, epoch: &Arc<SchedulingEpoch>) {
        loop {
            let mut guard = self.decoder.lock();
            if !self.is_active(epoch) {
                trace!(session_id = epoch.session.id, "Dropping stale decode job");
                return;
            }
            let Some(decoder) = guard.as_mut() else {
                return;
            };

            let frames = self.config.deferred_frames(decoder.format().sample_rate);
            let result = self.decode_and_schedule(decoder, epoch, frames, None);
            drop(guard);

            match result {
                Ok(_) => {
                    epoch.decode_failures.store(0, Ordering::SeqCst);
                    if epoch.end_reached() && epoch.count.get() == 0 {
                        self.signal_completion(epoch);
                    }
                    return;
                }
                Err(e) => {
                    if self.decode_failed(epoch, e.into()) {
                        return;
                    }
                    debug!(session_id = epoch.session.id, "Retrying lookahead decode");
                }
            }
        }
    }

    /// Sink callback: one buffer of the epoch finished playing
    fn buffer_completed(
        self: &Arc<Self>,
        epoch: &Arc<SchedulingEpoch>,
        session: &PlaybackSession,
        end_time: f64,
    ) {
        let remaining = epoch.count.decrement();

        if !self.is_active(epoch) {
            trace!(session_id = session.id, "Ignoring completion for stale session");
            return;
        }
        *epoch.played_until.lock() = end_time;

        if !epoch.end_reached() {
            self.enqueue_decode(epoch);
        } else if remaining == 0 {
            self.signal_completion(epoch);
        }
    }

    /// Record a failed decode task; give up once failures pile up or nothing
    /// remains queued to keep playback alive
    ///
    /// Returns true when decoding for the epoch should not be retried.
    fn decode_failed(&self, epoch: &Arc<SchedulingEpoch>, error: PlaybackError) -> bool {
        let failures = epoch.decode_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            session_id = epoch.session.id,
            track = %epoch.session.track,
            failures,
            error = %error,
            "Decode task failed"
        );

        if !self.is_active(epoch) {
            return true;
        }

        let exhausted = failures >= self.config.max_consecutive_decode_errors;
        if !exhausted && epoch.count.get() > 0 {
            return false;
        }

        if !epoch.failure_signalled.swap(true, Ordering::SeqCst) {
            error!(
                session_id = epoch.session.id,
                track = %epoch.session.track,
                "Decoding cannot continue"
            );
            let _ = self.events.send(PlaybackEvent::DecodeFailed {
                session: epoch.session.clone(),
                error,
            });
        }
        true
    }

    /// Report end of playback (or of one loop pass) once per epoch
    fn signal_completion(&self, epoch: &Arc<SchedulingEpoch>) {
        if epoch.completion_signalled.swap(true, Ordering::SeqCst) {
            return;
        }

        // A loop region that produced no audio cannot be repeated
        let looped = epoch.loop_end.is_some() && epoch.total_scheduled.load(Ordering::SeqCst) > 0;
        let event = if looped {
            PlaybackEvent::LoopCompleted {
                session: epoch.session.clone(),
            }
        } else {
            PlaybackEvent::SessionCompleted {
                session: epoch.session.clone(),
            }
        };

        debug!(
            session_id = epoch.session.id,
            event = event.name(),
            "Scheduled playback finished"
        );
        if self.events.send(event).is_err() {
            debug!("Playback event receiver closed");
        }
    }

    fn is_active(&self, epoch: &Arc<SchedulingEpoch>) -> bool {
        self.sessions.is_current(&epoch.session)
            && self
                .active
                .lock()
                .as_ref()
                .is_some_and(|active| Arc::ptr_eq(active, epoch))
    }
}
