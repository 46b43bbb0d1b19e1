//! Mock collaborators

use parking_lot::Mutex;
use segue_player::audio::{
    AudioFormat, BufferedFrame, FrameSource, PcmBuffer, StreamDecoder, TrackPreparer,
};
use segue_player::config::TranscodingConfig;
use segue_player::playback::{
    AudioSink, CompletionHandler, PlaybackSession, Sequencer, TranscodeResult, Transcoder,
};
use segue_player::{DecodeError, PlaybackError, Track};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ----------------------------------------------------------------------
// Sink
// ----------------------------------------------------------------------

struct Scheduled {
    buffer: PcmBuffer,
    session: PlaybackSession,
    completion: CompletionHandler,
}

#[derive(Default)]
struct ManualSinkState {
    queue: VecDeque<Scheduled>,
    playing: bool,
    play_calls: usize,
    pause_calls: usize,
    stop_calls: usize,
    scheduled_total: usize,
    seek_positions: Vec<f64>,
}

/// Sink whose buffers only finish when the test says so
#[derive(Default)]
pub struct ManualSink {
    state: Mutex<ManualSinkState>,
}

impl ManualSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Finish the head buffer; returns false when nothing is queued
    pub fn complete_next(&self) -> bool {
        let next = self.state.lock().queue.pop_front();
        match next {
            Some(done) => {
                (done.completion)(&done.session);
                true
            }
            None => false,
        }
    }

    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// (start time, frame count, session id) of every queued buffer
    pub fn queued_buffers(&self) -> Vec<(f64, usize, u64)> {
        self.state
            .lock()
            .queue
            .iter()
            .map(|s| (s.buffer.start_time, s.buffer.frame_count, s.session.id))
            .collect()
    }

    pub fn is_playing_now(&self) -> bool {
        self.state.lock().playing
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    pub fn pause_calls(&self) -> usize {
        self.state.lock().pause_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    pub fn scheduled_total(&self) -> usize {
        self.state.lock().scheduled_total
    }

    pub fn seek_positions(&self) -> Vec<f64> {
        self.state.lock().seek_positions.clone()
    }
}

impl AudioSink for ManualSink {
    fn schedule_buffer(
        &self,
        buffer: PcmBuffer,
        session: &PlaybackSession,
        completion: CompletionHandler,
        seek_position: Option<f64>,
    ) {
        let mut state = self.state.lock();
        if let Some(position) = seek_position {
            state.seek_positions.push(position);
        }
        state.scheduled_total += 1;
        state.queue.push_back(Scheduled {
            buffer,
            session: session.clone(),
            completion,
        });
    }

    fn play(&self) {
        let mut state = self.state.lock();
        state.playing = true;
        state.play_calls += 1;
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.pause_calls += 1;
    }

    fn stop(&self) {
        let drained: Vec<Scheduled> = {
            let mut state = self.state.lock();
            state.playing = false;
            state.stop_calls += 1;
            state.queue.drain(..).collect()
        };
        for done in drained {
            (done.completion)(&done.session);
        }
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }
}

// ----------------------------------------------------------------------
// Frame source and preparer
// ----------------------------------------------------------------------

/// Mono/stereo 440 Hz sine, `chunk` frames per decoded frame
pub struct SineSource {
    format: AudioFormat,
    total_frames: usize,
    position: usize,
    chunk: usize,
    fail_at: Option<usize>,
    fail_once: bool,
}

impl SineSource {
    pub fn new(sample_rate: u32, channels: u16, seconds: f64) -> Self {
        Self {
            format: AudioFormat::new(sample_rate, channels),
            total_frames: (seconds * sample_rate as f64).round() as usize,
            position: 0,
            chunk: 100,
            fail_at: None,
            fail_once: false,
        }
    }

    pub fn with_chunk(mut self, frames: usize) -> Self {
        self.chunk = frames.max(1);
        self
    }

    /// Every decode at or past `seconds` fails
    pub fn failing_at(mut self, seconds: f64) -> Self {
        self.fail_at = Some((seconds * self.format.sample_rate as f64).round() as usize);
        self
    }

    /// One damaged chunk at `seconds`; its audio is lost and decoding continues after it
    pub fn failing_once_at(mut self, seconds: f64) -> Self {
        self.fail_once = true;
        self.failing_at(seconds)
    }

    pub fn into_decoder(self) -> StreamDecoder {
        StreamDecoder::new(Box::new(self))
    }
}

impl FrameSource for SineSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn duration(&self) -> Option<f64> {
        Some(self.format.frames_to_seconds(self.total_frames))
    }

    fn seek(&mut self, position: f64) -> Result<(), DecodeError> {
        self.position = (position * self.format.sample_rate as f64).round() as usize;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<BufferedFrame>, DecodeError> {
        if let Some(fail_at) = self.fail_at {
            if self.position >= fail_at {
                if self.fail_once {
                    self.fail_at = None;
                    self.position += self.chunk;
                    return Err(DecodeError::CorruptPacket("synthetic damaged chunk".to_string()));
                }
                return Err(DecodeError::Packet("synthetic decode failure".to_string()));
            }
        }
        if self.position >= self.total_frames {
            return Ok(None);
        }

        let mut frames = self.chunk.min(self.total_frames - self.position);
        if let Some(fail_at) = self.fail_at {
            frames = frames.min(fail_at - self.position);
        }

        let rate = self.format.sample_rate as f32;
        let channels = self.format.channels as usize;
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = (self.position + i) as f32 / rate;
            let value = (2.0 * PI * 440.0 * t).sin() * 0.5;
            samples.extend(std::iter::repeat(value).take(channels));
        }

        let timestamp = self.position as f64 / self.format.sample_rate as f64;
        self.position += frames;
        Ok(Some(BufferedFrame::new(timestamp, self.format.channels, samples)))
    }
}

/// Preparer producing sine decoders instead of opening files
///
/// Tracks whose file stem starts with `broken` fail preparation.
pub struct SyntheticPreparer {
    sample_rate: u32,
    duration: f64,
    fail_decode_at: Option<f64>,
    transcoding: TranscodingConfig,
    prepared: AtomicUsize,
    opened: AtomicUsize,
}

impl SyntheticPreparer {
    pub fn new(duration: f64) -> Self {
        Self {
            sample_rate: 1000,
            duration,
            fail_decode_at: None,
            transcoding: TranscodingConfig::default(),
            prepared: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn failing_decode_at(mut self, seconds: f64) -> Self {
        self.fail_decode_at = Some(seconds);
        self
    }

    pub fn prepare_calls(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl TrackPreparer for SyntheticPreparer {
    fn prepare(&self, track: &Track) -> Result<(), PlaybackError> {
        self.prepared.fetch_add(1, Ordering::SeqCst);

        let info = track.info();
        if let Some(err) = info.preparation_error {
            return Err(err);
        }
        if info.prepared_for_playback || info.needs_transcoding {
            return Ok(());
        }

        if track.display_name().starts_with("broken") {
            let err = PlaybackError::Preparation {
                track: track.display_name().to_string(),
                message: "unreadable file".to_string(),
            };
            track.mark_preparation_failed(err.clone());
            return Err(err);
        }

        if let Some(ext) = track.extension() {
            if self.transcoding.needs_transcoding(&ext) {
                track.mark_needs_transcoding();
                return Ok(());
            }
        }

        track.mark_prepared(AudioFormat::new(self.sample_rate, 1), Some(self.duration));
        Ok(())
    }

    fn open_decoder(&self, _track: &Track) -> Result<StreamDecoder, PlaybackError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut source = SineSource::new(self.sample_rate, 1, self.duration);
        if let Some(at) = self.fail_decode_at {
            source = source.failing_at(at);
        }
        Ok(source.into_decoder())
    }
}

// ----------------------------------------------------------------------
// Sequencer
// ----------------------------------------------------------------------

#[derive(Default)]
struct SequencerState {
    subsequent: Option<Track>,
    next: Option<Track>,
    previous: Option<Track>,
    subsequent_calls: usize,
    next_calls: usize,
    previous_calls: usize,
}

/// Sequencer returning whatever the test configured; clones share state
#[derive(Clone, Default)]
pub struct MockSequencer {
    state: Arc<Mutex<SequencerState>>,
}

impl MockSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_subsequent(&self, track: Option<Track>) {
        self.state.lock().subsequent = track;
    }

    pub fn set_next(&self, track: Option<Track>) {
        self.state.lock().next = track;
    }

    pub fn set_previous(&self, track: Option<Track>) {
        self.state.lock().previous = track;
    }

    pub fn subsequent_calls(&self) -> usize {
        self.state.lock().subsequent_calls
    }

    pub fn next_calls(&self) -> usize {
        self.state.lock().next_calls
    }

    pub fn previous_calls(&self) -> usize {
        self.state.lock().previous_calls
    }
}

impl Sequencer for MockSequencer {
    fn subsequent(&mut self) -> Option<Track> {
        let mut state = self.state.lock();
        state.subsequent_calls += 1;
        state.subsequent.clone()
    }

    fn next(&mut self) -> Option<Track> {
        let mut state = self.state.lock();
        state.next_calls += 1;
        state.next.clone()
    }

    fn previous(&mut self) -> Option<Track> {
        let mut state = self.state.lock();
        state.previous_calls += 1;
        state.previous.clone()
    }
}

// ----------------------------------------------------------------------
// Transcoder
// ----------------------------------------------------------------------

struct TranscoderState {
    result: TranscodeResult,
    transcoded: Vec<Track>,
    cancelled: Vec<Track>,
}

/// Transcoder with a configurable immediate result; clones share state
#[derive(Clone)]
pub struct MockTranscoder {
    state: Arc<Mutex<TranscoderState>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(TranscoderState {
                result: TranscodeResult::InProgress,
                transcoded: Vec::new(),
                cancelled: Vec::new(),
            })),
        }
    }
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&self, result: TranscodeResult) {
        self.state.lock().result = result;
    }

    pub fn transcode_calls(&self) -> Vec<Track> {
        self.state.lock().transcoded.clone()
    }

    pub fn cancel_calls(&self) -> Vec<Track> {
        self.state.lock().cancelled.clone()
    }
}

impl Transcoder for MockTranscoder {
    fn transcode_immediately(&self, track: &Track) -> TranscodeResult {
        let mut state = self.state.lock();
        state.transcoded.push(track.clone());
        state.result.clone()
    }

    fn cancel(&self, track: &Track) {
        self.state.lock().cancelled.push(track.clone());
    }
}
