//! Decoded frame containers
//!
//! A [`BufferedFrame`] is the output of decoding one packet. A [`FrameBuffer`]
//! accumulates whole frames until it holds the requested number of sample frames,
//! then converts into a [`PcmBuffer`] that an audio sink can play.
//!
//! Terminology: a *sample frame* is one sample per channel. Sample data is always
//! interleaved `f32`.

use std::time::Duration;

/// Stream format of decoded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Seconds covered by `frames` sample frames
    pub fn frames_to_seconds(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}

/// PCM produced by decoding a single packet
#[derive(Debug, Clone)]
pub struct BufferedFrame {
    /// Presentation time of the first sample frame, in seconds
    pub timestamp: f64,
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl BufferedFrame {
    pub fn new(timestamp: f64, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            timestamp,
            channels: channels.max(1),
            samples,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Presentation time just past the last sample frame
    pub fn end_time(&self, sample_rate: u32) -> f64 {
        self.timestamp + self.frame_count() as f64 / sample_rate as f64
    }

    /// Keep only the first `frames` sample frames
    pub fn truncate_frames(&mut self, frames: usize) {
        let keep = frames.min(self.frame_count()) * self.channels as usize;
        self.samples.truncate(keep);
    }

    /// Drop the first `frames` sample frames, advancing the timestamp
    pub fn skip_leading_frames(&mut self, frames: usize, sample_rate: u32) {
        let frames = frames.min(self.frame_count());
        self.samples.drain(..frames * self.channels as usize);
        self.timestamp += frames as f64 / sample_rate as f64;
    }
}

/// Accumulates decoded frames up to a target size
#[derive(Debug)]
pub struct FrameBuffer {
    format: AudioFormat,
    max_frames: usize,
    frames: Vec<BufferedFrame>,
    frame_count: usize,
}

impl FrameBuffer {
    pub fn new(format: AudioFormat, max_frames: usize) -> Self {
        Self {
            format,
            max_frames,
            frames: Vec::new(),
            frame_count: 0,
        }
    }

    /// Append a whole decoded frame
    ///
    /// Frames are never split, so the final count may exceed `max_frames` by up to
    /// one packet.
    pub fn append_frame(&mut self, frame: BufferedFrame) {
        if frame.is_empty() {
            return;
        }
        self.frame_count += frame.frame_count();
        self.frames.push(frame);
    }

    pub fn is_full(&self) -> bool {
        self.frame_count >= self.max_frames
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Timestamp of the first buffered frame
    pub fn start_time(&self) -> Option<f64> {
        self.frames.first().map(|f| f.timestamp)
    }

    /// Concatenate all frames into one playable buffer
    pub fn into_pcm(self) -> PcmBuffer {
        let start_time = self.start_time().unwrap_or(0.0);
        let mut samples = Vec::with_capacity(self.frame_count * self.format.channels as usize);
        for frame in self.frames {
            samples.extend_from_slice(&frame.samples);
        }
        PcmBuffer {
            format: self.format,
            start_time,
            frame_count: self.frame_count,
            samples,
        }
    }
}

/// Interleaved PCM ready for a sink
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    pub format: AudioFormat,
    /// Track position of the first sample frame, in seconds
    pub start_time: f64,
    pub frame_count: usize,
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    /// Playback time of this buffer
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.format.frames_to_seconds(self.frame_count))
    }

    /// Track position just past the last sample frame
    pub fn end_time(&self) -> f64 {
        self.start_time + self.format.frames_to_seconds(self.frame_count)
    }
}
