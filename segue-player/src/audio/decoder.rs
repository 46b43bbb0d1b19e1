//! Positioned stream decoding
//!
//! [`StreamDecoder`] decodes up to N sample frames at a time from the current
//! position, either unbounded (until end of stream) or bounded by a loop end.
//! The underlying packet source is abstracted behind [`FrameSource`] so that
//! scheduling can be exercised with synthetic audio.
//!
//! **Edge semantics:**
//! - The final buffer of a stream or loop may hold fewer frames than requested, or
//!   slightly more (frames are never split except at a loop end).
//! - Decoding after end of stream / end of loop is a no-op returning an empty buffer.
//! - Seeking clears both end flags.
//! - A source error after some audio was decoded returns that audio; the error is
//!   reported by the next decode call instead.

use super::codec::AudioCodec;
use super::frame_buffer::{AudioFormat, BufferedFrame, FrameBuffer};
use crate::error::DecodeError;
use std::fs::File;
use std::path::Path;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Source of decoded frames in presentation order
pub trait FrameSource: Send {
    fn format(&self) -> AudioFormat;

    /// Total duration in seconds, when known
    fn duration(&self) -> Option<f64>;

    /// Reposition so the next frame starts at `position` seconds
    fn seek(&mut self, position: f64) -> Result<(), DecodeError>;

    /// Decode the next frame; `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<BufferedFrame>, DecodeError>;

    /// Flush any codec-internal state once end of stream is reached
    fn drain(&mut self) {}
}

/// Corrupt packets skipped in a row before the source gives up
const MAX_SKIPPED_PACKETS: u32 = 8;

enum Pulled {
    Frame(BufferedFrame),
    End,
    /// Failed with audio already in the buffer; the error is held back
    Interrupted,
}

/// Frame source with end-of-stream and end-of-loop bookkeeping
pub struct StreamDecoder {
    source: Box<dyn FrameSource>,
    eof: bool,
    end_of_loop: bool,
    held_error: Option<DecodeError>,
}

impl StreamDecoder {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            eof: false,
            end_of_loop: false,
            held_error: None,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.source.format()
    }

    pub fn duration(&self) -> Option<f64> {
        self.source.duration()
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn end_of_loop(&self) -> bool {
        self.end_of_loop
    }

    pub fn seek(&mut self, position: f64) -> Result<(), DecodeError> {
        self.source.seek(position.max(0.0))?;
        self.eof = false;
        self.end_of_loop = false;
        self.held_error = None;
        Ok(())
    }

    /// Decode up to `max_frames` sample frames from the current position
    pub fn decode(&mut self, max_frames: usize) -> Result<FrameBuffer, DecodeError> {
        let mut buffer = FrameBuffer::new(self.format(), max_frames);
        if self.eof {
            return Ok(buffer);
        }
        if let Some(e) = self.held_error.take() {
            return Err(e);
        }

        while !buffer.is_full() {
            match self.pull(&buffer)? {
                Pulled::Frame(frame) => buffer.append_frame(frame),
                Pulled::End => {
                    self.reached_eof();
                    break;
                }
                Pulled::Interrupted => break,
            }
        }

        Ok(buffer)
    }

    /// Decode up to `max_frames` sample frames, never producing audio at or past `loop_end`
    ///
    /// The frame straddling `loop_end` is truncated. End of stream before `loop_end`
    /// also counts as end of loop.
    pub fn decode_loop(&mut self, max_frames: usize, loop_end: f64) -> Result<FrameBuffer, DecodeError> {
        let format = self.format();
        let mut buffer = FrameBuffer::new(format, max_frames);
        if self.eof || self.end_of_loop {
            return Ok(buffer);
        }
        if let Some(e) = self.held_error.take() {
            return Err(e);
        }

        while !buffer.is_full() {
            let mut frame = match self.pull(&buffer)? {
                Pulled::Frame(frame) => frame,
                Pulled::End => {
                    self.reached_eof();
                    self.end_of_loop = true;
                    break;
                }
                Pulled::Interrupted => break,
            };

            if frame.timestamp >= loop_end {
                self.end_of_loop = true;
                break;
            }

            if frame.end_time(format.sample_rate) >= loop_end {
                let keep = ((loop_end - frame.timestamp) * format.sample_rate as f64).round() as usize;
                frame.truncate_frames(keep);
                buffer.append_frame(frame);
                self.end_of_loop = true;
                break;
            }

            buffer.append_frame(frame);
        }

        Ok(buffer)
    }

    fn pull(&mut self, buffer: &FrameBuffer) -> Result<Pulled, DecodeError> {
        match self.source.next_frame() {
            Ok(Some(frame)) => Ok(Pulled::Frame(frame)),
            Ok(None) => Ok(Pulled::End),
            Err(e) if !buffer.is_empty() => {
                warn!(error = %e, frames = buffer.frame_count(), "Decode interrupted, keeping decoded audio");
                self.held_error = Some(e);
                Ok(Pulled::Interrupted)
            }
            Err(e) => Err(e),
        }
    }

    fn reached_eof(&mut self) {
        if !self.eof {
            self.source.drain();
            self.eof = true;
            debug!("Decoder reached end of stream");
        }
    }
}

/// File-backed frame source using symphonia
pub struct SymphoniaSource {
    reader: Box<dyn FormatReader>,
    codec: AudioCodec,
    track_id: u32,
    format: AudioFormat,
    duration: Option<f64>,
    /// Frames before this position are discarded after an accurate seek
    skip_until: Option<f64>,
    /// A seek landed past the end of the stream
    exhausted: bool,
    skipped_packets: u32,
}

impl SymphoniaSource {
    /// Probe a file and open a decoder for its first audio track
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;

        let params = track.codec_params.clone();
        let track_id = track.id;

        let codec = AudioCodec::new(&params)?;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let format = AudioFormat::new(codec_sample_rate(&params)?, channels);

        let duration = match (params.n_frames, params.time_base) {
            (Some(frames), Some(tb)) => {
                let time = tb.calc_time(frames);
                Some(time.seconds as f64 + time.frac)
            }
            (Some(frames), None) => Some(format.frames_to_seconds(frames as usize)),
            _ => None,
        };

        debug!(
            path = %path.display(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            ?duration,
            "Opened audio source"
        );

        Ok(Self {
            reader,
            codec,
            track_id,
            format,
            duration,
            skip_until: None,
            exhausted: false,
            skipped_packets: 0,
        })
    }
}

fn codec_sample_rate(params: &symphonia::core::codecs::CodecParameters) -> Result<u32, DecodeError> {
    params
        .sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("sample rate not found".to_string()))
}

impl FrameSource for SymphoniaSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn seek(&mut self, position: f64) -> Result<(), DecodeError> {
        let seek_to = SeekTo::Time {
            time: Time::from(position),
            track_id: Some(self.track_id),
        };

        match self.reader.seek(SeekMode::Accurate, seek_to) {
            Ok(seeked) => {
                self.codec.flush_buffers();
                self.skip_until = Some(self.codec.timestamp_secs(seeked.required_ts));
                self.exhausted = false;
                Ok(())
            }
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => {
                debug!(position, "Seek past end of stream");
                self.codec.flush_buffers();
                self.skip_until = None;
                self.exhausted = true;
                Ok(())
            }
            Err(e) => Err(DecodeError::Seek(e.to_string())),
        }
    }

    fn next_frame(&mut self) -> Result<Option<BufferedFrame>, DecodeError> {
        if self.exhausted {
            return Ok(None);
        }

        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Decoder reset required for track list change");
                    return Err(DecodeError::Packet("track list changed".to_string()));
                }
                Err(e) => return Err(DecodeError::Packet(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let mut frame = match self.codec.decode(&packet) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(DecodeError::CorruptPacket(msg)) if self.skipped_packets < MAX_SKIPPED_PACKETS => {
                    self.skipped_packets += 1;
                    warn!(ts = packet.ts(), skipped = self.skipped_packets, "Decode error in packet, skipping: {}", msg);
                    continue;
                }
                Err(e) => {
                    self.skipped_packets = 0;
                    return Err(e);
                }
            };
            self.skipped_packets = 0;

            if let Some(required) = self.skip_until {
                if frame.end_time(self.format.sample_rate) <= required {
                    continue;
                }
                let skip = ((required - frame.timestamp) * self.format.sample_rate as f64).round();
                if skip > 0.0 {
                    frame.skip_leading_frames(skip as usize, self.format.sample_rate);
                }
                self.skip_until = None;
            }

            return Ok(Some(frame));
        }
    }

    fn drain(&mut self) {
        self.codec.drain();
    }
}
