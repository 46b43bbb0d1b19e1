//! Codec wrapper
//!
//! Wraps a single symphonia decoder instance and converts compressed packets into
//! [`BufferedFrame`]s of interleaved `f32` PCM stamped with their presentation time.

use super::frame_buffer::BufferedFrame;
use crate::error::DecodeError;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use symphonia::core::units::TimeBase;
use tracing::{debug, trace};

/// One decoder instance plus its conversion scratch buffer
pub struct AudioCodec {
    decoder: Box<dyn Decoder>,
    time_base: Option<TimeBase>,
    sample_rate: u32,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl AudioCodec {
    /// Instantiate a decoder for the given codec parameters
    pub fn new(params: &CodecParameters) -> Result<Self, DecodeError> {
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::UnsupportedFormat("sample rate not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

        Ok(Self {
            decoder,
            time_base: params.time_base,
            sample_rate,
            sample_buf: None,
        })
    }

    /// Convert a packet timestamp into seconds
    pub fn timestamp_secs(&self, ts: u64) -> f64 {
        match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                time.seconds as f64 + time.frac
            }
            None => ts as f64 / self.sample_rate as f64,
        }
    }

    /// Decode one packet
    ///
    /// Returns `Ok(None)` when the packet produced no audio (e.g. encoder priming).
    /// A corrupt packet is reported as [`DecodeError::CorruptPacket`]; the caller
    /// decides whether to skip it.
    pub fn decode(&mut self, packet: &Packet) -> Result<Option<BufferedFrame>, DecodeError> {
        let decoded = match self.decoder.decode(packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                return Err(DecodeError::CorruptPacket(msg.to_string()));
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            trace!("Packet produced no audio");
            return Ok(None);
        }

        let channels = spec.channels.count();
        let needs_alloc = self
            .sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < frames * channels);
        if needs_alloc {
            self.sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        let samples = match self.sample_buf.as_mut() {
            Some(buf) => {
                buf.copy_interleaved_ref(decoded);
                buf.samples().to_vec()
            }
            None => return Ok(None),
        };

        let timestamp = self.timestamp_secs(packet.ts());
        Ok(Some(BufferedFrame::new(timestamp, channels as u16, samples)))
    }

    /// Flush the codec at end of stream
    pub fn drain(&mut self) {
        let result = self.decoder.finalize();
        if let Some(ok) = result.verify_ok {
            debug!(verified = ok, "Codec drained");
        }
    }

    /// Discard codec state before decoding from a new position
    pub fn flush_buffers(&mut self) {
        self.decoder.reset();
    }
}
