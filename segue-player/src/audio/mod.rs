//! Audio decoding layer
//!
//! **Responsibilities:**
//! - Wrap one symphonia codec instance (decode, drain, flush)
//! - Decode positioned, size-bounded chunks (normal and loop-bounded)
//! - Probe tracks and open decoders for them

pub mod codec;
pub mod decoder;
pub mod frame_buffer;
pub mod preparer;

pub use codec::AudioCodec;
pub use decoder::{FrameSource, StreamDecoder, SymphoniaSource};
pub use frame_buffer::{AudioFormat, BufferedFrame, FrameBuffer, PcmBuffer};
pub use preparer::{SymphoniaPreparer, TrackPreparer};
