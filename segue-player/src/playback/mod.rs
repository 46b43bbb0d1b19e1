//! Playback engine
//!
//! **Responsibilities:**
//! - Drive track transitions through playback chains (start, stop, completion)
//! - Honor gaps, transcoding and playback profiles on the way to playback
//! - Keep the audio sink fed through the decode-ahead scheduler
//! - Publish transitions and failures to observers
//!
//! **Module Structure:**
//! - `delegate.rs`: command entry point and event loop (owns everything below)
//! - `chain/`: chains and their actions
//! - `player.rs`: observable player state, loop handling
//! - `scheduler/`: decode-ahead scheduling on the decode work queue
//! - `context.rs`, `session.rs`, `gap.rs`, `profiles.rs`: request and session state
//! - `collaborators.rs`, `sequencer.rs`, `sink.rs`: external interfaces and bundled implementations
//! - `device_sink.rs`: cpal output (`device-output` feature)

pub mod chain;
pub mod collaborators;
pub mod context;
pub mod delegate;
#[cfg(feature = "device-output")]
pub mod device_sink;
pub mod events;
pub mod gap;
pub mod player;
pub mod profiles;
pub mod scheduler;
pub mod sequencer;
pub mod session;
pub mod sink;
pub mod work_queue;

pub use chain::{CompletionDecision, DeferReason, PlaybackChain, PlaybackChains};
pub use collaborators::{Sequencer, TranscodeResult, Transcoder, UnavailableTranscoder};
pub use context::{PlaybackRequestContext, RequestParams, RequestToken};
pub use delegate::{PlaybackDelegate, PlaybackHandle, PlayerCommand, PlayerComponents};
#[cfg(feature = "device-output")]
pub use device_sink::DeviceSink;
pub use events::PlaybackEvent;
pub use gap::{GapPosition, GapStore, GapType, InMemoryGapStore, PlaybackGap};
pub use player::{LoopToggle, Player};
pub use profiles::PlaybackProfiles;
pub use scheduler::Scheduler;
pub use sequencer::{ListSequencer, RepeatMode};
pub use session::{PlaybackLoop, PlaybackSession, SessionManager};
pub use sink::{AudioSink, ClockedSink, CompletionHandler};
