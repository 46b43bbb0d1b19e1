//! Test helpers for segue-player integration tests
//!
//! - Mocks: manual sink, synthetic frame source and preparer, sequencer, transcoder
//! - Harness: a fully wired delegate over the mocks
//! - Audio generator: WAV files for symphonia decode tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod harness;
pub mod mocks;

pub use harness::{test_config, track, transcoded_track, Harness, Transition};
pub use mocks::{ManualSink, MockSequencer, MockTranscoder, SineSource, SyntheticPreparer};
