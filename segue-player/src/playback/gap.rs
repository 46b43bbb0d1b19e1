//! Playback gaps
//!
//! A gap is a pause inserted before or after a specific track. One-time gaps are
//! removed from the store once they have elapsed; persistent gaps stay.

use crate::track::Track;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPosition {
    BeforeTrack,
    AfterTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapType {
    /// Applied once, then removed
    OneTime,
    /// Applied every time the track plays
    Persistent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackGap {
    pub id: Uuid,
    pub duration: Duration,
    pub position: GapPosition,
    pub gap_type: GapType,
}

impl PlaybackGap {
    pub fn new(duration: Duration, position: GapPosition, gap_type: GapType) -> Self {
        Self {
            id: Uuid::new_v4(),
            duration,
            position,
            gap_type,
        }
    }

    pub fn is_one_time(&self) -> bool {
        self.gap_type == GapType::OneTime
    }
}

/// Gaps applied to the transition in flight
#[derive(Debug, Clone, Default)]
pub struct GapContext {
    gaps: Vec<PlaybackGap>,
}

impl GapContext {
    pub fn add(&mut self, gap: PlaybackGap) {
        self.gaps.push(gap);
    }

    pub fn clear(&mut self) {
        self.gaps.clear();
    }

    /// Effective pause: gaps overlap, so the longest one wins
    pub fn gap_length(&self) -> Option<Duration> {
        self.gaps.iter().map(|g| g.duration).max()
    }

    pub fn one_time_gaps(&self) -> impl Iterator<Item = &PlaybackGap> {
        self.gaps.iter().filter(|g| g.is_one_time())
    }
}

/// Playlist-side storage of per-track gaps
pub trait GapStore: Send + Sync {
    fn gap_before_track(&self, track: &Track) -> Option<PlaybackGap>;
    fn gap_after_track(&self, track: &Track) -> Option<PlaybackGap>;
    fn remove_gap(&self, gap: &PlaybackGap);
}

/// Gap store kept in memory
#[derive(Default)]
pub struct InMemoryGapStore {
    before: RwLock<HashMap<Uuid, PlaybackGap>>,
    after: RwLock<HashMap<Uuid, PlaybackGap>>,
}

impl InMemoryGapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a gap to a track, replacing any gap at the same position
    pub fn set_gap(&self, track: &Track, gap: PlaybackGap) {
        let map = match gap.position {
            GapPosition::BeforeTrack => &self.before,
            GapPosition::AfterTrack => &self.after,
        };
        map.write().insert(track.id(), gap);
    }

    pub fn len(&self) -> usize {
        self.before.read().len() + self.after.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GapStore for InMemoryGapStore {
    fn gap_before_track(&self, track: &Track) -> Option<PlaybackGap> {
        self.before.read().get(&track.id()).cloned()
    }

    fn gap_after_track(&self, track: &Track) -> Option<PlaybackGap> {
        self.after.read().get(&track.id()).cloned()
    }

    fn remove_gap(&self, gap: &PlaybackGap) {
        self.before.write().retain(|_, g| g.id != gap.id);
        self.after.write().retain(|_, g| g.id != gap.id);
    }
}
