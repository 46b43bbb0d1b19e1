//! Per-track playback profiles
//!
//! Remembers where playback of a track should resume. A profile is saved on every
//! seek and when the track is stopped or replaced mid-playback, applied when the
//! track is started without an explicit start position, and forgotten when the
//! track plays to its natural end.

use crate::track::Track;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackProfile {
    pub track_id: Uuid,
    /// Resume position in seconds
    pub last_position: f64,
}

#[derive(Default)]
pub struct PlaybackProfiles {
    profiles: RwLock<HashMap<Uuid, PlaybackProfile>>,
}

impl PlaybackProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, track: &Track, position: f64) {
        let profile = PlaybackProfile {
            track_id: track.id(),
            last_position: position.max(0.0),
        };
        self.profiles.write().insert(track.id(), profile);
    }

    pub fn get(&self, track: &Track) -> Option<PlaybackProfile> {
        self.profiles.read().get(&track.id()).copied()
    }

    pub fn remove(&self, track: &Track) -> Option<PlaybackProfile> {
        self.profiles.write().remove(&track.id())
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_get_remove() {
        let profiles = PlaybackProfiles::new();
        let track = Track::new("/music/audiobook.mp3");

        profiles.save(&track, 1234.5);
        assert_eq!(profiles.get(&track).map(|p| p.last_position), Some(1234.5));

        profiles.save(&track, -3.0);
        assert_eq!(profiles.get(&track).map(|p| p.last_position), Some(0.0));

        assert!(profiles.remove(&track).is_some());
        assert!(profiles.is_empty());
    }
}
