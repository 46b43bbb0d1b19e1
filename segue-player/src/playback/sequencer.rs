//! In-memory list sequencer

use crate::playback::collaborators::Sequencer;
use crate::track::Track;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Stop after the last track
    #[default]
    Off,
    /// Repeat the current track on natural completion
    One,
    /// Wrap around at either end of the list
    All,
}

/// Plays a fixed list of tracks in order
pub struct ListSequencer {
    tracks: Vec<Track>,
    cursor: Option<usize>,
    repeat: RepeatMode,
}

impl ListSequencer {
    pub fn new(tracks: Vec<Track>, repeat: RepeatMode) -> Self {
        Self {
            tracks,
            cursor: None,
            repeat,
        }
    }

    /// Select the first track
    pub fn begin(&mut self) -> Option<Track> {
        self.select(0)
    }

    pub fn current(&self) -> Option<&Track> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    fn select(&mut self, index: usize) -> Option<Track> {
        let track = self.tracks.get(index)?.clone();
        self.cursor = Some(index);
        Some(track)
    }

    fn step(&mut self, forward: bool) -> Option<Track> {
        let len = self.tracks.len();
        let cursor = self.cursor?;
        let wraps = self.repeat != RepeatMode::Off;

        let index = if forward {
            match cursor + 1 {
                i if i < len => i,
                _ if wraps => 0,
                _ => return None,
            }
        } else {
            match cursor.checked_sub(1) {
                Some(i) => i,
                None if wraps => len.checked_sub(1)?,
                None => return None,
            }
        };
        self.select(index)
    }
}

impl Sequencer for ListSequencer {
    fn subsequent(&mut self) -> Option<Track> {
        match self.repeat {
            RepeatMode::One => {
                let cursor = self.cursor?;
                self.select(cursor)
            }
            RepeatMode::Off => {
                let next = self.step(true);
                if next.is_none() {
                    self.cursor = None;
                }
                next
            }
            RepeatMode::All => self.step(true),
        }
    }

    fn next(&mut self) -> Option<Track> {
        self.step(true)
    }

    fn previous(&mut self) -> Option<Track> {
        self.step(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| Track::new(format!("/music/{}.flac", i)))
            .collect()
    }

    #[test]
    fn test_subsequent_runs_off_the_end() {
        let list = tracks(2);
        let mut seq = ListSequencer::new(list.clone(), RepeatMode::Off);

        assert_eq!(seq.begin(), Some(list[0].clone()));
        assert_eq!(seq.subsequent(), Some(list[1].clone()));
        assert_eq!(seq.subsequent(), None);
        assert!(seq.current().is_none());
    }

    #[test]
    fn test_repeat_one_replays_current() {
        let list = tracks(2);
        let mut seq = ListSequencer::new(list.clone(), RepeatMode::One);
        seq.begin();
        assert_eq!(seq.subsequent(), Some(list[0].clone()));
        // Explicit next still moves on
        assert_eq!(seq.next(), Some(list[1].clone()));
    }

    #[test]
    fn test_repeat_all_wraps_both_ways() {
        let list = tracks(3);
        let mut seq = ListSequencer::new(list.clone(), RepeatMode::All);
        seq.begin();
        assert_eq!(seq.previous(), Some(list[2].clone()));
        assert_eq!(seq.next(), Some(list[0].clone()));
    }

    #[test]
    fn test_previous_at_start_without_repeat() {
        let list = tracks(2);
        let mut seq = ListSequencer::new(list.clone(), RepeatMode::Off);
        seq.begin();
        assert_eq!(seq.previous(), None);
        assert_eq!(seq.current(), Some(&list[0]));
    }

    #[test]
    fn test_nothing_selected_yields_nothing() {
        let mut seq = ListSequencer::new(tracks(2), RepeatMode::All);
        assert_eq!(seq.next(), None);
        assert_eq!(seq.subsequent(), None);
    }
}
