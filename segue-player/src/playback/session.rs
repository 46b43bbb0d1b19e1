//! Playback sessions
//!
//! A [`PlaybackSession`] identifies one epoch of playback of one track. Every
//! asynchronous completion (buffer finished, decode job, loop end) carries the
//! session it was created for and is discarded unless that session is still the
//! current one.
//!
//! At most one session is current at a time. Starting a session supersedes the
//! previous one; ending the current session leaves none current.

use crate::track::Track;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Bounded region of a track that repeats once entered
///
/// `end_time` is `None` while the loop is only half-defined (start marked, end not yet).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackLoop {
    pub start_time: f64,
    pub end_time: Option<f64>,
}

impl PlaybackLoop {
    /// Half-defined loop starting at `start_time`
    pub fn starting_at(start_time: f64) -> Self {
        Self {
            start_time,
            end_time: None,
        }
    }

    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time: Some(end_time),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// Loop bounds, once both ends are defined
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.end_time.map(|end| (self.start_time, end))
    }

    /// True when `position` falls inside `[start_time, end_time)`
    pub fn contains(&self, position: f64) -> bool {
        match self.end_time {
            Some(end) => position >= self.start_time && position < end,
            None => position >= self.start_time,
        }
    }
}

/// One playback epoch for one track
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: u64,
    pub track: Track,
    pub playback_loop: Option<PlaybackLoop>,
    pub created_at: Instant,
}

#[derive(Default)]
struct SessionState {
    /// Id of the current session (0 = none)
    current: AtomicU64,
    last_issued: AtomicU64,
}

/// Issues sessions and tracks which one is current
///
/// Clones share state; the scheduler's work queue and the delegate hold clones.
#[derive(Clone, Default)]
pub struct SessionManager(Arc<SessionState>);

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, superseding the current one
    pub fn start(&self, track: &Track, playback_loop: Option<PlaybackLoop>) -> PlaybackSession {
        let id = self.0.last_issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.current.store(id, Ordering::SeqCst);
        PlaybackSession {
            id,
            track: track.clone(),
            playback_loop,
            created_at: Instant::now(),
        }
    }

    /// Invalidate the current session without starting another
    pub fn end_current(&self) {
        self.0.current.store(0, Ordering::SeqCst);
    }

    pub fn is_current(&self, session: &PlaybackSession) -> bool {
        self.is_current_id(session.id)
    }

    pub fn is_current_id(&self, id: u64) -> bool {
        id != 0 && self.0.current.load(Ordering::SeqCst) == id
    }

    /// Id of the current session, if any
    pub fn current_id(&self) -> Option<u64> {
        match self.0.current.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_supersedes_previous() {
        let sessions = SessionManager::new();
        let track = Track::new("/music/a.flac");

        let first = sessions.start(&track, None);
        assert!(sessions.is_current(&first));

        let second = sessions.start(&track, None);
        assert!(!sessions.is_current(&first));
        assert!(sessions.is_current(&second));
        assert!(second.id > first.id);
    }

    #[test]
    fn test_end_current_leaves_none_current() {
        let sessions = SessionManager::new();
        let session = sessions.start(&Track::new("/music/a.flac"), None);

        sessions.end_current();
        assert!(!sessions.is_current(&session));
        assert_eq!(sessions.current_id(), None);
    }

    #[test]
    fn test_clones_share_current_session() {
        let sessions = SessionManager::new();
        let clone = sessions.clone();
        let session = sessions.start(&Track::new("/music/a.flac"), None);
        assert!(clone.is_current(&session));
    }

    #[test]
    fn test_loop_contains() {
        let half = PlaybackLoop::starting_at(10.0);
        assert!(!half.is_complete());
        assert!(half.contains(50.0));
        assert!(!half.contains(5.0));

        let full = PlaybackLoop::new(10.0, 20.0);
        assert_eq!(full.bounds(), Some((10.0, 20.0)));
        assert!(full.contains(10.0));
        assert!(!full.contains(20.0));
    }
}
