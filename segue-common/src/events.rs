//! Event types for the Segue event system
//!
//! Provides the observer-facing event definitions and the EventBus used to
//! fan them out to UI, status bar, scrobblers and any other subscriber.
//!
//! Events are fire-and-forget. Each subscriber sees events in publish order;
//! no ordering is guaranteed across subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Player state as seen by observers
///
/// `NoTrack` doubles as the stopped state: once playback is stopped the player
/// no longer holds a track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing playing, nothing pending
    NoTrack,
    /// Audio is flowing
    Playing,
    /// A session exists but the sink is paused
    Paused,
    /// A gap (delay) is elapsing before the track starts
    Waiting,
    /// The track is being converted into a playable format
    Transcoding,
}

impl PlaybackState {
    /// True when a session is active (audio scheduled, whether or not it is flowing)
    pub fn is_playing_or_paused(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }

    /// True while a transition is parked waiting on a timer or the transcoder
    pub fn is_waiting_or_transcoding(&self) -> bool {
        matches!(self, PlaybackState::Waiting | PlaybackState::Transcoding)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::NoTrack => write!(f, "no_track"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Waiting => write!(f, "waiting"),
            PlaybackState::Transcoding => write!(f, "transcoding"),
        }
    }
}

/// Minimal, serializable description of a track for observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Stable track identifier
    pub track_id: Uuid,
    /// Human readable name (usually the file stem)
    pub display_name: String,
    /// Source file path
    pub path: String,
}

/// Segue event types
///
/// Events are broadcast via EventBus and can be serialized for any transport
/// an observer chooses to forward them over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// The player moved from one track/state to another
    ///
    /// Triggers:
    /// - UI: update now-playing display and controls
    /// - Status bar: show waiting countdown when `gap_end_time` is present
    TrackTransition {
        /// Track before the transition (None when nothing was active)
        begin_track: Option<TrackInfo>,
        /// State before the transition
        begin_state: PlaybackState,
        /// Track after the transition (None when playback stopped)
        end_track: Option<TrackInfo>,
        /// State after the transition
        end_state: PlaybackState,
        /// When the pending gap ends (only for transitions into `Waiting`)
        gap_end_time: Option<DateTime<Utc>>,
        /// When the transition happened
        timestamp: DateTime<Utc>,
    },

    /// A track could not be played (request, preparation or decode failure)
    TrackNotPlayed {
        /// The failing track, if one was requested
        track: Option<TrackInfo>,
        /// Human readable reason
        message: String,
        /// When the failure was detected
        timestamp: DateTime<Utc>,
    },

    /// A track could not be converted into a playable format
    TrackNotTranscoded {
        /// The failing track
        track: TrackInfo,
        /// Human readable reason
        message: String,
        /// When the failure was detected
        timestamp: DateTime<Utc>,
    },

    /// A track reached its natural end (all scheduled audio has played)
    PlaybackCompleted {
        /// The completed track
        track: TrackInfo,
        /// When playback completed
        timestamp: DateTime<Utc>,
    },

    /// Pause/resume without a track change
    PlaybackStateChanged {
        /// State before change
        old_state: PlaybackState,
        /// State after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: DateTime<Utc>,
    },

    /// The segment loop of the playing track was defined, completed or removed
    LoopChanged {
        /// Track the loop belongs to
        track: TrackInfo,
        /// Loop start in seconds (None when the loop was removed)
        start_time: Option<f64>,
        /// Loop end in seconds (None while the loop is only half-defined)
        end_time: Option<f64>,
        /// When the loop changed
        timestamp: DateTime<Utc>,
    },

    /// Playback position jumped
    TrackSeeked {
        /// Track being played
        track: TrackInfo,
        /// New position in seconds
        position: f64,
        /// When the seek happened
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::TrackTransition { .. } => "TrackTransition",
            PlayerEvent::TrackNotPlayed { .. } => "TrackNotPlayed",
            PlayerEvent::TrackNotTranscoded { .. } => "TrackNotTranscoded",
            PlayerEvent::PlaybackCompleted { .. } => "PlaybackCompleted",
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::LoopChanged { .. } => "LoopChanged",
            PlayerEvent::TrackSeeked { .. } => "TrackSeeked",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for player events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the player)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use segue_common::events::{EventBus, PlayerEvent, PlaybackState};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlayerEvent::PlaybackStateChanged {
///     old_state: PlaybackState::Playing,
///     new_state: PlaybackState::Paused,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers start lagging
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> TrackInfo {
        TrackInfo {
            track_id: Uuid::new_v4(),
            display_name: "Blue in Green".to_string(),
            path: "/music/blue_in_green.flac".to_string(),
        }
    }

    #[test]
    fn test_playback_state_predicates() {
        assert!(PlaybackState::Playing.is_playing_or_paused());
        assert!(PlaybackState::Paused.is_playing_or_paused());
        assert!(!PlaybackState::Waiting.is_playing_or_paused());

        assert!(PlaybackState::Waiting.is_waiting_or_transcoding());
        assert!(PlaybackState::Transcoding.is_waiting_or_transcoding());
        assert!(!PlaybackState::NoTrack.is_waiting_or_transcoding());
    }

    #[test]
    fn test_playback_state_serializes_snake_case() {
        let json = serde_json::to_string(&PlaybackState::NoTrack).unwrap();
        assert_eq!(json, "\"no_track\"");
        assert_eq!(PlaybackState::Transcoding.to_string(), "transcoding");
    }

    #[test]
    fn test_track_transition_serialization_is_tagged() {
        let event = PlayerEvent::TrackTransition {
            begin_track: None,
            begin_state: PlaybackState::NoTrack,
            end_track: Some(sample_track()),
            end_state: PlaybackState::Waiting,
            gap_end_time: Some(Utc::now()),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TrackTransition");
        assert_eq!(json["end_state"], "waiting");
        assert!(json["begin_track"].is_null());
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(10);
        let result = bus.emit(PlayerEvent::PlaybackStateChanged {
            old_state: PlaybackState::Playing,
            new_state: PlaybackState::Paused,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_subscribers_receive_in_publish_order() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let track = sample_track();
        bus.emit_lossy(PlayerEvent::PlaybackCompleted {
            track: track.clone(),
            timestamp: Utc::now(),
        });
        bus.emit_lossy(PlayerEvent::TrackSeeked {
            track,
            position: 12.5,
            timestamp: Utc::now(),
        });

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.try_recv().unwrap().event_type(), "PlaybackCompleted");
            assert_eq!(rx.try_recv().unwrap().event_type(), "TrackSeeked");
            assert!(rx.try_recv().is_err());
        }
    }
}
