//! Playback state machine.
//!
//! Drives the abstract player capability through load → play → loop.  The
//! controller never terminates on its own: a signage display keeps playing
//! something until the process dies.  Per-item failures degrade to
//! "skip forward, or wrap to the start" — they are never fatal.
//!
//! The controller is pure: it consumes [`PlayerEvent`]s and returns
//! [`Effect`]s for the session coordinator to act on.  Index changes are
//! always emitted before play confirmations, so the coordinator knows which
//! record is current when telemetry is evaluated.

use tracing::{debug, info};

/// Lifecycle events from the underlying player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The current item stalled or is still filling its buffer.
    Buffering,
    /// Enough is buffered to render — the item is genuinely playing.
    Ready,
    /// An item finished.  Under repeat-all this is a no-op; the player
    /// advances (or wraps) by itself and reports the index change.
    Ended,
    /// The player moved to a different queue index.
    ItemChanged(usize),
    /// The current item failed to play.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    ErrorRecovering,
}

impl PlaybackState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::ErrorRecovering => "error-recovering",
        }
    }
}

/// What the coordinator must do in response to an event, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// The current queue index changed.  Reported before any telemetry.
    IndexChanged(usize),
    /// A new item was confirmed actually playing — fire telemetry for it.
    ConfirmedPlaying(usize),
    /// Reissue play at this index (error recovery: advance, or wrap to 0).
    RequestPlay(usize),
}

#[derive(Debug, Default)]
pub struct PlaybackController {
    state: PlaybackState,
    queue_len: usize,
    current: Option<usize>,
    /// Whether the current visit to `current` has already been confirmed.
    /// Reset on every index change, so a later loop over the same index
    /// counts as a new visit.
    confirmed_current: bool,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Begin playback of a freshly built queue.  Returns false (and stays
    /// idle) for an empty queue.
    pub fn start(&mut self, queue_len: usize) -> bool {
        if queue_len == 0 {
            self.state = PlaybackState::Idle;
            return false;
        }
        info!("playback starting: {} items, repeat-all", queue_len);
        self.queue_len = queue_len;
        self.current = None;
        self.confirmed_current = false;
        self.state = PlaybackState::Loading;
        true
    }

    pub fn on_event(&mut self, event: PlayerEvent) -> Vec<Effect> {
        if self.state == PlaybackState::Idle {
            // Nothing loaded; startup chatter from the player is ignored.
            return Vec::new();
        }

        let mut effects = Vec::new();
        match event {
            PlayerEvent::ItemChanged(index) => {
                debug!("item changed: {:?} -> {}", self.current, index);
                self.current = Some(index);
                self.confirmed_current = false;
                effects.push(Effect::IndexChanged(index));
            }

            PlayerEvent::Ready => {
                self.state = PlaybackState::Playing;
                if let Some(index) = self.current {
                    if !self.confirmed_current {
                        self.confirmed_current = true;
                        effects.push(Effect::ConfirmedPlaying(index));
                    }
                }
            }

            PlayerEvent::Buffering => {
                if matches!(self.state, PlaybackState::Playing | PlaybackState::Loading) {
                    self.state = PlaybackState::Loading;
                }
            }

            PlayerEvent::Ended => {
                // Repeat-all wraps by itself; the following ItemChanged and
                // Ready events carry the loop forward.
            }

            PlayerEvent::Error => {
                let next = match self.current {
                    Some(index) if index + 1 < self.queue_len => index + 1,
                    _ => 0,
                };
                info!(
                    "playback error at {:?}, recovering to index {}",
                    self.current, next
                );
                self.state = PlaybackState::ErrorRecovering;
                effects.push(Effect::RequestPlay(next));
            }
        }
        effects
    }

    /// Called by the coordinator once a recovery play command has been
    /// dispatched to the player.
    pub fn note_play_reissued(&mut self) {
        if self.state == PlaybackState::ErrorRecovering {
            self.state = PlaybackState::Loading;
        }
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn started(queue_len: usize) -> PlaybackController {
        let mut c = PlaybackController::new();
        assert!(c.start(queue_len));
        c
    }

    #[test]
    fn test_empty_queue_stays_idle() {
        let mut c = PlaybackController::new();
        assert!(!c.start(0));
        assert_eq!(c.state(), PlaybackState::Idle);
        assert!(c.on_event(PlayerEvent::Ready).is_empty());
    }

    #[test]
    fn test_load_then_play_confirms_once() {
        let mut c = started(3);
        assert_eq!(
            c.on_event(PlayerEvent::ItemChanged(0)),
            vec![Effect::IndexChanged(0)]
        );
        assert_eq!(
            c.on_event(PlayerEvent::Ready),
            vec![Effect::ConfirmedPlaying(0)]
        );
        assert_eq!(c.state(), PlaybackState::Playing);

        // A redundant ready for the same visit confirms nothing new.
        assert!(c.on_event(PlayerEvent::Ready).is_empty());
    }

    #[test]
    fn test_rebuffer_within_item_does_not_reconfirm() {
        let mut c = started(2);
        c.on_event(PlayerEvent::ItemChanged(0));
        c.on_event(PlayerEvent::Ready);

        assert!(c.on_event(PlayerEvent::Buffering).is_empty());
        assert_eq!(c.state(), PlaybackState::Loading);
        assert!(c.on_event(PlayerEvent::Ready).is_empty());
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_revisit_same_index_confirms_again() {
        let mut c = started(1);
        c.on_event(PlayerEvent::ItemChanged(0));
        assert_eq!(
            c.on_event(PlayerEvent::Ready),
            vec![Effect::ConfirmedPlaying(0)]
        );

        // One full loop later the single item plays again.
        c.on_event(PlayerEvent::Ended);
        c.on_event(PlayerEvent::ItemChanged(0));
        assert_eq!(
            c.on_event(PlayerEvent::Ready),
            vec![Effect::ConfirmedPlaying(0)]
        );
    }

    #[test]
    fn test_error_advances_to_next_item() {
        let mut c = started(3);
        c.on_event(PlayerEvent::ItemChanged(0));
        assert_eq!(
            c.on_event(PlayerEvent::Error),
            vec![Effect::RequestPlay(1)]
        );
        assert_eq!(c.state(), PlaybackState::ErrorRecovering);
        c.note_play_reissued();
        assert_eq!(c.state(), PlaybackState::Loading);
    }

    #[test]
    fn test_error_on_last_item_wraps_to_first() {
        let mut c = started(3);
        c.on_event(PlayerEvent::ItemChanged(2));
        assert_eq!(
            c.on_event(PlayerEvent::Error),
            vec![Effect::RequestPlay(0)]
        );
    }

    #[test]
    fn test_error_before_any_item_replays_first() {
        let mut c = started(3);
        assert_eq!(
            c.on_event(PlayerEvent::Error),
            vec![Effect::RequestPlay(0)]
        );
    }

    #[test]
    fn test_index_change_reported_before_confirmation() {
        let mut c = started(2);
        c.on_event(PlayerEvent::ItemChanged(0));
        c.on_event(PlayerEvent::Ready);

        // Transition to item 1: the index report and the confirmation arrive
        // as separate events, index first.
        assert_eq!(
            c.on_event(PlayerEvent::ItemChanged(1)),
            vec![Effect::IndexChanged(1)]
        );
        assert_eq!(
            c.on_event(PlayerEvent::Ready),
            vec![Effect::ConfirmedPlaying(1)]
        );
    }
}
