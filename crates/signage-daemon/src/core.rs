//! SessionCore — single-owner event loop for all session state.
//!
//! All tasks that need to influence playback funnel `SessionEvent` messages
//! into this loop.  SessionCore owns `SessionState` (queue, current index,
//! per-session incremented ids) exclusively; no other task touches it.
//! Increment de-duplication is only correct because the check-and-insert
//! runs on this one sequencing point — the telemetry network calls happen
//! off-loop, but their bookkeeping never does.
//!
//! Pipeline: fetch the catalog → build the queue → hand it to the player
//! and start the controller.  A failed fetch or an empty queue leaves the
//! display quietly idle; a ticker re-fetches on a bounded interval, and is
//! ignored once something is playing.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use signage_proto::catalog::CatalogClient;
use signage_proto::config::Config;
use signage_proto::queue::{self, PlaybackQueue};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use crate::mpv::PlayerCommand;
use crate::playback::{Effect, PlaybackController, PlayerEvent};
use crate::telemetry::TelemetrySync;

// ── SessionEvent ──────────────────────────────────────────────────────────────

/// All inputs into the SessionCore loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// Lifecycle event from the player driver.
    Player(PlayerEvent),
    /// Periodic re-fetch tick; acted on only while nothing is playing.
    RefetchTick,
    /// Shutdown requested.
    #[allow(dead_code)]
    Shutdown,
}

// ── state ─────────────────────────────────────────────────────────────────────

/// Session-scoped mutable state, owned exclusively by SessionCore.
#[derive(Debug, Default)]
pub struct SessionState {
    pub queue: PlaybackQueue,
    /// `None` until the player reports its first item.
    pub current_index: Option<usize>,
    /// Ids already counted this session.  Grows only; reset means process
    /// restart.
    pub incremented_ids: HashSet<i64>,
}

/// Read-only view published for the HTTP status API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub queue_len: usize,
    pub current_index: Option<usize>,
    pub playback_state: &'static str,
    pub session_views: usize,
    pub last_fetch_ok: bool,
}

// ── SessionCore ───────────────────────────────────────────────────────────────

pub struct SessionCore {
    config: Config,
    catalog: CatalogClient,
    telemetry: TelemetrySync,
    controller: PlaybackController,
    state: SessionState,
    player_tx: mpsc::Sender<PlayerCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
    status: Arc<RwLock<StatusSnapshot>>,
    last_fetch_ok: bool,
}

impl SessionCore {
    pub fn new(
        config: Config,
        catalog: CatalogClient,
        telemetry: TelemetrySync,
        player_tx: mpsc::Sender<PlayerCommand>,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            catalog,
            telemetry,
            controller: PlaybackController::new(),
            state: SessionState::default(),
            player_tx,
            event_tx,
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
            last_fetch_ok: false,
        }
    }

    /// Shared snapshot handle for the HTTP status server.
    pub fn status(&self) -> Arc<RwLock<StatusSnapshot>> {
        Arc::clone(&self.status)
    }

    /// Run the session loop.  Returns when a `Shutdown` event is received or
    /// the event channel is closed.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<SessionEvent>) -> anyhow::Result<()> {
        info!("SessionCore: starting event loop");

        // Re-fetch ticker.  Jittered so a fleet of kiosks coming back from a
        // backend outage does not re-fetch in lockstep.
        let tick_tx = self.event_tx.clone();
        let base_secs = self.config.playback.refetch_secs.max(30);
        tokio::spawn(async move {
            loop {
                let jitter = {
                    use rand::Rng;
                    rand::thread_rng().gen_range(0..30)
                };
                tokio::time::sleep(tokio::time::Duration::from_secs(base_secs + jitter)).await;
                if tick_tx.send(SessionEvent::RefetchTick).await.is_err() {
                    break;
                }
            }
        });

        self.fetch_and_start().await;

        loop {
            let evt = event_rx.recv().await;
            match evt {
                None => {
                    info!("SessionCore: event channel closed, shutting down");
                    break;
                }

                Some(SessionEvent::Shutdown) => {
                    info!("SessionCore: shutdown requested");
                    break;
                }

                Some(SessionEvent::Player(player_event)) => {
                    let effects = self.controller.on_event(player_event);
                    self.apply_effects(effects).await;
                    self.publish_status().await;
                }

                Some(SessionEvent::RefetchTick) => {
                    if self.state.queue.is_empty() {
                        info!("SessionCore: idle re-fetch");
                        self.fetch_and_start().await;
                    }
                }
            }
        }

        Ok(())
    }

    // ── fetch → build → play pipeline ─────────────────────────────────────────

    async fn fetch_and_start(&mut self) {
        let snapshot = self
            .catalog
            .fetch(self.config.playback.effective_filter())
            .await;
        self.last_fetch_ok = snapshot.ok;

        if !snapshot.ok {
            warn!("SessionCore: catalog fetch failed, staying idle");
            self.publish_status().await;
            return;
        }

        let queue = queue::build(&snapshot.records, self.config.playback.orientation);
        if queue.is_empty() {
            info!(
                "SessionCore: no videos match selector {:?}, idle until next re-fetch",
                self.config.playback.orientation
            );
            self.state.queue = queue;
            self.state.current_index = None;
            self.publish_status().await;
            return;
        }

        info!(
            "SessionCore: queue built, {} of {} records",
            queue.len(),
            snapshot.records.len()
        );
        let urls = queue.urls();
        self.state.queue = queue;
        self.state.current_index = None;
        // incremented_ids is deliberately untouched: a re-fetch is not a new
        // session, and a video counted once stays counted.

        if self
            .player_tx
            .send(PlayerCommand::LoadQueue(urls))
            .await
            .is_err()
        {
            error!("SessionCore: player command channel closed");
        }
        self.controller.start(self.state.queue.len());
        self.publish_status().await;
    }

    // ── controller effect routing ─────────────────────────────────────────────

    async fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::IndexChanged(index) => {
                    self.state.current_index = Some(index);
                }

                Effect::ConfirmedPlaying(index) => {
                    if let Some(record) = self.state.queue.get(index).cloned() {
                        self.telemetry
                            .on_confirmed_playing(&record, &mut self.state.incremented_ids);
                    } else {
                        // In-flight event against an already-rebuilt queue;
                        // harmless to skip.
                        warn!("SessionCore: confirmed index {} outside queue", index);
                    }
                }

                Effect::RequestPlay(index) => {
                    if self
                        .player_tx
                        .send(PlayerCommand::PlayIndex(index))
                        .await
                        .is_err()
                    {
                        error!("SessionCore: player command channel closed");
                    }
                    self.controller.note_play_reissued();
                }
            }
        }
    }

    async fn publish_status(&self) {
        let mut status = self.status.write().await;
        *status = StatusSnapshot {
            queue_len: self.state.queue.len(),
            current_index: self.state.current_index,
            playback_state: self.controller.state().label(),
            session_views: self.state.incremented_ids.len(),
            last_fetch_ok: self.last_fetch_ok,
        };
    }
}
