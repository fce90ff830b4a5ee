//! mpv kiosk driver with separated reader/writer tasks.
//!
//! mpv is the rendering surface: it is spawned fullscreen with an IPC
//! socket and handed the whole queue in repeat-all mode.  This module
//! translates mpv's property-change/event stream into [`PlayerEvent`]s for
//! the playback controller and executes the coordinator's commands.
//!
//! ```text
//!   start_player()
//!         │
//!         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
//!         ├── reader_task   ← reads JSON lines from socket
//!         │                      ├── response (has request_id) → matched oneshot::Sender
//!         │                      └── event / property-change   → run_player loop
//!         └── run_player    ← command channel + event translation + liveness tick
//! ```

use crate::core::SessionEvent;
use crate::playback::PlayerEvent;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

/// Fixed observe_property IDs.  We match on these in property-change events.
pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_PAUSED_FOR_CACHE: u64 = 2;
pub const OBS_PLAYLIST_POS: u64 = 3;

// ── commands from the session coordinator ─────────────────────────────────────

#[derive(Debug)]
pub enum PlayerCommand {
    /// Replace the playlist with this ordered queue and start looping it.
    LoadQueue(Vec<String>),
    /// Jump to a queue index and ensure playback (error recovery).
    PlayIndex(usize),
}

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

/// Map a raw mpv event to a playback lifecycle event, if it carries one.
fn translate_event(evt: &MpvEvent) -> Option<PlayerEvent> {
    if let Some((obs_id, data)) = evt.as_property_change() {
        return match obs_id {
            OBS_PLAYLIST_POS => {
                let pos = data.as_i64()?;
                if pos >= 0 {
                    Some(PlayerEvent::ItemChanged(pos as usize))
                } else {
                    None
                }
            }
            // paused-for-cache=true means the demuxer ran dry mid-item.
            OBS_PAUSED_FOR_CACHE => Some(if data.as_bool()? {
                PlayerEvent::Buffering
            } else {
                PlayerEvent::Ready
            }),
            // core-idle=false is mpv's "audio/video actually flowing".
            OBS_CORE_IDLE => Some(if data.as_bool()? {
                PlayerEvent::Buffering
            } else {
                PlayerEvent::Ready
            }),
            _ => None,
        };
    }

    match evt.event_name()? {
        "end-file" => {
            let reason = evt.raw.get("reason").and_then(Value::as_str).unwrap_or("");
            if reason == "error" {
                Some(PlayerEvent::Error)
            } else {
                Some(PlayerEvent::Ended)
            }
        }
        _ => None,
    }
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  `send()` fires a command and
/// awaits the matched response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Replace the playlist with the queue, in order, and loop it forever.
    pub async fn load_queue(&self, urls: &[String]) -> anyhow::Result<()> {
        let Some(first) = urls.first() else {
            return Ok(());
        };
        self.send(json!(["loadfile", first, "replace"])).await?;
        for url in &urls[1..] {
            self.send(json!(["loadfile", url, "append"])).await?;
        }
        // Repeat-all: after the last item, wrap to the first.  No gaps.
        self.send(json!(["set_property", "loop-playlist", "inf"]))
            .await?;
        self.send(json!(["set_property", "pause", false])).await?;
        Ok(())
    }

    /// Jump to a playlist index and reissue play.
    pub async fn play_index(&self, index: usize) -> anyhow::Result<()> {
        self.send(json!(["set_property", "playlist-pos", index]))
            .await?;
        self.send(json!(["set_property", "pause", false])).await?;
        Ok(())
    }

    /// Register observe_property for the playback properties we derive state
    /// from.  Must be called after every fresh connection; mpv then pushes a
    /// property-change event whenever any of them changes.
    pub async fn observe_playback_properties(&self) {
        let props = [
            (OBS_CORE_IDLE, "core-idle"),
            (OBS_PAUSED_FOR_CACHE, "paused-for-cache"),
            (OBS_PLAYLIST_POS, "playlist-pos"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process and manages (re)connection.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: signage_proto::platform::mpv_socket_name(),
            process: None,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            child.try_wait().ok().flatten().is_none()
        } else {
            false
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        // Kill stale process
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning kiosk process");
        let mpv_binary = signage_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--fs")
            .arg("--no-osc")
            .arg("--idle=yes")
            .arg("--keep-open=no")
            .arg(signage_proto::platform::mpv_socket_arg())
            .arg("--really-quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        self.process = Some(child);

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(Self::start_io_tasks(stream, event_tx))
    }

    fn start_io_tasks(stream: UnixStream, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle {
        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);

        // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

        let pending_w = pending.clone();
        tokio::spawn(writer_task(write_half, cmd_rx, pending_w));
        tokio::spawn(reader_task(reader, pending, event_tx));

        MpvHandle { tx: cmd_tx }
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    // Command response — route to the pending request
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"]
                                .as_str()
                                .unwrap_or("unknown error")
                                .to_string();
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    // Unsolicited event / property-change
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── player task (used by SessionCore) ─────────────────────────────────────────

/// Spawn the player task.  Returns the command channel the session
/// coordinator drives playback through; lifecycle events flow back over
/// `event_tx`.
pub fn start_player(event_tx: mpsc::Sender<SessionEvent>) -> mpsc::Sender<PlayerCommand> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<PlayerCommand>(16);
    tokio::spawn(run_player(cmd_rx, event_tx));
    cmd_tx
}

async fn run_player(
    mut cmd_rx: mpsc::Receiver<PlayerCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let mut driver = MpvDriver::new();
    let (mpv_event_tx, mut mpv_event_rx) = mpsc::channel::<MpvEvent>(64);

    let mut handle = match driver.spawn_and_connect(mpv_event_tx.clone()).await {
        Ok(h) => {
            h.observe_playback_properties().await;
            Some(h)
        }
        Err(e) => {
            error!("mpv: initial spawn failed: {}", e);
            None
        }
    };

    // Remembered so a respawned mpv resumes the loop without a new fetch.
    let mut last_queue: Vec<String> = Vec::new();
    let mut liveness = tokio::time::interval(tokio::time::Duration::from_secs(10));
    liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    info!("mpv: command channel closed, shutting down player");
                    break;
                };
                // Remember the queue even while disconnected so the next
                // respawn can resume it.
                if let PlayerCommand::LoadQueue(urls) = &cmd {
                    last_queue = urls.clone();
                }
                let Some(h) = handle.as_ref() else {
                    warn!("mpv: not connected, dropping {:?}", cmd);
                    continue;
                };
                match cmd {
                    PlayerCommand::LoadQueue(urls) => {
                        if let Err(e) = h.load_queue(&urls).await {
                            warn!("mpv: load queue failed: {}", e);
                        }
                    }
                    PlayerCommand::PlayIndex(index) => {
                        if let Err(e) = h.play_index(index).await {
                            warn!("mpv: play index {} failed: {}", index, e);
                        }
                    }
                }
            }

            evt = mpv_event_rx.recv() => {
                let Some(evt) = evt else { continue };
                if let Some(player_event) = translate_event(&evt) {
                    if event_tx.send(SessionEvent::Player(player_event)).await.is_err() {
                        break;
                    }
                }
            }

            _ = liveness.tick() => {
                if driver.process_alive() {
                    continue;
                }
                warn!("mpv: process not running, respawning");
                handle = None;
                match driver.spawn_and_connect(mpv_event_tx.clone()).await {
                    Ok(h) => {
                        h.observe_playback_properties().await;
                        if !last_queue.is_empty() {
                            if let Err(e) = h.load_queue(&last_queue).await {
                                warn!("mpv: queue reload after respawn failed: {}", e);
                            }
                        }
                        handle = Some(h);
                    }
                    Err(e) => error!("mpv: respawn failed: {}", e),
                }
            }
        }
    }

    driver.kill().await;
}

// ── tests ─────────────────────────────────────────────────────────────────────
