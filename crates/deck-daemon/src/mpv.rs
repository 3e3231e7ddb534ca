/// mpv playback engine over the JSON IPC protocol.
///
/// Architecture:
///
/// ```text
///   MpvEngine ── MpvDriver::spawn_and_connect()
///                    │
///                    ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
///                    └── reader_task   ← reads JSON lines from socket
///                                           ├── response (has request_id) → matched oneshot::Sender
///                                           └── event (end-file, ...)     → watch_events
/// ```
///
/// Public API:
///   - `MpvEngine`: the `Engine` implementation.  Spawns mpv lazily on the
///     first command and respawns it if the process died.
///   - `MpvHandle`: cheaply cloneable.  `send(cmd)` resolves to the reply.
///   - `MpvDriver`: owns the process and the IPC connection.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::engine::{Engine, EngineState};

// ── global request-id counter ────────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: Duration = Duration::from_secs(5);

// ── internal channel types ───────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String,
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

// ── public handle ────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let mut payload = serde_json::to_string(&json!({ "command": command, "request_id": req_id }))?;
        payload.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn get_property(&self, name: &str) -> anyhow::Result<Value> {
        let resp = self.send(json!(["get_property", name])).await?;
        Ok(resp["data"].clone())
    }

    async fn get_flag(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.get_property(name).await?.as_bool().unwrap_or(false))
    }

    pub async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        let pct = (volume * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", pct])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }
}

// ── driver ───────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    handle: Option<MpvHandle>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: deck_proto::platform::mpv_socket_name(),
            process: None,
            handle: None,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        match self.process {
            Some(ref mut child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }

    pub async fn kill(&mut self) {
        self.handle = None;
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    // ── spawn / connect ──────────────────────────────────────────────────────────

    async fn spawn_process(&mut self, volume: f32) -> anyhow::Result<()> {
        self.kill().await;

        let mpv_binary = deck_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        info!("mpv: spawning {}", mpv_binary.display());

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--quiet")
            .arg(deck_proto::platform::mpv_socket_arg())
            .arg(format!(
                "--volume={}",
                (volume * 100.0).clamp(0.0, 100.0).round() as i64
            ))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<Value>,
    ) -> anyhow::Result<MpvHandle> {
        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;
        self.spawn_process(volume).await?;

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        let handle = start_io_tasks(BufReader::new(read_half), write_half, event_tx);
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    // ── Windows ──────────────────────────────────────────────────────────────────

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<Value>,
    ) -> anyhow::Result<MpvHandle> {
        self.spawn_process(volume).await?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                let handle = start_io_tasks(BufReader::new(read_half), write_half, event_tx);
                self.handle = Some(handle.clone());
                return Ok(handle);
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

impl Default for MpvDriver {
    fn default() -> Self {
        Self::new()
    }
}

// ── io tasks ─────────────────────────────────────────────────────────────────────

fn start_io_tasks<R, W>(reader: BufReader<R>, writer: W, event_tx: mpsc::Sender<Value>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);
    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));
    MpvHandle { tx: cmd_tx }
}

async fn fail_all(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

// ── reader task ──────────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<Value>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, "mpv IPC connection closed").await;
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

                match val.get("request_id").and_then(|v| v.as_u64()) {
                    Some(req_id) => {
                        let reply = pending.lock().await.remove(&req_id);
                        if let Some(tx) = reply {
                            let result = match val["error"].as_str() {
                                Some("success") => Ok(val),
                                other => Err(anyhow::anyhow!(
                                    "mpv error: {}",
                                    other.unwrap_or("unknown error")
                                )),
                            };
                            let _ = tx.send(result);
                        }
                    }
                    None => {
                        let _ = event_tx.send(val).await;
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

// ── writer task ──────────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: req={} {}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── events ───────────────────────────────────────────────────────────────────────

/// Tracks load failures, which mpv only reports as events.
async fn watch_events(mut rx: mpsc::Receiver<Value>, load_failed: Arc<AtomicBool>) {
    while let Some(event) = rx.recv().await {
        match event.get("event").and_then(|e| e.as_str()) {
            Some("end-file") if event.get("reason").and_then(|r| r.as_str()) == Some("error") => {
                warn!("mpv: failed to load item: {}", event);
                load_failed.store(true, Ordering::Release);
            }
            Some("file-loaded") => load_failed.store(false, Ordering::Release),
            _ => {}
        }
    }
}

// ── engine ───────────────────────────────────────────────────────────────────────

struct EngineInner {
    driver: MpvDriver,
    volume: f32,
}

/// `Engine` over a single mpv process.
pub struct MpvEngine {
    inner: Mutex<EngineInner>,
    loaded: AtomicBool,
    load_failed: Arc<AtomicBool>,
}

impl MpvEngine {
    pub fn new(volume: f32) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                driver: MpvDriver::new(),
                volume: volume.clamp(0.0, 1.0),
            }),
            loaded: AtomicBool::new(false),
            load_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn handle(&self) -> anyhow::Result<MpvHandle> {
        let mut inner = self.inner.lock().await;
        if inner.driver.process_alive() {
            if let Some(handle) = &inner.driver.handle {
                return Ok(handle.clone());
            }
        }
        let (event_tx, event_rx) = mpsc::channel(256);
        let volume = inner.volume;
        let handle = inner.driver.spawn_and_connect(volume, event_tx).await?;
        tokio::spawn(watch_events(event_rx, self.load_failed.clone()));
        Ok(handle)
    }

    /// Handle to a running process, without spawning one.
    async fn existing_handle(&self) -> Option<MpvHandle> {
        let mut inner = self.inner.lock().await;
        if inner.driver.process_alive() {
            inner.driver.handle.clone()
        } else {
            None
        }
    }

    async fn probe_state(&self, handle: &MpvHandle) -> anyhow::Result<EngineState> {
        if self.load_failed.load(Ordering::Acquire) {
            return Ok(EngineState::Error);
        }
        if handle.get_flag("idle-active").await? {
            return Ok(if self.loaded.load(Ordering::Acquire) {
                EngineState::Ended
            } else {
                EngineState::Idle
            });
        }
        if handle.get_flag("pause").await? {
            return Ok(EngineState::Paused);
        }
        if handle.get_flag("paused-for-cache").await? || handle.get_flag("core-idle").await? {
            return Ok(EngineState::Buffering);
        }
        Ok(EngineState::Playing)
    }
}

#[async_trait]
impl Engine for MpvEngine {
    async fn play(&self, uri: &str) -> anyhow::Result<bool> {
        let handle = self.handle().await?;
        self.load_failed.store(false, Ordering::Release);
        info!("mpv: loadfile {}", uri);
        if let Err(e) = handle.send(json!(["loadfile", uri, "replace"])).await {
            warn!("mpv: loadfile rejected: {}", e);
            return Ok(false);
        }
        self.loaded.store(true, Ordering::Release);
        let _ = handle.set_pause(false).await;
        Ok(true)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.loaded.store(false, Ordering::Release);
        if let Some(handle) = self.existing_handle().await {
            handle.send(json!(["stop"])).await?;
        }
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.handle().await?.set_pause(true).await
    }

    async fn resume(&self) -> anyhow::Result<()> {
        self.handle().await?.set_pause(false).await
    }

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.inner.lock().await.volume = volume;
        match self.existing_handle().await {
            Some(handle) => handle.set_volume(volume).await,
            // applied on spawn
            None => Ok(()),
        }
    }

    async fn state(&self) -> EngineState {
        let Some(handle) = self.existing_handle().await else {
            return EngineState::Idle;
        };
        match self.probe_state(&handle).await {
            Ok(state) => state,
            Err(e) => {
                debug!("mpv: state probe failed: {}", e);
                EngineState::Error
            }
        }
    }

    async fn shutdown(&self) {
        info!("mpv: shutting down");
        self.inner.lock().await.driver.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(request: &Value, error: &str, data: Value) -> String {
        format!(
            "{}\n",
            json!({ "request_id": request["request_id"], "error": error, "data": data })
        )
    }

    #[tokio::test]
    async fn test_ipc_replies_and_events() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(BufReader::new(client_read), client_write, event_tx);

        let (server_read, mut server_write) = tokio::io::split(server);
        let fake_mpv = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();

            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["command"], json!(["get_property", "pause"]));
            server_write.write_all(b"{\"event\":\"file-loaded\"}\n").await.unwrap();
            server_write
                .write_all(reply(&request, "success", json!(true)).as_bytes())
                .await
                .unwrap();

            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            server_write
                .write_all(reply(&request, "property unavailable", Value::Null).as_bytes())
                .await
                .unwrap();
        });

        assert!(handle.get_flag("pause").await.unwrap());
        assert_eq!(event_rx.recv().await.unwrap()["event"], "file-loaded");
        assert!(handle.get_flag("paused-for-cache").await.is_err());
        fake_mpv.await.unwrap();
    }

    #[tokio::test]
    async fn test_end_file_error_marks_load_failure() {
        let (tx, rx) = mpsc::channel(8);
        let load_failed = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(watch_events(rx, Arc::clone(&load_failed)));

        tx.send(json!({ "event": "end-file", "reason": "error" })).await.unwrap();
        tx.send(json!({ "event": "end-file", "reason": "eof" })).await.unwrap();
        drop(tx);
        watcher.await.unwrap();
        assert!(load_failed.load(Ordering::Acquire));
    }
}
