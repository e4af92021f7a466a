/// mpv IPC driver with separated reader/writer tasks, and the
/// [`MediaEngine`] implementation built on it.
///
/// Architecture:
///
/// ```text
///   MpvEngine::start()
///         │
///         ├── MpvDriver::spawn_and_connect()
///         │       ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
///         │       └── reader_task   ← reads JSON lines from socket
///         │                              ├── response (has request_id) → matched oneshot::Sender
///         │                              └── event                     → mpv event channel
///         └── event_task            ← mpv events → EngineEvent for the UI loop
/// ```
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use relinker_core::engine::{AudioOutput, EngineEvent, MediaEngine};
use relinker_core::platform;
use relinker_core::playlist::TrackRef;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

/// An mpv event that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// `reason` of an end-file event: "eof", "stop", "quit", "error", ...
    pub fn end_reason(&self) -> Option<&str> {
        self.raw.get("reason")?.as_str()
    }

    /// What the player should hear about, if anything.
    pub fn to_engine_event(&self) -> Option<EngineEvent> {
        match self.event_name()? {
            "file-loaded" => Some(EngineEvent::FileLoaded),
            "end-file" if self.end_reason() == Some("eof") => Some(EngineEvent::TrackEnded),
            "shutdown" => Some(EngineEvent::EngineLost),
            _ => None,
        }
    }
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
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

    /// `get_property` returning seconds, or `None` while nothing is loaded.
    async fn get_secs(&self, property: &str) -> anyhow::Result<Option<f64>> {
        match self.send(json!(["get_property", property])).await {
            Ok(resp) => Ok(resp["data"].as_f64()),
            Err(e) if e.to_string().contains("property unavailable") => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `get_property` returning a string, or `None` while nothing is loaded.
    async fn get_string(&self, property: &str) -> anyhow::Result<Option<String>> {
        match self.send(json!(["get_property", property])).await {
            Ok(resp) => Ok(resp["data"].as_str().map(str::to_string)),
            Err(e) if e.to_string().contains("property unavailable") => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    pub socket_name: String,
    binary: PathBuf,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            binary,
            process: None,
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn command(&self, output: AudioOutput) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("--no-video")
            .arg("--idle=yes")
            .arg("--gapless-audio=yes")
            .arg("--prefetch-playlist=yes")
            .arg("--keep-open=no")
            .arg(platform::mpv_socket_arg(&self.socket_name))
            .arg("--quiet")
            .arg(format!("--ao={}", ao_name(output)));
        if output.is_exclusive() {
            cmd.arg("--audio-exclusive=yes");
        }
        cmd.stdout(std::process::Stdio::null());
        cmd
    }

    // ── spawn ─────────────────────────────────────────────────────────────────

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        output: AudioOutput,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        // Kill stale process
        self.kill().await;

        let socket_path = PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning {}", self.binary.display());

        // Create mpv stderr log file for debugging crashes
        let stderr_path = platform::data_dir().join("mpv-stderr.log");
        if let Some(parent) = stderr_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;
        info!("mpv: logging stderr to {:?}", stderr_path);

        let child = self.command(output).stderr(stderr_file).spawn()?;
        info!("mpv: spawned process with pid {:?}", child.id());
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

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        output: AudioOutput,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        info!("mpv: spawning {}", self.binary.display());
        let child = self
            .command(output)
            .stderr(std::process::Stdio::null())
            .spawn()?;
        self.process = Some(child);

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            match ClientOptions::new().open(&pipe_path) {
                Ok(client) => {
                    info!("mpv: connected to named pipe");
                    let (read_half, write_half) = tokio::io::split(client);
                    return Ok(start_io_tasks(read_half, write_half, event_tx));
                }
                Err(_) => continue,
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
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
                // Fail all pending requests
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
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
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

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!(
            "mpv writer: send req={} payload={}",
            req.req_id,
            req.payload.trim()
        );
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

// ── event translation ─────────────────────────────────────────────────────────

/// Forward the player-relevant mpv events. A `shutdown` event or the end of
/// the reader task means the connection is gone; the player hears
/// `EngineLost` exactly once per mpv process.
async fn event_task(mut mpv_rx: mpsc::Receiver<MpvEvent>, engine_tx: mpsc::Sender<EngineEvent>) {
    while let Some(event) = mpv_rx.recv().await {
        let Some(engine_event) = event.to_engine_event() else {
            continue;
        };
        debug!("mpv: {:?}", engine_event);
        if engine_event == EngineEvent::EngineLost {
            break;
        }
        if engine_tx.send(engine_event).await.is_err() {
            return;
        }
    }
    let _ = engine_tx.send(EngineEvent::EngineLost).await;
}

// ── engine ────────────────────────────────────────────────────────────────────

/// mpv `--ao` value for an output mode. Empty lets mpv choose.
fn ao_name(output: AudioOutput) -> &'static str {
    match output {
        AudioOutput::Default => "",
        AudioOutput::Pulse => "pulse",
        AudioOutput::Pipewire => "pipewire",
        AudioOutput::Alsa => "alsa",
        AudioOutput::CoreAudio => "coreaudio",
        AudioOutput::WasapiShared | AudioOutput::WasapiExclusive => "wasapi",
    }
}

/// Whether mpv on this platform ships the output's `--ao` driver.
pub fn output_supported(output: AudioOutput) -> bool {
    match output {
        AudioOutput::Default => true,
        AudioOutput::Pulse | AudioOutput::Pipewire | AudioOutput::Alsa => cfg!(target_os = "linux"),
        AudioOutput::CoreAudio => cfg!(target_os = "macos"),
        AudioOutput::WasapiShared | AudioOutput::WasapiExclusive => cfg!(windows),
    }
}

/// The output after `current` that this platform supports.
pub fn next_supported_output(current: AudioOutput) -> AudioOutput {
    let mut next = current.next();
    while !output_supported(next) && next != current {
        next = next.next();
    }
    next
}

fn track_arg(track: &TrackRef) -> String {
    match track {
        TrackRef::Path(p) => p.to_string_lossy().into_owned(),
        TrackRef::Url(u) => u.clone(),
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

pub struct MpvEngine {
    driver: MpvDriver,
    handle: MpvHandle,
}

impl MpvEngine {
    /// Spawn mpv and connect to it. Engine events are delivered on `events`.
    pub async fn start(
        binary: &Path,
        output: AudioOutput,
        events: mpsc::Sender<EngineEvent>,
    ) -> anyhow::Result<Self> {
        let mut driver = MpvDriver::new(binary.to_path_buf());
        let (mpv_tx, mpv_rx) = mpsc::channel::<MpvEvent>(64);
        let handle = driver.spawn_and_connect(output, mpv_tx).await?;
        tokio::spawn(event_task(mpv_rx, events));
        Ok(Self { driver, handle })
    }

    async fn command(&self, command: Value) -> anyhow::Result<()> {
        self.handle.send(command).await?;
        Ok(())
    }
}

impl MediaEngine for MpvEngine {
    async fn load(&mut self, track: &TrackRef, paused: bool) -> anyhow::Result<()> {
        self.command(json!(["set_property", "pause", paused])).await?;
        self.command(json!(["loadfile", track_arg(track), "replace"]))
            .await
    }

    async fn enqueue(&mut self, track: &TrackRef) -> anyhow::Result<()> {
        self.command(json!(["loadfile", track_arg(track), "append"]))
            .await
    }

    async fn clear_queue(&mut self) -> anyhow::Result<()> {
        self.command(json!(["playlist-clear"])).await
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        self.command(json!(["set_property", "pause", false])).await
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.command(json!(["set_property", "pause", true])).await
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.command(json!(["stop"])).await
    }

    async fn seek(&mut self, offset_ms: u64) -> anyhow::Result<()> {
        let secs = offset_ms as f64 / 1000.0;
        self.command(json!(["seek", secs, "absolute"])).await
    }

    async fn position(&mut self) -> anyhow::Result<Option<u64>> {
        Ok(self.handle.get_secs("time-pos").await?.map(secs_to_ms))
    }

    async fn duration(&mut self) -> anyhow::Result<Option<u64>> {
        Ok(self.handle.get_secs("duration").await?.map(secs_to_ms))
    }

    async fn current_media(&mut self) -> anyhow::Result<Option<String>> {
        // `path` echoes the loadfile argument verbatim
        self.handle.get_string("path").await
    }

    async fn set_audio_output(&mut self, output: AudioOutput) -> anyhow::Result<()> {
        self.command(json!(["set_property", "options/ao", ao_name(output)]))
            .await?;
        self.command(json!([
            "set_property",
            "options/audio-exclusive",
            output.is_exclusive()
        ]))
        .await?;
        self.command(json!(["ao-reload"])).await
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        if let Err(e) = self.command(json!(["quit"])).await {
            debug!("mpv: quit: {}", e);
        }
        self.driver.kill().await;
        #[cfg(unix)]
        let _ = std::fs::remove_file(&self.driver.socket_name);
        Ok(())
    }
}
