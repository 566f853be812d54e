//! Connection/session state machine and the I/O thread that drives it.
//!
//! `SessionConnection` owns the transport: a dedicated thread runs a
//! current-thread tokio runtime that performs the WebSocket connect, pumps
//! incoming frames through the decoder, and writes outgoing frames arriving
//! over a command channel. All shared mutable state (players, chunk
//! scheduler, captcha gate, pending token) lives behind one mutex; the
//! chunk-data callback is always invoked outside it so the renderer may
//! call back into the session without deadlocking.

use crate::captcha::{CaptchaGate, GateAction};
use crate::codec::{
    decode_server_message, encode_captcha_response, encode_chunk_request, encode_world_join,
};
use crate::config::Settings;
use crate::error::SessionError;
use crate::player::{PlayerRecord, PlayerTable};
use crate::protocol::{ChunkCoord, PlayerId, Rgb, ServerMessage};
use crate::scheduler::ChunkScheduler;
use crate::transport;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Callback invoked once per decoded chunk: coordinate plus 256 row-major
/// pixels. Runs on the I/O thread, outside the session lock.
pub type ChunkDataCallback = Arc<dyn Fn(ChunkCoord, &[Rgb]) + Send + Sync>;

/// Transport lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, no I/O thread activity.
    #[default]
    Disconnected,
    /// Connect in progress on the I/O thread.
    Connecting,
    /// Live transport; frames flow.
    Open,
}

/// Commands from the caller thread to the I/O thread.
enum IoCommand {
    /// Write one binary frame.
    Send(Vec<u8>),
    /// Close the transport and stop the I/O loop.
    Close,
}

/// Outgoing work produced while dispatching a decoded frame.
enum Outgoing {
    /// Fire-and-forget frame (captcha response, world join).
    Frame(Vec<u8>),
    /// Chunk request; rolled back in the scheduler if the write fails.
    ChunkRequest(ChunkCoord),
}

#[derive(Default)]
struct SessionState {
    connection: ConnectionState,
    settings: Option<Settings>,
    pending_token: Option<String>,
    player_id: PlayerId,
    players: PlayerTable,
    scheduler: ChunkScheduler,
    gate: CaptchaGate,
    sender: Option<UnboundedSender<IoCommand>>,
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &Mutex<SessionState>) -> std::sync::MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persistent connection to a world server.
pub struct SessionConnection {
    state: SharedState,
    chunk_callback: SharedCallback,
    io_thread: Mutex<Option<JoinHandle<()>>>,
}

type SharedCallback = Arc<Mutex<Option<ChunkDataCallback>>>;

impl Default for SessionConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConnection {
    /// Create a disconnected session.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            chunk_callback: Arc::new(Mutex::new(None)),
            io_thread: Mutex::new(None),
        }
    }

    /// Register the callback that receives decoded chunk pixel blocks.
    pub fn set_chunk_callback(&self, callback: ChunkDataCallback) {
        *self
            .chunk_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Start connecting to the server described by `settings`.
    ///
    /// Returns promptly; the connect proceeds on the I/O thread. No-op when
    /// already connecting or connected. All per-session chunk and captcha
    /// state is reset to initial before the attempt.
    pub fn connect(&self, settings: Settings) {
        let rx = {
            let mut state = lock(&self.state);
            if state.connection != ConnectionState::Disconnected {
                info!("already connecting/connected, skipping connect");
                return;
            }
            state.connection = ConnectionState::Connecting;
            state.players.clear();
            state.scheduler.reset();
            state.gate.reset();
            state.player_id = 0;
            state.settings = Some(settings.clone());

            let (tx, rx) = unbounded_channel();
            state.sender = Some(tx);
            rx
        };

        let shared = Arc::clone(&self.state);
        let callback = Arc::clone(&self.chunk_callback);

        let mut guard = self
            .io_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // A previous session's thread is done by now; reap it.
        if let Some(old) = guard.take() {
            if old.join().is_err() {
                warn!("previous I/O thread panicked");
            }
        }
        *guard = Some(std::thread::spawn(move || {
            io_thread_main(shared, callback, settings, rx);
        }));
    }

    /// Close the transport, stop and join the I/O thread, and clear all
    /// per-session state. Idempotent and safe to call from any thread; no
    /// chunk callback fires after this returns.
    pub fn disconnect(&self) {
        {
            let mut state = lock(&self.state);
            if let Some(sender) = state.sender.take() {
                let _ = sender.send(IoCommand::Close);
            }
        }

        let handle = self
            .io_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("I/O thread panicked during disconnect");
            }
        }

        let mut state = lock(&self.state);
        state.connection = ConnectionState::Disconnected;
        state.players.clear();
        state.scheduler.reset();
        state.gate.reset();
        state.pending_token = None;
        state.sender = None;
    }

    /// Submit a captcha token.
    ///
    /// Sent immediately when the transport is open; retained and flushed on
    /// open when still connecting; otherwise a connection attempt is
    /// re-initiated with the stored settings.
    pub fn submit_captcha(&self, token: &str) -> Result<(), SessionError> {
        if token.is_empty() {
            warn!("rejecting empty captcha token");
            return Err(SessionError::EmptyCaptchaToken);
        }

        let reconnect = {
            let mut state = lock(&self.state);
            state.gate.token_submitted();
            match state.connection {
                ConnectionState::Open => {
                    let frame = encode_captcha_response(token);
                    if let Some(sender) = &state.sender {
                        if sender.send(IoCommand::Send(frame)).is_err() {
                            warn!("failed to hand captcha token to I/O thread");
                        } else {
                            info!("sent captcha token");
                        }
                    }
                    None
                }
                ConnectionState::Connecting => {
                    info!("stored captcha token until the connection opens");
                    state.pending_token = Some(token.to_string());
                    None
                }
                ConnectionState::Disconnected => {
                    state.pending_token = Some(token.to_string());
                    let settings = state.settings.clone();
                    if settings.is_some() {
                        info!("stored captcha token and re-initiating connection");
                    } else {
                        info!("stored captcha token; no prior connection to re-initiate");
                    }
                    settings
                }
            }
        };

        if let Some(settings) = reconnect {
            self.connect(settings);
        }
        Ok(())
    }

    /// Queue fetches for every chunk visible from the given camera state
    /// and dispatch the next request if none is in flight. Silent no-op
    /// when not connected.
    pub fn request_chunks_in_view(&self, center_x: i32, center_y: i32, zoom: f32) {
        let dispatch = {
            let mut state = lock(&self.state);
            if state.connection != ConnectionState::Open {
                return;
            }
            let viewport = state
                .settings
                .as_ref()
                .map(|s| s.viewport)
                .unwrap_or_default();
            state
                .scheduler
                .enqueue_visible(center_x, center_y, zoom, viewport);
            match state.scheduler.next_request() {
                Some(coord) => state.sender.clone().map(|sender| (sender, coord)),
                None => None,
            }
        };

        if let Some((sender, coord)) = dispatch {
            debug!(x = coord.x, y = coord.y, "requesting chunk");
            let frame = encode_chunk_request(coord).to_vec();
            if sender.send(IoCommand::Send(frame)).is_err() {
                lock(&self.state).scheduler.rollback(coord);
            }
        }
    }

    /// Whether the UI must surface a captcha challenge before the session
    /// can proceed.
    pub fn is_waiting_for_captcha(&self) -> bool {
        lock(&self.state).gate.is_blocking()
    }

    /// Snapshot of all known remote players.
    pub fn players(&self) -> HashMap<PlayerId, PlayerRecord> {
        lock(&self.state).players.snapshot()
    }

    /// Current transport lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.state).connection
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Entry point of the I/O thread. Runs the connection to completion and
/// resets the shared state to Disconnected on the way out.
fn io_thread_main(
    state: SharedState,
    callback: SharedCallback,
    settings: Settings,
    rx: UnboundedReceiver<IoCommand>,
) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();
    match runtime {
        Ok(runtime) => runtime.block_on(run_connection(&state, &callback, settings, rx)),
        Err(e) => error!("failed to build I/O runtime: {e}"),
    }

    let mut state = lock(&state);
    state.connection = ConnectionState::Disconnected;
    state.sender = None;
    state.pending_token = None;
}

type WsSink = SplitSink<transport::WsStream, Message>;

async fn run_connection(
    state: &Mutex<SessionState>,
    callback: &Mutex<Option<ChunkDataCallback>>,
    settings: Settings,
    mut rx: UnboundedReceiver<IoCommand>,
) {
    info!(url = %settings.server_url, "connecting");
    let stream = match transport::connect(&settings.server_url, &settings.origin, settings.tls).await
    {
        Ok(stream) => stream,
        Err(e) => {
            error!("connect failed: {e:#}");
            return;
        }
    };
    info!("websocket connected");

    let (mut sink, mut source) = stream.split();

    // Transition to Open and flush a token submitted while connecting.
    let deferred_token = {
        let mut state = lock(state);
        state.connection = ConnectionState::Open;
        state.pending_token.take()
    };
    if let Some(token) = deferred_token {
        info!("sending deferred captcha token");
        if let Err(e) = sink.send(Message::Binary(encode_captcha_response(&token))).await {
            error!("failed to send deferred captcha token: {e}");
            return;
        }
    }

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(IoCommand::Send(frame)) => {
                    if let Err(e) = sink.send(Message::Binary(frame)).await {
                        error!("send failed: {e}");
                        break;
                    }
                }
                Some(IoCommand::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    info!("closing connection");
                    break;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Binary(frame))) => {
                    let outgoing = dispatch_frame(state, callback, &frame);
                    if !flush_outgoing(state, &mut sink, outgoing).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    info!(?reason, "server closed the connection");
                    break;
                }
                Some(Ok(other)) => debug!(?other, "ignoring non-binary message"),
                Some(Err(e)) => {
                    error!("websocket error: {e}");
                    break;
                }
                None => {
                    info!("connection closed by server");
                    break;
                }
            },
        }
    }
}

/// Write out the frames produced by a dispatch. Returns false when the
/// connection is broken and the I/O loop should stop.
async fn flush_outgoing(
    state: &Mutex<SessionState>,
    sink: &mut WsSink,
    outgoing: Vec<Outgoing>,
) -> bool {
    for item in outgoing {
        match item {
            Outgoing::Frame(frame) => {
                if let Err(e) = sink.send(Message::Binary(frame)).await {
                    error!("send failed: {e}");
                    return false;
                }
            }
            Outgoing::ChunkRequest(coord) => {
                debug!(x = coord.x, y = coord.y, "requesting chunk");
                let frame = encode_chunk_request(coord).to_vec();
                if let Err(e) = sink.send(Message::Binary(frame)).await {
                    error!("chunk request failed: {e}");
                    lock(state).scheduler.rollback(coord);
                    return false;
                }
            }
        }
    }
    true
}

/// Decode one frame and apply it to the shared state.
///
/// Malformed frames are logged and dropped; they never terminate the
/// connection. The chunk-data callback is invoked here, outside the lock.
fn dispatch_frame(
    state: &Mutex<SessionState>,
    callback: &Mutex<Option<ChunkDataCallback>>,
    frame: &[u8],
) -> Vec<Outgoing> {
    let message = match decode_server_message(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!("dropping malformed frame: {e}");
            return Vec::new();
        }
    };

    match message {
        ServerMessage::SetId { id } => {
            info!(id, "received player id");
            lock(state).player_id = id;
            Vec::new()
        }
        ServerMessage::WorldUpdate {
            players,
            pixels: _,
            disconnects,
        } => {
            let mut state = lock(state);
            let own_id = state.player_id;
            state.players.apply_update(own_id, &players, &disconnects);
            Vec::new()
        }
        ServerMessage::ChunkLoad {
            coord,
            locked: _,
            pixels,
        } => {
            let more_queued = lock(state).scheduler.mark_loaded(coord);
            debug!(x = coord.x, y = coord.y, "chunk loaded");

            // Clone out of the lock; the callback may call back into us.
            let cb = callback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(cb) = cb {
                cb(coord, &pixels);
            }

            let mut outgoing = Vec::new();
            if more_queued {
                if let Some(next) = lock(state).scheduler.next_request() {
                    outgoing.push(Outgoing::ChunkRequest(next));
                }
            }
            outgoing
        }
        ServerMessage::CaptchaState(wire) => {
            let mut state = lock(state);
            match state.gate.apply(wire) {
                GateAction::SendWorldJoin => {
                    let world = state
                        .settings
                        .as_ref()
                        .map(|s| s.world_name.clone())
                        .unwrap_or_default();
                    info!(world, "captcha cleared, joining world");
                    vec![Outgoing::Frame(encode_world_join(&world))]
                }
                GateAction::None => Vec::new(),
            }
        }
        ServerMessage::Teleport { x, y } => {
            // Camera moves are the renderer's concern; nothing to apply here.
            debug!(x, y, "teleport (unhandled)");
            Vec::new()
        }
        ServerMessage::SetRank { rank } => {
            debug!(rank, "rank update (unhandled)");
            Vec::new()
        }
        ServerMessage::SetPixelQuota { rate, per } => {
            debug!(rate, per, "pixel quota (unhandled)");
            Vec::new()
        }
        ServerMessage::ChunkProtected { coord, state: s } => {
            debug!(x = coord.x, y = coord.y, state = s, "chunk protection (unhandled)");
            Vec::new()
        }
    }
}
