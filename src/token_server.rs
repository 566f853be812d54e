//! Loopback HTTP endpoint that receives captcha tokens.
//!
//! The challenge itself is solved in an external browser/web-view, which
//! POSTs the resulting token here. The server hands the raw token string
//! to a registered callback; everything else (CORS preflight, error
//! statuses) exists only to keep that POST working from a browser page.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{info, warn};

/// Callback invoked with each received token.
pub type TokenCallback = Arc<dyn Fn(String) + Send + Sync>;

/// How long the accept loop sleeps between shutdown-flag checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Loopback token receiver running on its own thread.
pub struct TokenServer {
    port: u16,
    callback: Arc<Mutex<Option<TokenCallback>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    local_port: u16,
}

impl TokenServer {
    /// Create a stopped server for the given loopback port.
    /// Port 0 binds an ephemeral port (useful in tests).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            callback: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            local_port: 0,
        }
    }

    /// Register the callback that receives tokens.
    pub fn set_callback(&self, callback: TokenCallback) {
        *self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Bind and start the accept loop. No-op when already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let server = Server::http(("127.0.0.1", self.port))
            .map_err(|e| anyhow!("failed to bind token server on port {}: {e}", self.port))?;
        self.local_port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(self.port);
        info!(port = self.local_port, "token server listening");

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let callback = Arc::clone(&self.callback);
        self.worker = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match server.recv_timeout(RECV_TIMEOUT) {
                    Ok(Some(request)) => handle_request(request, &callback),
                    Ok(None) => {}
                    Err(e) => {
                        if running.load(Ordering::SeqCst) {
                            warn!("token server accept error: {e}");
                        }
                    }
                }
            }
            info!("token server stopped");
        }));
        Ok(())
    }

    /// Stop the accept loop and join the server thread. Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("token server thread panicked");
            }
        }
    }

    /// Whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Actual bound port (differs from the requested one when it was 0).
    pub fn local_port(&self) -> u16 {
        self.local_port
    }
}

impl Drop for TokenServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn cors_response(body: &str, status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_string(body).with_status_code(status);
    for (name, value) in [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "POST, OPTIONS"),
        ("Access-Control-Allow-Headers", "Content-Type"),
    ] {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response.add_header(header);
        }
    }
    response
}

fn handle_request(mut request: Request, callback: &Mutex<Option<TokenCallback>>) {
    let response = match request.method() {
        Method::Options => cors_response("", 204),
        Method::Post => {
            let mut token = String::new();
            if let Err(e) = request.as_reader().read_to_string(&mut token) {
                warn!("failed to read token body: {e}");
            }
            if token.is_empty() {
                cors_response("Empty token", 400)
            } else {
                // Clone out of the lock so the callback never runs under it.
                let cb = callback
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match cb {
                    Some(cb) => {
                        info!("received captcha token");
                        cb(token);
                        cors_response("Token received", 200)
                    }
                    None => cors_response("No callback registered", 500),
                }
            }
        }
        _ => cors_response("Not Found", 404),
    };

    if let Err(e) = request.respond(response) {
        warn!("failed to respond to token request: {e}");
    }
}
