#![warn(missing_docs)]
//! Network and protocol core for a multiplayer pixel-canvas client.
//!
//! Owns the WebSocket connection to a world server, decodes the compact
//! binary message protocol, gates the session behind a captcha handshake,
//! and schedules 16x16-pixel chunk fetches under a one-request-in-flight
//! backpressure policy. Rendering, UI and camera math live elsewhere; the
//! renderer consumes decoded pixel blocks through a callback and the UI
//! drives [`SessionConnection`] directly.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use pixelcanvas_net::{SessionConnection, Settings, TokenServer};
//!
//! let settings = Settings::load();
//! let session = Arc::new(SessionConnection::new());
//! session.set_chunk_callback(Arc::new(|coord, pixels| {
//!     // hand the 16x16 block to the renderer
//!     let _ = (coord, pixels);
//! }));
//!
//! // The captcha challenge is solved in a browser page that POSTs the
//! // token to this loopback endpoint.
//! let mut tokens = TokenServer::new(settings.captcha_port);
//! let weak = Arc::downgrade(&session);
//! tokens.set_callback(Arc::new(move |token| {
//!     if let Some(session) = weak.upgrade() {
//!         let _ = session.submit_captcha(&token);
//!     }
//! }));
//! tokens.start().expect("token server");
//!
//! session.connect(settings);
//! ```

pub mod captcha;
pub mod codec;
pub mod config;
pub mod error;
pub mod player;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod token_server;
pub mod transport;

pub use captcha::CaptchaGate;
pub use codec::DecodeError;
pub use config::Settings;
pub use error::SessionError;
pub use player::{PlayerRecord, PlayerTable};
pub use protocol::{CaptchaWireState, ChunkCoord, Rgb, ServerMessage, CHUNK_SIZE};
pub use scheduler::{ChunkScheduler, ChunkState, Viewport};
pub use session::{ChunkDataCallback, ConnectionState, SessionConnection};
pub use token_server::{TokenCallback, TokenServer};
pub use transport::TlsMode;
