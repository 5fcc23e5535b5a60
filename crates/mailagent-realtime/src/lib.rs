//! # mailagent-realtime
//!
//! Realtime chat and email generation over a single WebSocket.
//!
//! - [`RealtimeSession`]: connection state machine, memoized readiness,
//!   correlation table, per-request timeout and cancellation, reconnect
//!   supervisor
//! - [`Transport`]: socket seam ([`WsTransport`] for real sockets,
//!   [`testing::MemoryTransport`] for tests)

#![deny(unsafe_code)]

pub mod errors;
pub mod options;
mod pending;
pub mod session;
pub mod state;
pub mod testing;
pub mod transport;

pub use errors::RealtimeError;
pub use options::{ReconnectMode, RequestOptions, SessionConfig};
pub use session::RealtimeSession;
pub use state::ConnectionState;
pub use transport::{Connection, Transport, TransportError, WsTransport};
