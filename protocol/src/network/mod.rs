//! # Network Module
//!
//! Peer session layer for a Vesper node: authenticated connections in,
//! decoded messages out. Handles listening, dialing with identity pinning,
//! session registration, and per-connection receive dispatch.
//!
//! ## Architecture
//!
//! ```text
//! transport.rs  -- SecureChannel / SecureListener / Connection traits
//! memory.rs     -- in-process secure channel (loopback, tests, demo)
//! wire.rs       -- tag-byte frame codec: chat + channel family
//! session.rs    -- PeerSession lifecycle and send/recv surface
//! registry.rs   -- fingerprint -> session map with generation stamps
//! dispatch.rs   -- per-connection receive loop + ChannelHandler seam
//! listener.rs   -- bind + accept loop task
//! dialer.rs     -- outbound connect with fingerprint pinning
//! ```
//!
//! ## Design Decisions
//!
//! - The handshake lives behind `SecureChannel`. The node never sees key
//!   agreement or stream encryption, only authenticated connections with a
//!   proven remote public key.
//! - Last connection wins: re-registering a fingerprint closes the session
//!   it displaces. Combined with registration generations, a stale
//!   dispatcher can never evict its replacement.
//! - The registry rides on `dashmap` because lookups (every send) vastly
//!   outnumber registrations, and sessions behind `Arc` make entries cheap
//!   to hand out.
//! - Dispatch failures are graded: unknown tags and handler errors are
//!   logged and skipped, transport and framing errors end the session.

pub mod dialer;
pub mod dispatch;
pub mod listener;
pub mod memory;
pub mod registry;
pub mod session;
pub mod transport;
pub mod wire;

pub use dialer::Dialer;
pub use dispatch::{ChannelHandler, Dispatcher, HandlerError, NoopChannelHandler};
pub use listener::Listener;
pub use memory::{MemoryConnection, MemoryHub, MemoryListener};
pub use registry::PeerRegistry;
pub use session::{PeerSession, SessionInfo, SessionState};
pub use transport::{Connection, PeerAddress, SecureChannel, SecureListener, TransportError};
pub use wire::{Message, WireError};
