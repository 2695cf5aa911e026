//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → connection.rs (id assignment, active-session tracking)
//!     → Hand off to the HTTP session
//! ```
//!
//! # Design Decisions
//! - One independent task per connection, detached from the acceptor
//! - Each connection tracked for logs and the active-session gauge

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
