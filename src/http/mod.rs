//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → server.rs (spawn one session per connection)
//!     → session.rs (state machine)
//!         → request.rs (parse request line + headers)
//!         → cache lookup
//!         → forward.rs (HTTP/1.0 request to origin) on miss
//!         → relay + stage → cache insert
//!     → connection closed
//! ```

pub mod error;
pub mod forward;
pub mod request;
pub mod server;
pub mod session;

pub use error::{ParseError, ProxyError};
pub use request::ParsedRequest;
pub use server::ProxyServer;
pub use session::{Session, SessionOutcome, SessionSettings};
