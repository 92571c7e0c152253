//! # courier-core
//!
//! Session registry and message routing for the Courier relay.
//!
//! - [`registry::SessionRegistry`]: `userId` → live connection map with an
//!   online-user counter that only moves on insert/remove, never on replace
//! - [`handler::SessionHandler`]: per-connection `open → message* → close`
//!   state machine that stamps the sender and forwards to the recipient
//! - [`envelope::Envelope`]: the JSON record clients exchange
//! - [`errors::RelayError`]: failures scoped to one message or one connection
//!
//! Nothing in here knows about sockets. The transport adapter implements
//! [`session::TransportSession`] and feeds events through
//! [`handler::ConnectionEvents`].

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod session;

pub use envelope::Envelope;
pub use errors::{RelayError, Result, TransportError};
pub use handler::{ConnectionEvents, ConnectionState, SessionHandler};
pub use registry::{Registration, Removal, SessionRegistry};
pub use session::{ConnectionHandle, TransportSession};
