//! # courier-server
//!
//! Axum HTTP + `WebSocket` transport for the Courier relay.
//!
//! - `/websocket/{userId}` upgrades and hands the socket to a
//!   [`courier_core::SessionHandler`]
//! - `/push/{userId}` pushes a server-originated message to one user
//! - `/health` and `/metrics` for operators
//! - Heartbeat via server Ping frames, dead peers closed after a Pong timeout
//! - Graceful shutdown via [`shutdown::ShutdownCoordinator`]

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::RelayServer;
