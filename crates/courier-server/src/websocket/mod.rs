//! `WebSocket` connection plumbing.

pub mod connection;
pub mod session;
