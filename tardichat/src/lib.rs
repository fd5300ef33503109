//! `tardichat` — real-time channel messaging client library.

pub mod api;
pub mod auth;
pub mod config;
pub mod reconnect;
pub mod session;
pub mod transport;
