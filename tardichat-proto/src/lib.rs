//! Shared data model and wire format for `TardiChat`.

pub mod channel;
pub mod frame;
pub mod message;
