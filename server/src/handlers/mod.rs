pub mod client;
pub mod heartbeat;
pub mod room;
pub mod transfer;

pub use client::*;
