//! Court queue: a broadcast authority for a shared pickup court and the client
//! library that mirrors its queue, match and court state.

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
