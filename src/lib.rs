//! A node participating in a Chord distributed hash table: a peer-to-peer
//! ring that stores and locates small immutable file payloads by name, with
//! no central coordinator.
//!
//! The `chord` module holds the protocol engine (identifier arithmetic,
//! routing, ring maintenance, the file bucket); `network` holds the
//! JSON-RPC/TCP transport and the peer lifecycle; `commands` holds the
//! interactive prompt and its client-side operations.

pub mod chord;
pub mod commands;
pub mod error;
pub mod network;
