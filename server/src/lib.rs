//! # Relay Server Library
//!
//! This library provides the server side of the actor-state replication
//! protocol. The server does not simulate anything: every client is
//! authoritative over its own actor, and the server relays each update to
//! everyone else while remembering the last state it saw per client.
//!
//! ## Core Responsibilities
//!
//! ### Relaying
//! Full states and deltas from one client are re-encoded with a server
//! header naming the sender and copied to every other client on the channel
//! they arrived on. Nothing is echoed back to the sender.
//!
//! ### Join and Part Bookkeeping
//! A transport connect registers a record and announces the newcomer. The
//! newcomer is told about every existing client and receives their cached
//! full state, so it can place actors that are standing still. A transport
//! disconnect removes the record and announces the part.
//!
//! ### Latency Measurement
//! Each client is pinged with a timestamped ping every ten seconds. The
//! measured round trip is attached to that client's relayed full states so
//! receivers can tune their interpolation.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! One loop polls the transport, feeds each event to the relay, and flushes
//! the queued output once per tick. The registry is touched only from that
//! loop, so no locking is needed.
//!
//! ### Pure Relay Logic
//! [`relay::Relay`] consumes events and produces a queue of addressed
//! packets; [`network::Server`] is the only part that owns a socket.
//!
//! ## Module Organization
//!
//! - `relay`: client records, fan-out rules, late-joiner bootstrap, ping echo
//! - `network`: the event loop over the UDP transport
//! - `error`: the server error type
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind("0.0.0.0:1234", 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod network;
pub mod relay;

pub use error::ServerError;
