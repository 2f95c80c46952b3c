//! # Client Library
//!
//! This library provides the client side of the actor-state replication
//! protocol. Each client is authoritative over one actor: it moves that
//! actor from local input, tells the server about it as cheaply as it can,
//! and turns the states relayed from everyone else into smooth motion.
//!
//! ## Architecture Overview
//!
//! ### Sending: full states and deltas
//! A delta carries only the movement flags and rotation; the receiver
//! extrapolates position from them. Deltas go out the tick the input
//! changes. Because extrapolation drifts, a full state with the position
//! is sent every five seconds while moving and when the actor comes to rest
//! after a stretch of activity.
//!
//! ### Receiving: dead reckoning and blending
//! Every remote actor has a rendered state and a target. Packets only move
//! the target. Each tick both are carried along the velocity the flags
//! imply, and the rendered state closes a fixed fraction of the remaining
//! gap, more gently for senders with high latency. The first full state
//! snaps the actor into place so it never slides in from the origin.
//!
//! ### No ambient state
//! The whole simulation lives in [`world::World`], which the frame loop
//! passes around explicitly.
//!
//! ## Module Organization
//!
//! ### Replicator Module (`replicator`)
//! The per-tick decision between a full state, a delta, or nothing.
//!
//! ### Reconciler Module (`reconciler`)
//! Remote actor records and the blend toward their targets.
//!
//! ### World Module (`world`)
//! The local actor, the remote registry, and the simulated clock.
//!
//! ### Network Module (`network`)
//! The connection to the server, ping handling, and the per-frame update.
//!
//! ### Input and Rendering Modules (`input`, `rendering`)
//! Keyboard sampling and a top-down debug view, both through macroquad.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::InputSample;
//! use client::network::{resolve_server, Client};
//!
//! # async fn run() -> Result<(), client::ClientError> {
//! let addr = resolve_server("127.0.0.1")?;
//! let mut client = Client::connect(addr, Some("alice")).await?;
//!
//! for _ in 0..600 {
//!     client.update(InputSample::default(), 1.0 / 60.0).await?;
//! }
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod input;
pub mod network;
pub mod reconciler;
pub mod rendering;
pub mod replicator;
pub mod world;

pub use error::ClientError;
