//! # Outpost Server
//!
//! Networking and persistence around [`outpost_core`].
//!
//! The authoritative simulation runs in a [`session::HostSession`], which
//! serves any number of [`session::ReplicaSession`]s over TCP using the
//! length-prefixed JSON framing in [`framing`]. Host games and dedicated
//! servers share the same loop; the only difference is whether a local
//! player is driven in-process.
//!
//! ## Crate Structure
//!
//! - [`config`] - Server configuration (RON file + CLI overrides)
//! - [`framing`] - Wire envelope
//! - [`server`], [`client`] - TCP transport
//! - [`session`] - Host and replica loops
//! - [`persistence`] - Save files

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod persistence;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use error::{NetError, Result};
