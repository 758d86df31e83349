#![deny(missing_debug_implementations)]

//! Room lifecycle, proxy routing, and image-pull engine for a fleet of
//! isolated, browser-exposed interactive desktop sessions ("rooms").
//!
//! A room is a container running a streaming desktop agent. This crate
//! owns the hard parts of operating a fleet of them: materialising a
//! declarative [`model::RoomSpec`] into a container (port allocation,
//! labels, mounts, env), projecting low-level container events into the
//! high-level [`model::RoomEvent`]s the rest of the system reacts to,
//! routing HTTP traffic to the right room by path prefix, and pulling
//! images with progress fan-out.
//!
//! It does not listen on a socket itself — that, along with
//! configuration loading and the REST surface, is the job of the
//! `roomd` binary crate that embeds this library.

pub mod config;
pub mod env_codec;
pub mod error;
pub mod events;
pub mod gpu;
pub mod host;
pub mod labels;
pub mod manifest;
pub mod model;
pub mod port_allocator;
pub mod prefix_tree;
pub mod proxy;
pub mod pull_manager;
pub mod room_manager;

pub use error::{Error, ErrorKind, Result};
