#![forbid(unsafe_code)]

//! Keeps a local collection of video files in step with a YouTube channel:
//! uploads what is missing, pushes metadata, and reconciles playlists so they
//! mirror the local grouping.

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod plan;
pub mod playlist;
pub mod repo;
pub mod request;
pub mod resources;
pub mod security;
pub mod sync;
pub mod upload;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CurationError, Result};
