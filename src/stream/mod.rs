// src/stream/mod.rs
//! Stream controller: post generation + batched classification for one hashtag.

pub mod controller;
pub mod state;

pub use controller::{StopReason, StreamController, StreamEvent, StreamHandle};
pub use state::{
    normalize_hashtag, resolve_batch, Batch, StreamError, StreamSnapshot, StreamState,
    StreamStatus, RATE_LIMIT_MESSAGE,
};
