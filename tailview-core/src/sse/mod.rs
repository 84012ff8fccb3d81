//! # Server-Sent Events
//!
//! Incremental decoding of the `text/event-stream` wire format.

mod decoder;

pub use decoder::{SseDecoder, SseFrame};
