// src/protocol/mod.rs

//! Stdout status protocol spoken by the job container.
//!
//! A line is significant iff it looks like `*name:payload`. Everything else
//! is noise that only ends up in the diagnostic ring buffer.

pub mod decoder;

pub use decoder::{Decoded, ProtocolDecoder};
