//! # docsync Protocol
//!
//! Inbound change messages and batch framing for docsync.
//!
//! This crate provides:
//! - `ChangeMessage` (`added`, `changed`, `removed`, `replace`)
//! - `Frame` for `beginUpdate` / `update` / `endUpdate` framing
//! - CBOR and JSON encodings of frames
//! - length-prefixed CBOR frame streams
//!
//! This is a pure protocol crate with no I/O beyond `std::io` readers
//! and writers handed in by the caller.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod message;
mod stream;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::Frame;
pub use message::{ChangeMessage, MessageKind};
pub use stream::{read_frames, write_frames, MAX_FRAME_LEN};
