//! # Binary Message Codec
//!
//! A position-tracked [`ByteBuffer`] plus the CRDT message framing built on
//! top of it. Nothing in here knows what a component value means.

mod byte_buffer;
mod message;

pub use byte_buffer::ByteBuffer;
pub use message::{
    encode_batch, read_message, write_message, CrdtMessage, CrdtMessageType, MessageReader,
};
