//! # CRDT Message Framing
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! DELETE_ENTITY:  length u32 | entity u32 | type u8
//! other types:    length u32 | entity u32 | type u8 | component_id u32 | timestamp u32 | payload
//! ```
//!
//! `length` counts the whole message, header included. PUT and APPEND carry a
//! payload, DELETE_COMPONENT carries none.
//!
//! Decoding never panics. A malformed message whose frame is intact is
//! consumed whole so the next message starts on a clean boundary. A frame
//! whose length cannot be trusted consumes the rest of the buffer.

use meridian_shared::constants::{
    COMPONENT_MESSAGE_HEADER_LENGTH, ENTITY_MESSAGE_HEADER_LENGTH, MAX_MESSAGE_LENGTH,
};

use super::ByteBuffer;
use crate::ecs::Entity;
use crate::error::{CodecError, CodecResult};

/// Message type byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CrdtMessageType {
    /// Set an LWW value.
    PutComponent = 0,
    /// Tombstone an LWW value.
    DeleteComponent = 1,
    /// Remove every component of an entity.
    DeleteEntity = 2,
    /// Append to a grow-only set.
    AppendValue = 3,
}

impl CrdtMessageType {
    /// Parses a type byte.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PutComponent),
            1 => Some(Self::DeleteComponent),
            2 => Some(Self::DeleteEntity),
            3 => Some(Self::AppendValue),
            _ => None,
        }
    }
}

/// One decoded CRDT message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrdtMessage {
    /// LWW value write.
    PutComponent {
        /// Target entity.
        entity: Entity,
        /// Component id.
        component_id: u32,
        /// Originator timestamp.
        timestamp: u32,
        /// Serialized value.
        data: Vec<u8>,
    },
    /// LWW tombstone.
    DeleteComponent {
        /// Target entity.
        entity: Entity,
        /// Component id.
        component_id: u32,
        /// Originator timestamp.
        timestamp: u32,
    },
    /// Entity removal.
    DeleteEntity {
        /// Removed entity.
        entity: Entity,
    },
    /// Grow-only append.
    AppendValue {
        /// Target entity.
        entity: Entity,
        /// Component id.
        component_id: u32,
        /// Originator timestamp.
        timestamp: u32,
        /// Serialized value.
        data: Vec<u8>,
    },
}

impl CrdtMessage {
    /// Message type.
    #[must_use]
    pub const fn message_type(&self) -> CrdtMessageType {
        match self {
            Self::PutComponent { .. } => CrdtMessageType::PutComponent,
            Self::DeleteComponent { .. } => CrdtMessageType::DeleteComponent,
            Self::DeleteEntity { .. } => CrdtMessageType::DeleteEntity,
            Self::AppendValue { .. } => CrdtMessageType::AppendValue,
        }
    }

    /// Target entity.
    #[must_use]
    pub const fn entity(&self) -> Entity {
        match self {
            Self::PutComponent { entity, .. }
            | Self::DeleteComponent { entity, .. }
            | Self::DeleteEntity { entity }
            | Self::AppendValue { entity, .. } => *entity,
        }
    }

    /// Component id, `None` for DELETE_ENTITY.
    #[must_use]
    pub const fn component_id(&self) -> Option<u32> {
        match self {
            Self::PutComponent { component_id, .. }
            | Self::DeleteComponent { component_id, .. }
            | Self::AppendValue { component_id, .. } => Some(*component_id),
            Self::DeleteEntity { .. } => None,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::DeleteEntity { .. } => ENTITY_MESSAGE_HEADER_LENGTH as usize,
            Self::DeleteComponent { .. } => COMPONENT_MESSAGE_HEADER_LENGTH as usize,
            Self::PutComponent { data, .. } | Self::AppendValue { data, .. } => {
                COMPONENT_MESSAGE_HEADER_LENGTH as usize + data.len()
            }
        }
    }

    /// True if the message is within [`MAX_MESSAGE_LENGTH`].
    #[must_use]
    pub fn fits_frame(&self) -> bool {
        self.encoded_len() <= MAX_MESSAGE_LENGTH as usize
    }
}

/// Appends one message to `buf`.
///
/// # Errors
///
/// [`CodecError::MessageTooLarge`] if the message would exceed
/// [`MAX_MESSAGE_LENGTH`]. Nothing is written in that case.
pub fn write_message(buf: &mut ByteBuffer, message: &CrdtMessage) -> CodecResult<()> {
    let encoded = message.encoded_len();
    let length = u32::try_from(encoded)
        .ok()
        .filter(|length| *length <= MAX_MESSAGE_LENGTH)
        .ok_or(CodecError::MessageTooLarge {
            length: encoded,
            maximum: MAX_MESSAGE_LENGTH,
        })?;
    buf.write_u32(length);
    buf.write_u32(message.entity().to_raw());
    buf.write_u8(message.message_type() as u8);
    match message {
        CrdtMessage::DeleteEntity { .. } => {}
        CrdtMessage::DeleteComponent {
            component_id,
            timestamp,
            ..
        } => {
            buf.write_u32(*component_id);
            buf.write_u32(*timestamp);
        }
        CrdtMessage::PutComponent {
            component_id,
            timestamp,
            data,
            ..
        }
        | CrdtMessage::AppendValue {
            component_id,
            timestamp,
            data,
            ..
        } => {
            buf.write_u32(*component_id);
            buf.write_u32(*timestamp);
            buf.write_bytes(data);
        }
    }
    Ok(())
}

/// Encodes a sequence of messages into one batch.
///
/// Messages too large to frame are left out so they cannot corrupt the rest
/// of the batch. Callers that care filter them first with
/// [`CrdtMessage::fits_frame`].
#[must_use]
pub fn encode_batch<'a>(messages: impl IntoIterator<Item = &'a CrdtMessage>) -> Vec<u8> {
    let mut buf = ByteBuffer::new();
    for message in messages {
        // Oversized messages write nothing.
        let _ = write_message(&mut buf, message);
    }
    buf.into_bytes()
}

/// Reads the next message from `buf`.
///
/// Returns `Ok(None)` once no bytes are left.
///
/// # Errors
///
/// Any [`CodecError`] describes one skipped message. The buffer is always
/// left at the start of the next message (or at its end), so the caller can
/// keep reading.
pub fn read_message(buf: &mut ByteBuffer) -> CodecResult<Option<CrdtMessage>> {
    let available = buf.remaining();
    if available == 0 {
        return Ok(None);
    }

    let length = match buf.peek_u32() {
        Ok(length) => length,
        Err(err) => {
            buf.skip(available);
            return Err(err);
        }
    };
    if !(ENTITY_MESSAGE_HEADER_LENGTH..=MAX_MESSAGE_LENGTH).contains(&length) {
        buf.skip(available);
        return Err(CodecError::InvalidLength {
            length,
            minimum: ENTITY_MESSAGE_HEADER_LENGTH,
            maximum: MAX_MESSAGE_LENGTH,
        });
    }
    if length as usize > available {
        buf.skip(available);
        return Err(CodecError::Truncated {
            needed: length as usize,
            available,
        });
    }

    // The frame is complete: from here on errors consume exactly this message.
    let mut frame = ByteBuffer::from_bytes(&buf.unread()[..length as usize]);
    buf.skip(length as usize);
    decode_frame(&mut frame, length).map(Some)
}

fn decode_frame(frame: &mut ByteBuffer, length: u32) -> CodecResult<CrdtMessage> {
    frame.skip(4);
    let entity = Entity::from_raw(frame.read_u32()?);
    let raw_type = frame.read_u8()?;
    let message_type =
        CrdtMessageType::from_u8(raw_type).ok_or(CodecError::UnknownMessageType(raw_type))?;

    if message_type == CrdtMessageType::DeleteEntity {
        return match frame.remaining() {
            0 => Ok(CrdtMessage::DeleteEntity { entity }),
            extra => Err(CodecError::TrailingBytes(extra)),
        };
    }

    if length < COMPONENT_MESSAGE_HEADER_LENGTH {
        return Err(CodecError::InvalidLength {
            length,
            minimum: COMPONENT_MESSAGE_HEADER_LENGTH,
            maximum: MAX_MESSAGE_LENGTH,
        });
    }
    let component_id = frame.read_u32()?;
    let timestamp = frame.read_u32()?;

    match message_type {
        CrdtMessageType::DeleteComponent => match frame.remaining() {
            0 => Ok(CrdtMessage::DeleteComponent {
                entity,
                component_id,
                timestamp,
            }),
            extra => Err(CodecError::TrailingBytes(extra)),
        },
        CrdtMessageType::PutComponent => Ok(CrdtMessage::PutComponent {
            entity,
            component_id,
            timestamp,
            data: frame.unread().to_vec(),
        }),
        CrdtMessageType::AppendValue => Ok(CrdtMessage::AppendValue {
            entity,
            component_id,
            timestamp,
            data: frame.unread().to_vec(),
        }),
        CrdtMessageType::DeleteEntity => Ok(CrdtMessage::DeleteEntity { entity }),
    }
}

/// Iterator over the messages of a batch.
///
/// Yields `Err` for each skipped message and stops at the end of the data.
#[derive(Debug)]
pub struct MessageReader {
    buf: ByteBuffer,
}

impl MessageReader {
    /// Creates a reader over a copy of `bytes`.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            buf: ByteBuffer::from_bytes(bytes),
        }
    }
}

impl Iterator for MessageReader {
    type Item = CodecResult<CrdtMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        read_message(&mut self.buf).transpose()
    }
}
