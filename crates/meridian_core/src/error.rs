//! # Core Error Types
//!
//! Errors are split by tier:
//! - [`EngineError`]: caller bugs (unknown component, dead entity). Fail fast.
//! - [`CodecError`]: wire corruption. Never escapes batch application; the
//!   offending message is skipped and counted.
//! - [`HierarchyError`]: malformed transform trees.
//! - [`ConfigError`]: unreadable configuration files.

use thiserror::Error;

use crate::ecs::Entity;

/// Errors raised while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Not enough bytes left to read a value.
    #[error("truncated data: need {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// Message length prefix is smaller than its header or larger than allowed.
    #[error("invalid message length {length} (minimum {minimum}, maximum {maximum})")]
    InvalidLength {
        /// Declared length.
        length: u32,
        /// Smallest valid length for this message.
        minimum: u32,
        /// Largest accepted length.
        maximum: u32,
    },

    /// Unknown message type byte.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// A message is too large to frame.
    #[error("message of {length} bytes exceeds the {maximum} byte limit")]
    MessageTooLarge {
        /// Encoded size of the message.
        length: usize,
        /// Largest accepted length.
        maximum: u32,
    },

    /// A payload decoded but left unread bytes behind.
    #[error("trailing bytes after payload: {0}")]
    TrailingBytes(usize),

    /// A string field is not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A field holds a value outside its domain.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending raw value.
        value: u64,
    },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Programming errors raised by the engine API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No component registered under this id.
    #[error("unknown component id {0}")]
    UnknownComponent(u32),

    /// No component registered under this name.
    #[error("unknown component name {0:?}")]
    UnknownComponentName(String),

    /// The component id is registered with a different value type or kind.
    #[error("component {name:?} ({id}) has a different type or kind than requested")]
    ComponentTypeMismatch {
        /// Component id.
        id: u32,
        /// Component name.
        name: String,
    },

    /// A definition with the same id or name already exists.
    #[error("component {name:?} ({id}) is already defined")]
    DuplicateComponent {
        /// Component id.
        id: u32,
        /// Component name.
        name: String,
    },

    /// Components cannot be defined after the engine is sealed.
    #[error("engine is sealed, cannot define component {0:?}")]
    EngineSealed(String),

    /// `get`/`get_mutable` on an entity that has no value.
    #[error("component {component:?} not found on entity {entity}")]
    ComponentNotFound {
        /// Component name.
        component: String,
        /// Entity that was queried.
        entity: Entity,
    },

    /// `create` on an entity that already has a value.
    #[error("component {component:?} already exists on entity {entity}")]
    ComponentAlreadyExists {
        /// Component name.
        component: String,
        /// Entity that was written.
        entity: Entity,
    },

    /// The entity was removed or never allocated.
    #[error("entity {0} is not alive")]
    EntityNotAlive(Entity),

    /// No free entity number in the configured range.
    #[error("entity range {start}..{end} exhausted")]
    EntityRangeExhausted {
        /// First number of the range.
        start: u32,
        /// One past the last number of the range.
        end: u32,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while resolving transform hierarchies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// Following parent links revisited an entity.
    #[error("transform parent cycle detected at entity {0}")]
    Cycle(Entity),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected structure.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values parse but are inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
