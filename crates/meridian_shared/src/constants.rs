//! # Protocol Constants
//!
//! Values shared by the host and every scene runtime.
//!
//! **CRITICAL:** host and scene must be built against the same values.
//! A mismatch makes cross-side messages decode into garbage.

// =============================================================================
// RESERVED ENTITIES
// =============================================================================

/// The world root. Its world matrix is always identity.
pub const ROOT_ENTITY: u32 = 0;

/// The local player avatar, owned by the host.
pub const PLAYER_ENTITY: u32 = 1;

/// The camera, owned by the host.
pub const CAMERA_ENTITY: u32 = 2;

/// Entity numbers below this value are reserved for the host.
pub const RESERVED_STATIC_ENTITIES: u32 = 512;

/// Largest entity number (entity numbers occupy the low 16 bits of an id).
pub const MAX_ENTITY_NUMBER: u32 = 0xFFFF;

/// First entity number the host allocates dynamically.
pub const HOST_ENTITY_RANGE_START: u32 = 3;

// =============================================================================
// COMPONENT IDS
// =============================================================================

/// Component ids below this value are statically assigned.
/// Name-derived ids are offset by it.
pub const MAX_STATIC_COMPONENT: u32 = 1 << 11;

/// `Transform` (LWW).
pub const TRANSFORM_COMPONENT_ID: u32 = 1;

/// `PointerEventsResult` (grow-only).
pub const POINTER_EVENTS_RESULT_COMPONENT_ID: u32 = 1063;

/// `AvatarEmoteCommand` (grow-only).
pub const AVATAR_EMOTE_COMMAND_COMPONENT_ID: u32 = 1088;

/// `AudioEvent` (grow-only).
pub const AUDIO_EVENT_COMPONENT_ID: u32 = 1105;

/// Name of the `Name` component; its id is derived from this string.
pub const NAME_COMPONENT_NAME: &str = "core-schema::Name";

/// Default bound for grow-only components.
pub const DEFAULT_GROW_ONLY_MAX_ELEMENTS: usize = 100;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// `length u32 | entity u32 | type u8`. The whole of a DELETE_ENTITY message.
pub const ENTITY_MESSAGE_HEADER_LENGTH: u32 = 9;

/// Entity header plus `component_id u32 | timestamp u32`.
pub const COMPONENT_MESSAGE_HEADER_LENGTH: u32 = ENTITY_MESSAGE_HEADER_LENGTH + 8;

/// Largest message accepted on decode (1 MiB).
pub const MAX_MESSAGE_LENGTH: u32 = 1 << 20;

// =============================================================================
// SANDBOX
// =============================================================================

/// System module exposing the state exchange calls.
pub const SYSTEM_ENGINE_API: &str = "~system/EngineApi";

/// System module exposing runtime information (tick, scene id).
pub const SYSTEM_RUNTIME: &str = "~system/Runtime";

/// Every module a scene may request. Anything else is a fatal error.
pub const SYSTEM_MODULES: [&str; 2] = [SYSTEM_ENGINE_API, SYSTEM_RUNTIME];

/// Host tick rate (ticks per second).
pub const TICK_RATE: u32 = 30;
