//! # Built-in Components
//!
//! Components every engine registers, host and scene alike:
//!
//! | Component | Kind | Id |
//! |---|---|---|
//! | [`Transform`] | LWW | 1 |
//! | [`Name`] | LWW | derived from `core-schema::Name` |
//! | [`PointerEventsResult`] | grow-only | 1063 |
//! | [`AvatarEmoteCommand`] | grow-only | 1088 |
//! | [`AudioEvent`] | grow-only | 1105 |

use bytemuck::{Pod, Zeroable};

use meridian_shared::constants::{
    AUDIO_EVENT_COMPONENT_ID, AVATAR_EMOTE_COMMAND_COMPONENT_ID, NAME_COMPONENT_NAME,
    POINTER_EVENTS_RESULT_COMPONENT_ID, TRANSFORM_COMPONENT_ID,
};
use meridian_shared::math::{Mat4, Quaternion, Vec3};

use super::component::component_id_from_name;
use super::{ComponentDefinition, ComponentKind, Engine, Entity};
use crate::codec::ByteBuffer;
use crate::error::{CodecError, CodecResult, EngineResult};
use crate::schema::Schema;

/// A component with a fixed id and name known to both sides.
pub trait BuiltinComponent: Schema + Send {
    /// Registered name.
    const NAME: &'static str;

    /// Consistency kind.
    const KIND: ComponentKind;

    /// Registered id.
    fn component_id() -> u32;

    /// Typed handle.
    #[must_use]
    fn definition() -> ComponentDefinition<Self> {
        ComponentDefinition::new(Self::component_id(), Self::KIND)
    }
}

/// A built-in grow-only component.
pub trait GrowOnlyComponent: BuiltinComponent {
    /// Ordering timestamp carried by the value.
    fn timestamp(&self) -> u64;
}

/// Registers every built-in component on `engine`.
///
/// # Errors
///
/// Fails if the engine is sealed or one of the ids is already taken.
pub fn register_builtins(engine: &mut Engine) -> EngineResult<()> {
    engine.define_component_with_id::<Transform>(Transform::component_id(), Transform::NAME)?;
    engine.define_component_with_id::<Name>(Name::component_id(), Name::NAME)?;
    register_grow_only::<PointerEventsResult>(engine)?;
    register_grow_only::<AvatarEmoteCommand>(engine)?;
    register_grow_only::<AudioEvent>(engine)?;
    Ok(())
}

fn register_grow_only<T: GrowOnlyComponent>(engine: &mut Engine) -> EngineResult<()> {
    let bound = engine.config().grow_only_max_elements;
    engine.define_grow_only_with_id::<T>(T::component_id(), T::NAME, bound, T::timestamp)?;
    Ok(())
}

// =============================================================================
// TRANSFORM
// =============================================================================

/// Local position, rotation and scale relative to a parent entity.
///
/// `parent` holds a raw entity id; `0` (the root) means no parent.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    /// Local position.
    pub position: Vec3,
    /// Local rotation (unit quaternion).
    pub rotation: Quaternion,
    /// Local non-uniform scale.
    pub scale: Vec3,
    /// Raw parent entity id.
    pub parent: u32,
}

impl Transform {
    /// Identity transform attached to the root.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quaternion::IDENTITY,
        scale: Vec3::ONE,
        parent: 0,
    };

    /// Identity transform placed at `position`.
    #[inline]
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Returns a copy with a different rotation.
    #[inline]
    #[must_use]
    pub const fn with_rotation(mut self, rotation: Quaternion) -> Self {
        self.rotation = rotation;
        self
    }

    /// Returns a copy with a different scale.
    #[inline]
    #[must_use]
    pub const fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Returns a copy attached to `parent`.
    #[inline]
    #[must_use]
    pub const fn with_parent(mut self, parent: Entity) -> Self {
        self.parent = parent.to_raw();
        self
    }

    /// Parent entity, `None` when attached to the root.
    #[inline]
    #[must_use]
    pub const fn parent_entity(&self) -> Option<Entity> {
        if self.parent == meridian_shared::ROOT_ENTITY {
            None
        } else {
            Some(Entity::from_raw(self.parent))
        }
    }

    /// Local matrix, scale applied first.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Schema for Transform {
    fn serialize(&self, buf: &mut ByteBuffer) {
        self.position.serialize(buf);
        self.rotation.serialize(buf);
        self.scale.serialize(buf);
        buf.write_u32(self.parent);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        Ok(Self {
            position: Vec3::deserialize(buf)?,
            rotation: Quaternion::deserialize(buf)?,
            scale: Vec3::deserialize(buf)?,
            parent: buf.read_u32()?,
        })
    }
}

impl BuiltinComponent for Transform {
    const NAME: &'static str = "core::Transform";
    const KIND: ComponentKind = ComponentKind::LastWriteWins;

    fn component_id() -> u32 {
        TRANSFORM_COMPONENT_ID
    }
}

// =============================================================================
// NAME
// =============================================================================

/// Human-readable entity name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Name {
    /// The name.
    pub value: String,
}

impl Name {
    /// Creates a name.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Schema for Name {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_string(&self.value);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        buf.read_string().map(|value| Self { value })
    }
}

impl BuiltinComponent for Name {
    const NAME: &'static str = NAME_COMPONENT_NAME;
    const KIND: ComponentKind = ComponentKind::LastWriteWins;

    fn component_id() -> u32 {
        component_id_from_name(NAME_COMPONENT_NAME)
    }
}

// =============================================================================
// POINTER EVENTS
// =============================================================================

/// Pointer event phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PointerEventType {
    /// Button pressed.
    Down = 0,
    /// Button released.
    Up = 1,
    /// Pointer entered the entity.
    HoverEnter = 2,
    /// Pointer left the entity.
    HoverLeave = 3,
}

impl PointerEventType {
    fn from_u8(value: u8) -> CodecResult<Self> {
        match value {
            0 => Ok(Self::Down),
            1 => Ok(Self::Up),
            2 => Ok(Self::HoverEnter),
            3 => Ok(Self::HoverLeave),
            other => Err(CodecError::InvalidValue {
                field: "PointerEventType",
                value: u64::from(other),
            }),
        }
    }
}

/// One pointer interaction the host observed on an entity.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerEventsResult {
    /// Input button index.
    pub button: u32,
    /// Event phase.
    pub state: PointerEventType,
    /// Hit point in world space.
    pub hit_position: Vec3,
    /// Host-assigned ordering timestamp.
    pub timestamp: u32,
    /// Host tick the event happened on.
    pub tick_number: u32,
}

impl Schema for PointerEventsResult {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_u32(self.button);
        buf.write_u8(self.state as u8);
        self.hit_position.serialize(buf);
        buf.write_u32(self.timestamp);
        buf.write_u32(self.tick_number);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        Ok(Self {
            button: buf.read_u32()?,
            state: PointerEventType::from_u8(buf.read_u8()?)?,
            hit_position: Vec3::deserialize(buf)?,
            timestamp: buf.read_u32()?,
            tick_number: buf.read_u32()?,
        })
    }
}

impl BuiltinComponent for PointerEventsResult {
    const NAME: &'static str = "core::PointerEventsResult";
    const KIND: ComponentKind = ComponentKind::GrowOnly;

    fn component_id() -> u32 {
        POINTER_EVENTS_RESULT_COMPONENT_ID
    }
}

impl GrowOnlyComponent for PointerEventsResult {
    fn timestamp(&self) -> u64 {
        u64::from(self.timestamp)
    }
}

// =============================================================================
// AVATAR EMOTE
// =============================================================================

/// Emote played by an avatar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvatarEmoteCommand {
    /// Emote identifier.
    pub emote_urn: String,
    /// Repeat until interrupted.
    pub looping: bool,
    /// Ordering timestamp.
    pub timestamp: u32,
}

impl Schema for AvatarEmoteCommand {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_string(&self.emote_urn);
        buf.write_bool(self.looping);
        buf.write_u32(self.timestamp);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        Ok(Self {
            emote_urn: buf.read_string()?,
            looping: buf.read_bool()?,
            timestamp: buf.read_u32()?,
        })
    }
}

impl BuiltinComponent for AvatarEmoteCommand {
    const NAME: &'static str = "core::AvatarEmoteCommand";
    const KIND: ComponentKind = ComponentKind::GrowOnly;

    fn component_id() -> u32 {
        AVATAR_EMOTE_COMMAND_COMPONENT_ID
    }
}

impl GrowOnlyComponent for AvatarEmoteCommand {
    fn timestamp(&self) -> u64 {
        u64::from(self.timestamp)
    }
}

// =============================================================================
// AUDIO EVENT
// =============================================================================

/// Playback state of an audio source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioState {
    /// Loading the clip.
    Loading = 0,
    /// Clip ready.
    Loaded = 1,
    /// Loading failed.
    Error = 2,
    /// Playing.
    Playing = 3,
    /// Paused.
    Paused = 4,
    /// Stopped.
    Stopped = 5,
}

impl AudioState {
    fn from_u8(value: u8) -> CodecResult<Self> {
        match value {
            0 => Ok(Self::Loading),
            1 => Ok(Self::Loaded),
            2 => Ok(Self::Error),
            3 => Ok(Self::Playing),
            4 => Ok(Self::Paused),
            5 => Ok(Self::Stopped),
            other => Err(CodecError::InvalidValue {
                field: "AudioState",
                value: u64::from(other),
            }),
        }
    }
}

/// Audio state change reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioEvent {
    /// New state.
    pub state: AudioState,
    /// Ordering timestamp.
    pub timestamp: u64,
}

impl Schema for AudioEvent {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_u8(self.state as u8);
        buf.write_u64(self.timestamp);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        Ok(Self {
            state: AudioState::from_u8(buf.read_u8()?)?,
            timestamp: buf.read_u64()?,
        })
    }
}

impl BuiltinComponent for AudioEvent {
    const NAME: &'static str = "core::AudioEvent";
    const KIND: ComponentKind = ComponentKind::GrowOnly;

    fn component_id() -> u32 {
        AUDIO_EVENT_COMPONENT_ID
    }
}

impl GrowOnlyComponent for AudioEvent {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Schema>(value: &T) {
        assert_eq!(&T::from_bytes(&value.to_bytes()).unwrap(), value);
    }

    #[test]
    fn test_transform_layout() {
        assert_eq!(std::mem::size_of::<Transform>(), 44);
        assert_eq!(Transform::IDENTITY.to_bytes().len(), 44);
        assert_eq!(Transform::default().parent_entity(), None);
    }

    #[test]
    fn test_builtin_roundtrips() {
        roundtrip(
            &Transform::from_position(Vec3::new(1.0, 2.0, 3.0))
                .with_rotation(Quaternion::from_euler_degrees(0.0, 90.0, 0.0))
                .with_scale(Vec3::new(2.0, 2.0, 2.0))
                .with_parent(Entity::new(512, 1)),
        );
        roundtrip(&Name::new("door"));
        roundtrip(&PointerEventsResult {
            button: 1,
            state: PointerEventType::HoverEnter,
            hit_position: Vec3::new(0.5, 1.0, -2.0),
            timestamp: 7,
            tick_number: 30,
        });
        roundtrip(&AvatarEmoteCommand {
            emote_urn: "wave".to_string(),
            looping: false,
            timestamp: 2,
        });
        roundtrip(&AudioEvent {
            state: AudioState::Playing,
            timestamp: u64::MAX,
        });
    }

    #[test]
    fn test_invalid_enum_rejected() {
        let mut bytes = AudioEvent {
            state: AudioState::Paused,
            timestamp: 1,
        }
        .to_bytes();
        bytes[0] = 42;
        assert!(matches!(
            AudioEvent::from_bytes(&bytes),
            Err(CodecError::InvalidValue { field: "AudioState", value: 42 })
        ));
    }

    #[test]
    fn test_builtin_ids() {
        assert_eq!(Transform::definition().id(), 1);
        assert_eq!(PointerEventsResult::definition().kind(), ComponentKind::GrowOnly);
        assert_eq!(Name::component_id(), component_id_from_name("core-schema::Name"));
    }
}
