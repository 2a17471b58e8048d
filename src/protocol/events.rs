//! Inbound (engine → editor) messages.
//!
//! | type | message             | payload                                              |
//! |------|---------------------|------------------------------------------------------|
//! | 1    | EntitySelected      | `i32 uid` + (`i32 n`, `n × u32 component`) unless -1 |
//! | 2    | ComponentProperties | `i32 n`, `u32 component`, `n × (str, str, u32 kind)` |
//! | 3    | EntityPosition      | `i32 uid`, `f32 x`, `f32 y`, `f32 z`                 |
//! | 4    | LogMessage          | `i32 severity`, `str system`, `str message`          |

use std::fmt;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::framing::write_frame;
use super::wire::{PayloadReader, PayloadWriter, FIELD_SIZE};
use crate::error::{EncodeError, ProtocolError};

/// Inbound type codes.
pub mod event_type {
    /// Selection changed.
    pub const ENTITY_SELECTED: i32 = 1;
    /// Property dump for one component of the selected entity.
    pub const COMPONENT_PROPERTIES: i32 = 2;
    /// Position of an entity.
    pub const ENTITY_POSITION: i32 = 3;
    /// Engine log line.
    pub const LOG_MESSAGE: i32 = 4;
}

/// Entity uid the engine sends when nothing is selected.
pub const NO_ENTITY: i32 = -1;

/// Component type identifier (a hash of the component name on the engine side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentType(pub u32);

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for ComponentType {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Selection change reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntitySelected {
    /// Nothing is selected (uid -1 on the wire).
    Cleared,
    /// An entity is selected. `components` may be empty.
    Entity {
        /// Entity uid.
        uid: i32,
        /// Types of the components the entity carries.
        components: Vec<ComponentType>,
    },
}

impl EntitySelected {
    /// The selected uid, or [`NO_ENTITY`].
    pub fn uid(&self) -> i32 {
        match self {
            Self::Cleared => NO_ENTITY,
            Self::Entity { uid, .. } => *uid,
        }
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let uid = reader.read_i32("uid")?;
        if uid == NO_ENTITY {
            return Ok(Self::Cleared);
        }
        let count = reader.read_count("components", FIELD_SIZE)?;
        let components = (0..count)
            .map(|_| reader.read_u32("component").map(ComponentType))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Entity { uid, components })
    }

    fn write(&self, w: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
        match self {
            Self::Cleared => w.put_i32(NO_ENTITY),
            Self::Entity { uid, components } => {
                w.put_i32(*uid);
                w.put_count("components", components.len())?;
                for component in components {
                    w.put_u32(component.0);
                }
            }
        }
        Ok(())
    }
}

/// How the engine-side editor should present a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// `true` / `false`.
    Bool,
    /// Floating point number.
    Decimal,
    /// Integer.
    Integer,
    /// Free text.
    String,
    /// Resource path.
    File,
    /// Three comma-separated floats.
    Vec3,
    /// RGBA color.
    Color,
    /// A kind this editor does not know about.
    Other(u32),
}

impl PropertyKind {
    /// Decode the wire value.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Bool,
            1 => Self::Decimal,
            2 => Self::Integer,
            3 => Self::String,
            4 => Self::File,
            5 => Self::Vec3,
            6 => Self::Color,
            other => Self::Other(other),
        }
    }

    /// Wire value.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Bool => 0,
            Self::Decimal => 1,
            Self::Integer => 2,
            Self::String => 3,
            Self::File => 4,
            Self::Vec3 => 5,
            Self::Color => 6,
            Self::Other(other) => other,
        }
    }
}

/// One `(name, value, kind)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentProperty {
    /// Property name.
    pub name: String,
    /// Current value, textual.
    pub value: String,
    /// Value kind.
    pub kind: PropertyKind,
}

/// Property dump for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentProperties {
    /// Component the properties belong to.
    pub component: ComponentType,
    /// Properties in engine order.
    pub properties: Vec<ComponentProperty>,
}

impl ComponentProperties {
    /// Look up a property by name.
    pub fn get(&self, name: &str) -> Option<&ComponentProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        // Smallest triple: two empty strings and a kind.
        let count = reader.read_count("properties", 3 * FIELD_SIZE)?;
        let component = ComponentType(reader.read_u32("component")?);
        let mut properties = Vec::with_capacity(count);
        for _ in 0..count {
            properties.push(ComponentProperty {
                name: reader.read_string("property name")?,
                value: reader.read_string("property value")?,
                kind: PropertyKind::from_u32(reader.read_u32("property kind")?),
            });
        }
        Ok(Self { component, properties })
    }

    fn write(&self, w: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
        w.put_count("properties", self.properties.len())?;
        w.put_u32(self.component.0);
        for property in &self.properties {
            w.put_str("property name", &property.name)?;
            w.put_str("property value", &property.value)?;
            w.put_u32(property.kind.to_u32());
        }
        Ok(())
    }
}

/// World position of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityPosition {
    /// Entity uid.
    pub uid: i32,
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl EntityPosition {
    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            uid: reader.read_i32("uid")?,
            x: reader.read_f32("x")?,
            y: reader.read_f32("y")?,
            z: reader.read_f32("z")?,
        })
    }

    fn write(&self, w: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
        w.put_i32(self.uid);
        w.put_f32("x", self.x)?;
        w.put_f32("y", self.y)?;
        w.put_f32("z", self.z)
    }
}

/// Severity of an engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSeverity {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
    /// Unrecognized severity code.
    Other(i32),
}

impl LogSeverity {
    /// Decode the wire value.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Info,
            1 => Self::Warning,
            2 => Self::Error,
            other => Self::Other(other),
        }
    }

    /// Wire value.
    pub fn to_i32(self) -> i32 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
            Self::Other(other) => other,
        }
    }
}

/// Log line forwarded from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Severity.
    pub severity: LogSeverity,
    /// Engine subsystem that logged the line.
    pub system: String,
    /// Message text.
    pub message: String,
}

impl LogMessage {
    fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            severity: LogSeverity::from_i32(reader.read_i32("severity")?),
            system: reader.read_string("system")?,
            message: reader.read_string("message")?,
        })
    }

    fn write(&self, w: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
        w.put_i32(self.severity.to_i32());
        w.put_str("system", &self.system)?;
        w.put_str("message", &self.message)
    }
}

/// Any decoded inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Type 1.
    EntitySelected(EntitySelected),
    /// Type 2.
    ComponentProperties(ComponentProperties),
    /// Type 3.
    EntityPosition(EntityPosition),
    /// Type 4.
    LogMessage(LogMessage),
}

impl InboundEvent {
    /// Wire type code.
    pub fn type_code(&self) -> i32 {
        match self {
            Self::EntitySelected(_) => event_type::ENTITY_SELECTED,
            Self::ComponentProperties(_) => event_type::COMPONENT_PROPERTIES,
            Self::EntityPosition(_) => event_type::ENTITY_POSITION,
            Self::LogMessage(_) => event_type::LOG_MESSAGE,
        }
    }

    /// Decode a frame payload.
    ///
    /// Returns `Ok(None)` for a type code this editor does not understand.
    ///
    /// # Errors
    ///
    /// A payload that does not match its type's layout is a [`ProtocolError`].
    pub fn decode(type_code: i32, payload: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let mut reader = PayloadReader::new(payload);
        let event = match type_code {
            event_type::ENTITY_SELECTED => {
                Self::EntitySelected(EntitySelected::decode(&mut reader)?)
            }
            event_type::COMPONENT_PROPERTIES => {
                Self::ComponentProperties(ComponentProperties::decode(&mut reader)?)
            }
            event_type::ENTITY_POSITION => {
                Self::EntityPosition(EntityPosition::decode(&mut reader)?)
            }
            event_type::LOG_MESSAGE => Self::LogMessage(LogMessage::decode(&mut reader)?),
            _ => return Ok(None),
        };
        if !reader.is_empty() {
            log::debug!(
                "[Wire] {} trailing bytes after event type {type_code}",
                reader.remaining()
            );
        }
        Ok(Some(event))
    }

    /// Write this event's payload fields.
    pub fn write_payload(&self, w: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
        match self {
            Self::EntitySelected(e) => e.write(w),
            Self::ComponentProperties(e) => e.write(w),
            Self::EntityPosition(e) => e.write(w),
            Self::LogMessage(e) => e.write(w),
        }
    }

    /// Encode a complete frame (engine side).
    pub fn encode(&self, max_frame_size: u32) -> Result<Bytes, EncodeError> {
        let mut buf = BytesMut::new();
        write_frame(&mut buf, self.type_code(), max_frame_size, |w| self.write_payload(w))?;
        Ok(buf.freeze())
    }
}
