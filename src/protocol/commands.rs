//! Outbound (editor → engine) commands.
//!
//! Each variant owns exactly the fields its wire layout carries, in wire
//! order. Op code 16 is unassigned.

use serde::{Deserialize, Serialize};

use super::events::ComponentType;
use super::wire::{PayloadReader, PayloadWriter};
use crate::error::{EncodeError, ProtocolError};

/// Outbound op codes.
pub mod op_code {
    /// Mouse button pressed in the scene view.
    pub const MOUSE_DOWN: i32 = 1;
    /// Mouse moved in the scene view.
    pub const MOUSE_MOVE: i32 = 2;
    /// Mouse button released in the scene view.
    pub const MOUSE_UP: i32 = 3;
    /// Set a property of a component on the selected entity.
    pub const SET_PROPERTY: i32 = 4;
    /// Move the editor camera.
    pub const NAVIGATE: i32 = 5;
    /// Save the universe under a new path.
    pub const SAVE_AS: i32 = 6;
    /// Load a universe from disk.
    pub const OPEN_UNIVERSE: i32 = 7;
    /// Add a component to the selected entity.
    pub const CREATE_COMPONENT: i32 = 8;
    /// Ask for a component's property dump.
    pub const REQUEST_COMPONENT_PROPERTIES: i32 = 9;
    /// Remove a component from the selected entity.
    pub const REMOVE_COMPONENT: i32 = 10;
    /// Create an entity and select it.
    pub const CREATE_ENTITY: i32 = 11;
    /// Toggle game mode.
    pub const START_GAME_MODE: i32 = 12;
    /// Ask for the selected entity's position.
    pub const REQUEST_POSITION: i32 = 13;
    /// Move an entity.
    pub const SET_POSITION: i32 = 14;
    /// Destroy the selected entity.
    pub const REMOVE_ENTITY: i32 = 15;
    /// Open the selected entity's script in the external editor.
    pub const EDIT_SCRIPT: i32 = 17;
    /// Recompile a script.
    pub const RELOAD_SCRIPT: i32 = 18;
    /// Replace the universe with an empty one.
    pub const NEW_UNIVERSE: i32 = 19;
    /// Point the editor camera at the selection.
    pub const LOOK_AT_SELECTED: i32 = 20;
}

/// A command the editor sends to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// `i32 x, i32 y, i32 button`
    MouseDown {
        /// Viewport x.
        x: i32,
        /// Viewport y.
        y: i32,
        /// Button index.
        button: i32,
    },
    /// `i32 x, i32 y, i32 dx, i32 dy, i32 flags`
    MouseMove {
        /// Viewport x.
        x: i32,
        /// Viewport y.
        y: i32,
        /// Relative x motion.
        dx: i32,
        /// Relative y motion.
        dy: i32,
        /// Pressed-button flags.
        flags: i32,
    },
    /// `i32 x, i32 y, i32 button`
    MouseUp {
        /// Viewport x.
        x: i32,
        /// Viewport y.
        y: i32,
        /// Button index.
        button: i32,
    },
    /// `u32 component, str name, str value`
    SetProperty {
        /// Component on the selected entity.
        component: ComponentType,
        /// Property name.
        name: String,
        /// New value, textual.
        value: String,
    },
    /// `f32 forward, f32 right, i32 fast`
    Navigate {
        /// Forward motion.
        forward: f32,
        /// Sideways motion.
        right: f32,
        /// Fast movement modifier.
        fast: bool,
    },
    /// `str path`
    SaveUniverseAs {
        /// Destination path.
        path: String,
    },
    /// `str path`
    OpenUniverse {
        /// Universe file.
        path: String,
    },
    /// `u32 component`
    CreateComponent {
        /// Component type to add.
        component: ComponentType,
    },
    /// `u32 component`
    RequestComponentProperties {
        /// Component type to dump.
        component: ComponentType,
    },
    /// `u32 component`
    RemoveComponent {
        /// Component type to remove.
        component: ComponentType,
    },
    /// Empty payload.
    CreateEntity,
    /// Empty payload.
    StartGameMode,
    /// Empty payload.
    RequestPosition,
    /// `i32 entity, f32 x, f32 y, f32 z`
    SetPosition {
        /// Entity uid.
        entity: i32,
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
        /// Z coordinate.
        z: f32,
    },
    /// Empty payload.
    RemoveEntity,
    /// Empty payload.
    EditScript,
    /// `str path`
    ReloadScript {
        /// Script path.
        path: String,
    },
    /// Empty payload.
    NewUniverse,
    /// Empty payload.
    LookAtSelected,
}

impl Command {
    /// Wire op code.
    pub fn op_code(&self) -> i32 {
        match self {
            Self::MouseDown { .. } => op_code::MOUSE_DOWN,
            Self::MouseMove { .. } => op_code::MOUSE_MOVE,
            Self::MouseUp { .. } => op_code::MOUSE_UP,
            Self::SetProperty { .. } => op_code::SET_PROPERTY,
            Self::Navigate { .. } => op_code::NAVIGATE,
            Self::SaveUniverseAs { .. } => op_code::SAVE_AS,
            Self::OpenUniverse { .. } => op_code::OPEN_UNIVERSE,
            Self::CreateComponent { .. } => op_code::CREATE_COMPONENT,
            Self::RequestComponentProperties { .. } => op_code::REQUEST_COMPONENT_PROPERTIES,
            Self::RemoveComponent { .. } => op_code::REMOVE_COMPONENT,
            Self::CreateEntity => op_code::CREATE_ENTITY,
            Self::StartGameMode => op_code::START_GAME_MODE,
            Self::RequestPosition => op_code::REQUEST_POSITION,
            Self::SetPosition { .. } => op_code::SET_POSITION,
            Self::RemoveEntity => op_code::REMOVE_ENTITY,
            Self::EditScript => op_code::EDIT_SCRIPT,
            Self::ReloadScript { .. } => op_code::RELOAD_SCRIPT,
            Self::NewUniverse => op_code::NEW_UNIVERSE,
            Self::LookAtSelected => op_code::LOOK_AT_SELECTED,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MouseDown { .. } => "mouse_down",
            Self::MouseMove { .. } => "mouse_move",
            Self::MouseUp { .. } => "mouse_up",
            Self::SetProperty { .. } => "set_property",
            Self::Navigate { .. } => "navigate",
            Self::SaveUniverseAs { .. } => "save_universe_as",
            Self::OpenUniverse { .. } => "open_universe",
            Self::CreateComponent { .. } => "create_component",
            Self::RequestComponentProperties { .. } => "request_component_properties",
            Self::RemoveComponent { .. } => "remove_component",
            Self::CreateEntity => "create_entity",
            Self::StartGameMode => "start_game_mode",
            Self::RequestPosition => "request_position",
            Self::SetPosition { .. } => "set_position",
            Self::RemoveEntity => "remove_entity",
            Self::EditScript => "edit_script",
            Self::ReloadScript { .. } => "reload_script",
            Self::NewUniverse => "new_universe",
            Self::LookAtSelected => "look_at_selected",
        }
    }

    /// Write this command's payload fields.
    ///
    /// # Errors
    ///
    /// Non-finite floats and strings that are not ASCII or too long.
    pub fn write_payload(&self, w: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
        match self {
            Self::MouseDown { x, y, button } | Self::MouseUp { x, y, button } => {
                w.put_i32(*x);
                w.put_i32(*y);
                w.put_i32(*button);
            }
            Self::MouseMove { x, y, dx, dy, flags } => {
                w.put_i32(*x);
                w.put_i32(*y);
                w.put_i32(*dx);
                w.put_i32(*dy);
                w.put_i32(*flags);
            }
            Self::SetProperty { component, name, value } => {
                w.put_u32(component.0);
                w.put_str("name", name)?;
                w.put_str("value", value)?;
            }
            Self::Navigate { forward, right, fast } => {
                w.put_f32("forward", *forward)?;
                w.put_f32("right", *right)?;
                w.put_i32(i32::from(*fast));
            }
            Self::SaveUniverseAs { path }
            | Self::OpenUniverse { path }
            | Self::ReloadScript { path } => {
                w.put_str("path", path)?;
            }
            Self::CreateComponent { component }
            | Self::RequestComponentProperties { component }
            | Self::RemoveComponent { component } => {
                w.put_u32(component.0);
            }
            Self::SetPosition { entity, x, y, z } => {
                w.put_i32(*entity);
                w.put_f32("x", *x)?;
                w.put_f32("y", *y)?;
                w.put_f32("z", *z)?;
            }
            Self::CreateEntity
            | Self::StartGameMode
            | Self::RequestPosition
            | Self::RemoveEntity
            | Self::EditScript
            | Self::NewUniverse
            | Self::LookAtSelected => {}
        }
        Ok(())
    }

    /// Decode a command frame (engine side).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownOpCode`] for op codes outside the table, or a
    /// layout error when the payload is short.
    pub fn decode(op: i32, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PayloadReader::new(payload);
        let command = match op {
            op_code::MOUSE_DOWN => Self::MouseDown {
                x: r.read_i32("x")?,
                y: r.read_i32("y")?,
                button: r.read_i32("button")?,
            },
            op_code::MOUSE_MOVE => Self::MouseMove {
                x: r.read_i32("x")?,
                y: r.read_i32("y")?,
                dx: r.read_i32("dx")?,
                dy: r.read_i32("dy")?,
                flags: r.read_i32("flags")?,
            },
            op_code::MOUSE_UP => Self::MouseUp {
                x: r.read_i32("x")?,
                y: r.read_i32("y")?,
                button: r.read_i32("button")?,
            },
            op_code::SET_PROPERTY => Self::SetProperty {
                component: ComponentType(r.read_u32("component")?),
                name: r.read_string("name")?,
                value: r.read_string("value")?,
            },
            op_code::NAVIGATE => Self::Navigate {
                forward: r.read_f32("forward")?,
                right: r.read_f32("right")?,
                fast: r.read_i32("fast")? != 0,
            },
            op_code::SAVE_AS => Self::SaveUniverseAs { path: r.read_string("path")? },
            op_code::OPEN_UNIVERSE => Self::OpenUniverse { path: r.read_string("path")? },
            op_code::CREATE_COMPONENT => Self::CreateComponent {
                component: ComponentType(r.read_u32("component")?),
            },
            op_code::REQUEST_COMPONENT_PROPERTIES => Self::RequestComponentProperties {
                component: ComponentType(r.read_u32("component")?),
            },
            op_code::REMOVE_COMPONENT => Self::RemoveComponent {
                component: ComponentType(r.read_u32("component")?),
            },
            op_code::CREATE_ENTITY => Self::CreateEntity,
            op_code::START_GAME_MODE => Self::StartGameMode,
            op_code::REQUEST_POSITION => Self::RequestPosition,
            op_code::SET_POSITION => Self::SetPosition {
                entity: r.read_i32("entity")?,
                x: r.read_f32("x")?,
                y: r.read_f32("y")?,
                z: r.read_f32("z")?,
            },
            op_code::REMOVE_ENTITY => Self::RemoveEntity,
            op_code::EDIT_SCRIPT => Self::EditScript,
            op_code::RELOAD_SCRIPT => Self::ReloadScript { path: r.read_string("path")? },
            op_code::NEW_UNIVERSE => Self::NewUniverse,
            op_code::LOOK_AT_SELECTED => Self::LookAtSelected,
            other => return Err(ProtocolError::UnknownOpCode(other)),
        };
        if !r.is_empty() {
            log::debug!("[Wire] {} trailing bytes after op {op}", r.remaining());
        }
        Ok(command)
    }
}
