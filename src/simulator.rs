//! A stand-in engine for tests and manual experiments.
//!
//! Listens on TCP, decodes command frames with the same reassembler the
//! editor uses, and answers from a tiny in-memory world: entities with a
//! position and a set of components, plus the current selection.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::constants::ACCEPT_RETRY_DELAY;
use crate::error::{LinkError, ProtocolError};
use crate::protocol::commands::Command;
use crate::protocol::events::{
    ComponentProperties, ComponentProperty, ComponentType, EntityPosition, EntitySelected,
    InboundEvent, LogMessage, LogSeverity, PropertyKind,
};
use crate::protocol::reassembler::StreamReassembler;

const LOG_SYSTEM: &str = "editor";

#[derive(Debug, Clone, Default, PartialEq)]
struct Entity {
    position: [f32; 3],
    components: Vec<(ComponentType, Vec<ComponentProperty>)>,
}

impl Entity {
    fn component_types(&self) -> Vec<ComponentType> {
        self.components.iter().map(|(ty, _)| *ty).collect()
    }

    fn component_mut(&mut self, ty: ComponentType) -> Option<&mut Vec<ComponentProperty>> {
        self.components
            .iter_mut()
            .find(|(t, _)| *t == ty)
            .map(|(_, props)| props)
    }
}

/// Engine-side world state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    entities: BTreeMap<i32, Entity>,
    next_uid: i32,
    selected: Option<i32>,
    game_mode: bool,
}

fn log_event(severity: LogSeverity, message: String) -> InboundEvent {
    InboundEvent::LogMessage(LogMessage {
        severity,
        system: LOG_SYSTEM.to_string(),
        message,
    })
}

fn nothing_selected(command: &Command) -> InboundEvent {
    log_event(
        LogSeverity::Warning,
        format!("{}: no entity selected", command.name()),
    )
}

impl World {
    /// An empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Uid of the selected entity.
    pub fn selected(&self) -> Option<i32> {
        self.selected
    }

    /// Components of entity `uid`.
    pub fn components(&self, uid: i32) -> Option<Vec<ComponentType>> {
        self.entities.get(&uid).map(Entity::component_types)
    }

    /// Position of entity `uid`.
    pub fn position(&self, uid: i32) -> Option<[f32; 3]> {
        self.entities.get(&uid).map(|e| e.position)
    }

    /// Whether game mode is running.
    pub fn game_mode(&self) -> bool {
        self.game_mode
    }

    fn selection_event(&self) -> InboundEvent {
        let selected = self
            .selected
            .and_then(|uid| self.entities.get(&uid).map(|e| (uid, e)));
        InboundEvent::EntitySelected(match selected {
            Some((uid, entity)) => EntitySelected::Entity {
                uid,
                components: entity.component_types(),
            },
            None => EntitySelected::Cleared,
        })
    }

    fn reset(&mut self) -> Vec<InboundEvent> {
        let had_selection = self.selected.is_some();
        self.entities.clear();
        self.selected = None;
        self.game_mode = false;
        if had_selection {
            vec![InboundEvent::EntitySelected(EntitySelected::Cleared)]
        } else {
            Vec::new()
        }
    }

    /// Apply one command and return the events the engine sends back.
    pub fn handle(&mut self, command: &Command) -> Vec<InboundEvent> {
        match command {
            Command::MouseDown { .. }
            | Command::MouseMove { .. }
            | Command::MouseUp { .. }
            | Command::Navigate { .. }
            | Command::LookAtSelected => {
                log::debug!("[Simulator] {command:?}");
                Vec::new()
            }

            Command::CreateEntity => {
                let uid = self.next_uid;
                self.next_uid += 1;
                self.entities.insert(uid, Entity::default());
                self.selected = Some(uid);
                vec![self.selection_event()]
            }

            Command::RemoveEntity => match self.selected.take() {
                Some(uid) => {
                    self.entities.remove(&uid);
                    vec![InboundEvent::EntitySelected(EntitySelected::Cleared)]
                }
                None => vec![nothing_selected(command)],
            },

            Command::CreateComponent { component } => {
                let Some(entity) = self.selected.and_then(|uid| self.entities.get_mut(&uid)) else {
                    return vec![nothing_selected(command)];
                };
                if entity.component_mut(*component).is_some() {
                    return vec![log_event(
                        LogSeverity::Warning,
                        format!("component {component} already present"),
                    )];
                }
                entity.components.push((*component, Vec::new()));
                vec![self.selection_event()]
            }

            Command::RemoveComponent { component } => {
                let Some(entity) = self.selected.and_then(|uid| self.entities.get_mut(&uid)) else {
                    return vec![nothing_selected(command)];
                };
                let before = entity.components.len();
                entity.components.retain(|(ty, _)| ty != component);
                if entity.components.len() == before {
                    return vec![log_event(
                        LogSeverity::Warning,
                        format!("component {component} not present"),
                    )];
                }
                vec![self.selection_event()]
            }

            Command::RequestComponentProperties { component } => {
                let Some(entity) = self.selected.and_then(|uid| self.entities.get_mut(&uid)) else {
                    return vec![nothing_selected(command)];
                };
                match entity.component_mut(*component) {
                    Some(properties) => vec![InboundEvent::ComponentProperties(ComponentProperties {
                        component: *component,
                        properties: properties.clone(),
                    })],
                    None => vec![log_event(
                        LogSeverity::Warning,
                        format!("component {component} not present"),
                    )],
                }
            }

            Command::SetProperty { component, name, value } => {
                let Some(entity) = self.selected.and_then(|uid| self.entities.get_mut(&uid)) else {
                    return vec![nothing_selected(command)];
                };
                let Some(properties) = entity.component_mut(*component) else {
                    return vec![log_event(
                        LogSeverity::Warning,
                        format!("component {component} not present"),
                    )];
                };
                match properties.iter_mut().find(|p| p.name == *name) {
                    Some(property) => property.value = value.clone(),
                    None => properties.push(ComponentProperty {
                        name: name.clone(),
                        value: value.clone(),
                        kind: PropertyKind::String,
                    }),
                }
                Vec::new()
            }

            Command::RequestPosition => {
                let Some((uid, entity)) = self
                    .selected
                    .and_then(|uid| self.entities.get(&uid).map(|e| (uid, e)))
                else {
                    return vec![nothing_selected(command)];
                };
                let [x, y, z] = entity.position;
                vec![InboundEvent::EntityPosition(EntityPosition { uid, x, y, z })]
            }

            Command::SetPosition { entity, x, y, z } => match self.entities.get_mut(entity) {
                Some(record) => {
                    record.position = [*x, *y, *z];
                    vec![InboundEvent::EntityPosition(EntityPosition {
                        uid: *entity,
                        x: *x,
                        y: *y,
                        z: *z,
                    })]
                }
                None => vec![log_event(
                    LogSeverity::Error,
                    format!("set_position: unknown entity {entity}"),
                )],
            },

            Command::OpenUniverse { path } => {
                let mut events = self.reset();
                events.push(log_event(LogSeverity::Info, format!("Universe {path} loaded")));
                events
            }

            Command::NewUniverse => {
                let mut events = self.reset();
                events.push(log_event(LogSeverity::Info, "New universe created".to_string()));
                events
            }

            Command::SaveUniverseAs { path } => vec![log_event(
                LogSeverity::Info,
                format!("Universe saved as {path} ({} entities)", self.entities.len()),
            )],

            Command::StartGameMode => {
                self.game_mode = !self.game_mode;
                let state = if self.game_mode { "started" } else { "stopped" };
                vec![log_event(LogSeverity::Info, format!("Game mode {state}"))]
            }

            Command::EditScript => match self.selected {
                Some(uid) => vec![log_event(
                    LogSeverity::Info,
                    format!("Editing script of entity {uid}"),
                )],
                None => vec![nothing_selected(command)],
            },

            Command::ReloadScript { path } => {
                vec![log_event(LogSeverity::Info, format!("Script {path} reloaded"))]
            }
        }
    }
}

/// TCP server playing the engine's side of the link.
#[derive(Debug)]
pub struct EngineSimulator {
    local_addr: SocketAddr,
    world: Arc<Mutex<World>>,
    accept_handle: JoinHandle<()>,
}

impl EngineSimulator {
    /// Bind to `config.address()` and start accepting editors.
    ///
    /// Use port 0 to let the OS pick; [`Self::local_addr`] reports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(config: &Config) -> Result<Self> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind simulator on {address}"))?;
        let local_addr = listener.local_addr()?;
        log::info!("[Simulator] Listening on {local_addr}");

        let world = Arc::new(Mutex::new(World::new()));
        let accept_handle = tokio::spawn(Self::accept_loop(
            listener,
            Arc::clone(&world),
            config.clone(),
        ));

        Ok(Self {
            local_addr,
            world,
            accept_handle,
        })
    }

    /// Address the simulator is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A copy of the current world.
    pub fn world(&self) -> World {
        self.world.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stop accepting. Connections already open keep running until the
    /// editor hangs up.
    pub fn shutdown(self) {
        self.accept_handle.abort();
    }

    async fn accept_loop(listener: TcpListener, world: Arc<Mutex<World>>, config: Config) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    log::info!("[Simulator] Editor connected: {peer}");
                    let world = Arc::clone(&world);
                    let config = config.clone();
                    tokio::spawn(async move {
                        match Self::serve(stream, &world, &config).await {
                            Ok(()) => log::info!("[Simulator] Editor disconnected: {peer}"),
                            Err(e) => log::error!("[Simulator] Connection {peer} failed: {e}"),
                        }
                    });
                }
                Err(e) => {
                    log::error!("[Simulator] Accept error: {e}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn serve(
        stream: TcpStream,
        world: &Mutex<World>,
        config: &Config,
    ) -> Result<(), LinkError> {
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();
        let mut reassembler = StreamReassembler::from_config(config);

        loop {
            let n = reader.read(reassembler.read_buf()).await?;
            let mut replies = Vec::new();
            let result = reassembler.on_read_completed(n, |frame| {
                let command = match Command::decode(frame.type_code, frame.payload) {
                    Ok(command) => command,
                    Err(ProtocolError::UnknownOpCode(op)) => {
                        log::warn!("[Simulator] Ignoring unknown op code {op}");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                log::debug!("[Simulator] <- {}", command.name());
                replies.extend(
                    world
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .handle(&command),
                );
                Ok(())
            });

            match result {
                Ok(_) => {}
                Err(LinkError::TransportClosed) => return Ok(()),
                Err(e) => return Err(e),
            }

            for event in replies {
                match event.encode(config.max_frame_size) {
                    Ok(frame) => writer.write_all(&frame).await?,
                    Err(e) => log::error!("[Simulator] Dropping reply {event:?}: {e}"),
                }
            }
        }
    }
}
