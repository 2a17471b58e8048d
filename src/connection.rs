//! Editor-side connection to the engine.
//!
//! An [`EngineClient`] owns two tasks over one byte stream:
//! - Read task: socket reads → [`StreamReassembler`] → [`EventDispatcher`]
//! - Write task: queued frames → socket
//!
//! Frames are dispatched on the read task in arrival order. Whichever side
//! fails first (peer closed, corrupt stream, I/O error, local close) records
//! the reason and both tasks stop. The write task shuts the stream down so
//! the engine sees EOF. Connection-lost listeners are told why exactly once,
//! from the read task after its last dispatch.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

use crate::config::Config;
use crate::dispatcher::{ConnectionLost, EventDispatcher};
use crate::encoder::CommandEncoder;
use crate::error::LinkError;
use crate::protocol::commands::Command;
use crate::protocol::events::ComponentType;
use crate::protocol::reassembler::StreamReassembler;

/// State shared between the client handle and its tasks.
struct LinkState {
    dispatcher: Arc<EventDispatcher>,
    /// Set once, by whoever stops the link first.
    lost: watch::Sender<Option<ConnectionLost>>,
    /// True after listeners have been notified.
    done: watch::Sender<bool>,
}

impl LinkState {
    /// Record why the link is going down. Only the first call has any
    /// effect. Both tasks wake up and stop.
    fn request_stop(&self, reason: ConnectionLost) -> bool {
        self.lost.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            true
        })
    }

    fn is_lost(&self) -> bool {
        self.lost.borrow().is_some()
    }

    /// Notify listeners. Runs once, when the read task exits.
    fn finish(&self) {
        self.request_stop(ConnectionLost::Closed);
        let reason = self.lost.borrow().clone().unwrap_or(ConnectionLost::Closed);
        log::info!("[Link] Connection lost: {reason}");
        self.dispatcher.notify_connection_lost(&reason);
        self.done.send_replace(true);
    }
}

/// Notifies listeners when the read task ends, however it ends.
struct FinishOnExit(Arc<LinkState>);

impl Drop for FinishOnExit {
    fn drop(&mut self) {
        self.0.finish();
    }
}

async fn stop_requested(rx: &mut watch::Receiver<Option<ConnectionLost>>) {
    let _ = rx.wait_for(Option::is_some).await;
}

/// A live connection to the engine.
///
/// Dropping the client stops it like [`EngineClient::close`].
pub struct EngineClient {
    state: Arc<LinkState>,
    encoder: Mutex<CommandEncoder>,
    frame_tx: UnboundedSender<Bytes>,
}

impl fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineClient")
            .field("lost", &*self.state.lost.borrow())
            .finish_non_exhaustive()
    }
}

impl EngineClient {
    /// Connect to the engine at `config.address()` with a fresh dispatcher.
    pub async fn connect(config: &Config) -> Result<Self, LinkError> {
        Self::connect_with(config, Arc::new(EventDispatcher::new())).await
    }

    /// Connect using an existing dispatcher.
    ///
    /// Subscribe before connecting to be sure no early event is missed.
    pub async fn connect_with(
        config: &Config,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self, LinkError> {
        let address = config.address();
        let stream = TcpStream::connect(&address).await?;
        stream.set_nodelay(true)?;
        log::info!("[Link] Connected to engine at {address}");
        Ok(Self::from_stream(stream, config, dispatcher))
    }

    /// Run the protocol over an already-open byte stream.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_stream<S>(stream: S, config: &Config, dispatcher: Arc<EventDispatcher>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Bytes>();
        let (lost, _) = watch::channel(None);
        let (done, _) = watch::channel(false);
        let state = Arc::new(LinkState { dispatcher, lost, done });

        tokio::spawn(Self::read_loop(
            read_half,
            StreamReassembler::from_config(config),
            Arc::clone(&state),
        ));
        tokio::spawn(Self::write_loop(write_half, frame_rx, Arc::clone(&state)));

        Self {
            state,
            encoder: Mutex::new(CommandEncoder::from_config(config)),
            frame_tx,
        }
    }

    /// The dispatcher inbound events are delivered through.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.state.dispatcher
    }

    /// False once the connection has been lost or closed.
    pub fn is_connected(&self) -> bool {
        !self.state.is_lost()
    }

    /// Why the connection stopped, if it has.
    pub fn lost_reason(&self) -> Option<ConnectionLost> {
        self.state.lost.borrow().clone()
    }

    /// Encode `command` and queue it for the write task.
    ///
    /// # Errors
    ///
    /// [`LinkError::Encode`] if the arguments are invalid (nothing is sent),
    /// [`LinkError::NotConnected`] once the connection is gone.
    pub fn send(&self, command: &Command) -> Result<(), LinkError> {
        if self.state.is_lost() {
            return Err(LinkError::NotConnected);
        }
        let frame = self
            .encoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encode(command)?;
        log::trace!("[Link] -> {} ({} bytes)", command.name(), frame.len());
        if self.frame_tx.send(frame).is_err() {
            return Err(LinkError::NotConnected);
        }
        Ok(())
    }

    /// Press a mouse button in the viewport.
    pub fn mouse_down(&self, x: i32, y: i32, button: i32) -> Result<(), LinkError> {
        self.send(&Command::MouseDown { x, y, button })
    }

    /// Move the mouse in the viewport.
    pub fn mouse_move(
        &self,
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
        flags: i32,
    ) -> Result<(), LinkError> {
        self.send(&Command::MouseMove { x, y, dx, dy, flags })
    }

    /// Release a mouse button in the viewport.
    pub fn mouse_up(&self, x: i32, y: i32, button: i32) -> Result<(), LinkError> {
        self.send(&Command::MouseUp { x, y, button })
    }

    /// Set a property on a component of the selected entity.
    pub fn set_component_property(
        &self,
        component: ComponentType,
        name: &str,
        value: &str,
    ) -> Result<(), LinkError> {
        self.send(&Command::SetProperty {
            component,
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }

    /// Move the editor camera.
    pub fn navigate(&self, forward: f32, right: f32, fast: bool) -> Result<(), LinkError> {
        self.send(&Command::Navigate { forward, right, fast })
    }

    /// Save the universe under a new path.
    pub fn save_universe_as(&self, path: &str) -> Result<(), LinkError> {
        self.send(&Command::SaveUniverseAs { path: path.to_owned() })
    }

    /// Load a universe file.
    pub fn open_universe(&self, path: &str) -> Result<(), LinkError> {
        self.send(&Command::OpenUniverse { path: path.to_owned() })
    }

    /// Add a component to the selected entity.
    pub fn create_component(&self, component: ComponentType) -> Result<(), LinkError> {
        self.send(&Command::CreateComponent { component })
    }

    /// Ask for a [`ComponentProperties`](crate::protocol::ComponentProperties) dump.
    pub fn request_component_properties(&self, component: ComponentType) -> Result<(), LinkError> {
        self.send(&Command::RequestComponentProperties { component })
    }

    /// Remove a component from the selected entity.
    pub fn remove_component(&self, component: ComponentType) -> Result<(), LinkError> {
        self.send(&Command::RemoveComponent { component })
    }

    /// Create an entity. The engine selects it.
    pub fn create_entity(&self) -> Result<(), LinkError> {
        self.send(&Command::CreateEntity)
    }

    /// Enter game mode.
    pub fn start_game_mode(&self) -> Result<(), LinkError> {
        self.send(&Command::StartGameMode)
    }

    /// Ask for the selected entity's position.
    pub fn request_position(&self) -> Result<(), LinkError> {
        self.send(&Command::RequestPosition)
    }

    /// Move an entity.
    pub fn set_position(&self, entity: i32, x: f32, y: f32, z: f32) -> Result<(), LinkError> {
        self.send(&Command::SetPosition { entity, x, y, z })
    }

    /// Destroy the selected entity.
    pub fn remove_entity(&self) -> Result<(), LinkError> {
        self.send(&Command::RemoveEntity)
    }

    /// Open the selected entity's script in an editor.
    pub fn edit_script(&self) -> Result<(), LinkError> {
        self.send(&Command::EditScript)
    }

    /// Reload a script.
    pub fn reload_script(&self, path: &str) -> Result<(), LinkError> {
        self.send(&Command::ReloadScript { path: path.to_owned() })
    }

    /// Start an empty universe.
    pub fn new_universe(&self) -> Result<(), LinkError> {
        self.send(&Command::NewUniverse)
    }

    /// Point the camera at the selection.
    pub fn look_at_selected(&self) -> Result<(), LinkError> {
        self.send(&Command::LookAtSelected)
    }

    /// Stop both tasks. Any partially received frame is discarded and
    /// queued commands that were not yet written are dropped.
    ///
    /// Listeners see [`ConnectionLost::Closed`] unless the connection was
    /// already lost. Nothing is dispatched after that.
    pub fn close(&self) {
        if self.state.request_stop(ConnectionLost::Closed) {
            log::debug!("[Link] Closing");
        }
    }

    /// Wait until the connection stops and listeners have been told, then
    /// return why.
    pub async fn closed(&self) -> ConnectionLost {
        let mut done = self.state.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
        self.lost_reason().unwrap_or(ConnectionLost::Closed)
    }

    async fn read_loop<R>(
        mut reader: R,
        mut reassembler: StreamReassembler,
        state: Arc<LinkState>,
    ) where
        R: AsyncRead + Unpin,
    {
        let _finish = FinishOnExit(Arc::clone(&state));
        let mut stop_rx = state.lost.subscribe();
        let dispatcher = Arc::clone(&state.dispatcher);

        let reason = loop {
            let read = tokio::select! {
                biased;
                () = stop_requested(&mut stop_rx) => break None,
                read = reader.read(reassembler.read_buf()) => read,
            };
            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    log::error!("[Link] Read error: {e}");
                    break Some(ConnectionLost::Io(e.to_string()));
                }
            };

            let completed = reassembler.on_read_completed(n, |frame| {
                // The writer or a local close may have stopped the link
                // while this read was being drained.
                if state.is_lost() {
                    return Ok(());
                }
                dispatcher.dispatch_frame(frame).map(|_| ())
            });
            match completed {
                Ok(frames) => log::trace!("[Link] <- {n} bytes, {frames} frames"),
                Err(LinkError::TransportClosed) => break Some(ConnectionLost::PeerClosed),
                Err(LinkError::Protocol(e)) => {
                    log::error!("[Link] Corrupt stream, closing: {e}");
                    break Some(ConnectionLost::Protocol(e));
                }
                Err(e) => break Some(ConnectionLost::Io(e.to_string())),
            }
        };

        if reassembler.has_partial() {
            log::debug!(
                "[Link] Discarding {} bytes of a partial frame",
                reassembler.buffer().pending()
            );
        }
        if let Some(reason) = reason {
            state.request_stop(reason);
        }
    }

    async fn write_loop<W>(
        mut writer: W,
        mut frame_rx: UnboundedReceiver<Bytes>,
        state: Arc<LinkState>,
    ) where
        W: AsyncWrite + Unpin,
    {
        let mut stop_rx = state.lost.subscribe();
        loop {
            let frame = tokio::select! {
                biased;
                () = stop_requested(&mut stop_rx) => break,
                frame = frame_rx.recv() => frame,
            };
            let Some(frame) = frame else { break };

            let written = tokio::select! {
                biased;
                () = stop_requested(&mut stop_rx) => break,
                written = writer.write_all(&frame) => written,
            };
            if let Err(e) = written {
                log::error!("[Link] Write error: {e}");
                state.request_stop(ConnectionLost::Io(e.to_string()));
                return;
            }
        }

        if let Err(e) = writer.shutdown().await {
            log::debug!("[Link] Shutdown error: {e}");
        }
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        self.state.request_stop(ConnectionLost::Closed);
    }
}
