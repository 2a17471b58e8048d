//! Studio Link - the editor side of the editor↔engine socket protocol.
//!
//! The editor drives a separate engine process over one loopback TCP
//! connection: it sends commands (viewport input, entity and component
//! edits, universe management) and receives asynchronous notifications
//! (selection changes, component property dumps, positions, log lines).
//!
//! # Architecture
//!
//! - **Frame codec** - length-prefixed framing with a type tag
//! - **Stream reassembler** - chunked socket reads → complete frames
//! - **Event dispatcher** - frames → typed events → subscribed listeners
//! - **Command encoder** - typed commands → frames
//! - **Engine client** - read/write tasks tying the above to a socket
//!
//! # Modules
//!
//! - [`protocol`] - wire format, messages, reassembly
//! - [`dispatcher`] - listener registry and dispatch
//! - [`encoder`] - outbound frame construction
//! - [`connection`] - [`EngineClient`]
//! - [`selection`] - selection state fed by the dispatcher
//! - [`simulator`] - an in-process stand-in engine
//! - [`config`] - configuration loading/saving

pub mod config;
pub mod connection;
pub mod constants;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod protocol;
pub mod selection;
pub mod simulator;

// Re-export commonly used types
pub use config::Config;
pub use connection::EngineClient;
pub use dispatcher::{ConnectionLost, EventDispatcher, EventKind, SubscriptionId};
pub use encoder::CommandEncoder;
pub use error::{EncodeError, LinkError, ProtocolError};
pub use protocol::{Command, InboundEvent};
pub use selection::{SelectionState, SelectionTracker};
pub use simulator::EngineSimulator;
