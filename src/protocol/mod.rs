//! Wire protocol between the editor and the engine.
//!
//! Both directions use the same framing over one TCP connection:
//!
//! ```text
//! +-------------+-------------+-------------+------------------+
//! | length: i32 | marker: u32 | type: i32   | payload          |
//! +-------------+-------------+-------------+------------------+
//!   4 + payload   always 0      op / event    length - 4 bytes
//! ```
//!
//! All integers and floats are little-endian. Strings are an `i32` byte
//! count followed by that many bytes, without a terminator.
//!
//! - [`framing`]: header encode/decode
//! - [`wire`]: payload field readers and writers
//! - [`commands`]: editor → engine messages
//! - [`events`]: engine → editor messages
//! - [`reassembler`]: chunked reads → complete frames

pub mod commands;
pub mod events;
pub mod framing;
pub mod reassembler;
pub mod wire;

pub use commands::Command;
pub use events::{
    ComponentProperties, ComponentProperty, ComponentType, EntityPosition, EntitySelected,
    InboundEvent, LogMessage, LogSeverity, PropertyKind,
};
pub use framing::{Decoded, FrameView};
pub use reassembler::{ReceiveBuffer, StreamReassembler};
