//! Outbound command encoding.

use bytes::{Bytes, BytesMut};

use crate::config::Config;
use crate::error::EncodeError;
use crate::protocol::commands::Command;
use crate::protocol::framing::{self, DEFAULT_MAX_FRAME_SIZE};

/// Serializes [`Command`]s into complete frames.
///
/// Frames are built in a scratch buffer that is reused across calls, so
/// encoding takes `&mut self`: one encoder serves one sender at a time.
#[derive(Debug)]
pub struct CommandEncoder {
    scratch: BytesMut,
    max_frame_size: u32,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl CommandEncoder {
    /// Create an encoder that refuses frames longer than `max_frame_size`.
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            scratch: BytesMut::with_capacity(256),
            max_frame_size,
        }
    }

    /// Create an encoder using the configured frame limit.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_frame_size)
    }

    /// Encode `command` into one frame ready for the socket.
    ///
    /// # Errors
    ///
    /// Argument validation failures (non-ASCII or oversized strings,
    /// non-finite floats) and frames over the size limit. Nothing is
    /// produced in that case.
    pub fn encode(&mut self, command: &Command) -> Result<Bytes, EncodeError> {
        self.scratch.clear();
        framing::write_frame(&mut self.scratch, command.op_code(), self.max_frame_size, |w| {
            command.write_payload(w)
        })?;
        log::trace!(
            "[Encoder] {} (op {}, {} bytes)",
            command.name(),
            command.op_code(),
            self.scratch.len()
        );
        Ok(self.scratch.split().freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::ComponentType;
    use crate::protocol::framing::{decode, Decoded, HEADER_SIZE};

    fn all_commands() -> Vec<Command> {
        vec![
            Command::MouseDown { x: 10, y: 20, button: 1 },
            Command::MouseMove { x: 11, y: 21, dx: 1, dy: -1, flags: 4 },
            Command::MouseUp { x: 12, y: 22, button: 1 },
            Command::SetProperty {
                component: ComponentType(0xABCD_1234),
                name: "radius".into(),
                value: "2.5".into(),
            },
            Command::Navigate { forward: 1.0, right: -0.5, fast: true },
            Command::SaveUniverseAs { path: "universes/main.unv".into() },
            Command::OpenUniverse { path: "universes/main.unv".into() },
            Command::CreateComponent { component: ComponentType(7) },
            Command::RequestComponentProperties { component: ComponentType(8) },
            Command::RemoveComponent { component: ComponentType(9) },
            Command::CreateEntity,
            Command::StartGameMode,
            Command::RequestPosition,
            Command::SetPosition { entity: 3, x: 1.0, y: 2.0, z: 3.0 },
            Command::RemoveEntity,
            Command::EditScript,
            Command::ReloadScript { path: "scripts/player.lua".into() },
            Command::NewUniverse,
            Command::LookAtSelected,
        ]
    }

    #[test]
    fn test_set_property_exact_bytes() {
        let mut encoder = CommandEncoder::default();
        let bytes = encoder
            .encode(&Command::SetProperty {
                component: ComponentType(0xABCD_1234),
                name: "radius".into(),
                value: "2.5".into(),
            })
            .unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&[4, 0, 0, 0]);
        expected.extend_from_slice(&[0x34, 0x12, 0xCD, 0xAB]);
        expected.extend_from_slice(&[6, 0, 0, 0]);
        expected.extend_from_slice(b"radius");
        expected.extend_from_slice(&[3, 0, 0, 0]);
        expected.extend_from_slice(b"2.5");

        assert_eq!(&bytes[HEADER_SIZE..], &expected[..]);
        let length = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(length as usize, expected.len());
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_empty_payload_command() {
        let mut encoder = CommandEncoder::default();
        let bytes = encoder.encode(&Command::CreateEntity).unwrap();
        assert_eq!(&bytes[..], &[4, 0, 0, 0, 0, 0, 0, 0, 11, 0, 0, 0]);
    }

    #[test]
    fn test_every_command_decodes_back() {
        let mut encoder = CommandEncoder::default();
        for command in all_commands() {
            let bytes = encoder.encode(&command).unwrap();
            let Decoded::Frame { frame, consumed } =
                decode(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap()
            else {
                panic!("{} did not encode a complete frame", command.name());
            };
            assert_eq!(consumed, bytes.len());
            assert_eq!(frame.type_code, command.op_code());
            assert_eq!(Command::decode(frame.type_code, frame.payload).unwrap(), command);
        }
    }

    #[test]
    fn test_navigate_fast_flag_is_i32() {
        let mut encoder = CommandEncoder::default();
        let bytes = encoder
            .encode(&Command::Navigate { forward: 0.0, right: 0.0, fast: true })
            .unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], &[1, 0, 0, 0]);
    }

    #[test]
    fn test_non_ascii_string_rejected() {
        let mut encoder = CommandEncoder::default();
        let err = encoder
            .encode(&Command::OpenUniverse { path: "univers/été.unv".into() })
            .unwrap_err();
        assert_eq!(err, EncodeError::NonAscii { field: "path" });

        // The failed command leaves no residue in the next frame.
        let bytes = encoder.encode(&Command::CreateEntity).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 4);
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut encoder = CommandEncoder::default();
        let err = encoder
            .encode(&Command::SetPosition { entity: 1, x: f32::NAN, y: 0.0, z: 0.0 })
            .unwrap_err();
        assert!(matches!(err, EncodeError::NonFinite { field: "x", .. }));
    }

    #[test]
    fn test_frame_limit_enforced() {
        let mut encoder = CommandEncoder::new(16);
        let err = encoder
            .encode(&Command::ReloadScript { path: "a/fairly/long/script/path.lua".into() })
            .unwrap_err();
        assert!(matches!(err, EncodeError::FrameTooLarge { max: 16, .. }));
        assert!(encoder.encode(&Command::LookAtSelected).is_ok());
    }

    #[test]
    fn test_consecutive_frames_are_independent() {
        let mut encoder = CommandEncoder::default();
        let first = encoder.encode(&Command::MouseDown { x: 1, y: 2, button: 0 }).unwrap();
        let second = encoder.encode(&Command::MouseUp { x: 1, y: 2, button: 0 }).unwrap();
        assert_eq!(first[HEADER_SIZE], 1);
        assert_eq!(second[HEADER_SIZE], 3);
    }
}
