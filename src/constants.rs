//! Connection defaults and timing constants.

use std::time::Duration;

/// The engine only accepts editor connections on loopback.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port the engine's editor server listens on.
pub const DEFAULT_PORT: u16 = 10001;

/// Minimum spare space offered to each socket read (64 KB).
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Initial receive arena size. Grows on demand.
pub const INITIAL_RECEIVE_CAPACITY: usize = 4 * 1024;

/// How long `send` waits for replies before exiting.
pub const DEFAULT_LINGER: Duration = Duration::from_millis(500);

/// Back-off after a failed accept in the simulator.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
