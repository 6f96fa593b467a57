//! Session protocol: line parsing, field collection and validation.
//!
//! A session reads one command per line until the client sends `.` (proceed)
//! or `BYE` (disconnect). Commands set values in [`SessionFields`] and flag
//! themselves in the `received` and `errors` tables; nothing is rejected
//! while collecting. Once the client proceeds, [`build_operation`] checks the
//! tables against the declared action and either yields an
//! [`Operation`](crate::operation::Operation) or a [`CommandRejected`]
//! listing every offending field.
//!
//! # Wire format
//!
//! ```text
//! C: IDT alice            S: wherehoo_server 0.85 200 12 1024 65535
//! C: ACT query
//! C: LLH 42.36 -71.06 0
//! C: SHP rect_ctr
//! C: RAD 500
//! C: .                    S: ACK
//!                         S: <operation output>
//!                         S: .
//!                         S: BYE
//! ```

mod channel;
mod command;
mod error;
mod fields;
mod session;
mod time;
mod validate;

pub use channel::{LineChannel, DEFAULT_MAX_LINE_LEN};
pub use command::Command;
pub use error::{CommandRejected, TransportError};
pub use fields::{Action, FieldState, Payload, SessionFields, Shape};
pub use session::{Outcome, Session, Step};
pub use time::{apply_offsets, far_future, parse_offsets, TimeInterval, TimeSpecError};
pub use validate::build_operation;

use std::time::Duration;

/// Protocol version announced in the capability header.
pub const PROTOCOL_VERSION: &str = "0.85";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 5650;

/// Default idle timeout between lines (200 s).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(200);

/// Default deadline for reading a `DAT` payload (30 s).
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Default minimum lifetime of an inserted record (12 s).
pub const DEFAULT_RECORD_MIN_LIFE: Duration = Duration::from_secs(12);

/// Default maximum identity length.
pub const DEFAULT_MAX_IDENTITY_LEN: usize = 10;

/// Default maximum metadata length in characters.
pub const DEFAULT_MAX_META_LEN: usize = 1024;

/// Default maximum payload length in bytes.
pub const DEFAULT_MAX_DATA_LEN: usize = 65535;

/// Default cap on the TTL reported in search headers, in seconds.
pub const DEFAULT_MAX_TTL: u64 = 99_999_999;

/// Largest accepted `LEN`, `WID` or `RAD` value, in meters.
pub const MAX_DIMENSION: f64 = 999_999.0;

/// Per-session limits and deadlines.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLimits {
    pub max_identity_len: usize,
    pub max_meta_len: usize,
    pub max_data_len: usize,
    pub record_min_life: Duration,
    pub max_ttl: u64,
    pub idle_timeout: Duration,
    pub data_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_identity_len: DEFAULT_MAX_IDENTITY_LEN,
            max_meta_len: DEFAULT_MAX_META_LEN,
            max_data_len: DEFAULT_MAX_DATA_LEN,
            record_min_life: DEFAULT_RECORD_MIN_LIFE,
            max_ttl: DEFAULT_MAX_TTL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            data_timeout: DEFAULT_DATA_TIMEOUT,
        }
    }
}

impl SessionLimits {
    pub fn with_max_identity_len(mut self, len: usize) -> Self {
        self.max_identity_len = len;
        self
    }

    pub fn with_max_meta_len(mut self, len: usize) -> Self {
        self.max_meta_len = len;
        self
    }

    pub fn with_max_data_len(mut self, len: usize) -> Self {
        self.max_data_len = len;
        self
    }

    pub fn with_record_min_life(mut self, life: Duration) -> Self {
        self.record_min_life = life;
        self
    }

    pub fn with_max_ttl(mut self, ttl: u64) -> Self {
        self.max_ttl = ttl;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    /// Line sent in reply to `IDT`.
    ///
    /// `wherehoo_server <version> <idle secs> <min life secs> <max meta> <max data>`
    pub fn capability_header(&self) -> String {
        format!(
            "wherehoo_server {} {} {} {} {}",
            PROTOCOL_VERSION,
            self.idle_timeout.as_secs(),
            self.record_min_life.as_secs(),
            self.max_meta_len,
            self.max_data_len
        )
    }
}
