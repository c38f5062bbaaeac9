//! Configuration surface for the reliable-sequenced pipeline.
use std::time::Duration;

/// Window size above which the on-wire ack mask widens from 4 to 8 bytes.
pub const WIDE_ACK_MASK_THRESHOLD: u16 = 32;

pub const MIN_WINDOW_SIZE: u16 = 1;
pub const MAX_WINDOW_SIZE: u16 = 64;

const DEFAULT_WINDOW_SIZE: u16 = 32;
const DEFAULT_MIN_RESEND_MS: u64 = 64;
const DEFAULT_MAX_RESEND_MS: u64 = 200;
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024;

/// Construction-time configuration for a [`crate::pipeline::PipelineEndpoint`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum number of unacknowledged packets in flight per direction,
    /// and the capacity of every ring/timer buffer. `1..=64`.
    pub window_size: u16,
    /// Floor of the adaptive resend timeout, in milliseconds.
    pub minimum_resend_time_ms: u64,
    /// Ceiling of the adaptive resend timeout, in milliseconds.
    pub maximum_resend_time_ms: u64,
    /// Largest payload a single slot will hold. Payloads above this are
    /// rejected by `send()` rather than silently truncated.
    pub max_payload_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            minimum_resend_time_ms: DEFAULT_MIN_RESEND_MS,
            maximum_resend_time_ms: DEFAULT_MAX_RESEND_MS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < MIN_WINDOW_SIZE || self.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::WindowSizeOutOfRange);
        }
        if self.minimum_resend_time_ms == 0
            || self.minimum_resend_time_ms > self.maximum_resend_time_ms
        {
            return Err(ConfigError::InvalidResendBounds);
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::InvalidMaxPayloadSize);
        }
        Ok(())
    }

    /// Wire size of the ack mask field: 4 bytes when the window fits in 32
    /// bits of history, 8 otherwise. See `spec.md` §6 and §9 ("truncated
    /// header" trick).
    pub fn wire_ack_mask_size(&self) -> usize {
        if self.window_size <= WIDE_ACK_MASK_THRESHOLD as u16 {
            4
        } else {
            8
        }
    }

    /// Total on-wire header size: 8 fixed bytes plus the ack mask.
    pub fn wire_header_size(&self) -> usize {
        8 + self.wire_ack_mask_size()
    }

    pub fn minimum_resend_time(&self) -> Duration {
        Duration::from_millis(self.minimum_resend_time_ms)
    }

    pub fn maximum_resend_time(&self) -> Duration {
        Duration::from_millis(self.maximum_resend_time_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    WindowSizeOutOfRange,
    InvalidResendBounds,
    InvalidMaxPayloadSize,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::WindowSizeOutOfRange => {
                write!(f, "window_size must be in 1..=64")
            }
            ConfigError::InvalidResendBounds => write!(
                f,
                "minimum_resend_time_ms must be > 0 and <= maximum_resend_time_ms"
            ),
            ConfigError::InvalidMaxPayloadSize => write!(f, "max_payload_size must be > 0"),
        }
    }
}

impl std::error::Error for ConfigError {}
