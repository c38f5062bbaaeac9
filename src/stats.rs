//! Statistics types.
use std::time::Instant;

/// Raw byte/datagram counters for the underlying socket, independent of
/// protocol-level classification.
#[derive(Debug, Default)]
pub struct SocketStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub last_receive_time: Option<Instant>,
    pub last_send_time: Option<Instant>,
}

/// A read-only snapshot, not a live handle: `PipelineEndpoint::stats()`
/// copies these out on demand rather than handing back a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_resent: u64,
    pub packets_dropped: u64,
    pub packets_out_of_order: u64,
    pub packets_duplicated: u64,
    pub packets_stale: u64,
}
