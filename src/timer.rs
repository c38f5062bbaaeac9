//! Per-sequence send/receive timestamps and RTT smoothing.
//!
//! Two parallel fixed-size arrays, keyed by `seq % window_size` (`spec.md`
//! §3, "Timer table"): a *local* timer for our own sent packets (used to
//! compute an RTT sample once their ack returns) and a *remote* timer for
//! packets we received (used to report the processing delay back to the
//! peer as `ProcessingTime`).
//!
//! The smoothing formula is Jacobson/Karn with fixed gains 1/8 and 1/4
//! (RFC 6298), grounded on `gbnet::reliability::ReliableEndpoint::update_rtt`
//! but following `spec.md` §4.3's exact update order (variance before mean)
//! and its `max(1, ...)` floor on the raw sample.

const INITIAL_LAST_RTT_MS: u32 = 50;
const INITIAL_SMOOTHED_RTT_MS: f64 = 50.0;
const INITIAL_SMOOTHED_VARIANCE_MS: f64 = 5.0;
const INITIAL_RESEND_TIMEOUT_MS: u32 = 50;

const RTT_GAIN: f64 = 1.0 / 8.0;
const VARIANCE_GAIN: f64 = 1.0 / 4.0;
const VARIANCE_MULTIPLIER: f64 = 4.0;

#[derive(Debug, Clone, Copy)]
struct LocalTimerEntry {
    seq: u16,
    sent_time_ms: u64,
    /// 0 means "no ack has consumed this entry yet".
    receive_time_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct RemoteTimerEntry {
    seq: u16,
    receive_time_ms: u64,
}

/// Smoothed RTT and the resend timeout derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttInfo {
    pub last_rtt_ms: u32,
    pub smoothed_rtt_ms: f64,
    pub smoothed_variance_ms: f64,
    pub resend_timeout_ms: u32,
}

impl Default for RttInfo {
    fn default() -> Self {
        Self {
            last_rtt_ms: INITIAL_LAST_RTT_MS,
            smoothed_rtt_ms: INITIAL_SMOOTHED_RTT_MS,
            smoothed_variance_ms: INITIAL_SMOOTHED_VARIANCE_MS,
            resend_timeout_ms: INITIAL_RESEND_TIMEOUT_MS,
        }
    }
}

pub struct TimerTable {
    local: Vec<Option<LocalTimerEntry>>,
    remote: Vec<Option<RemoteTimerEntry>>,
    capacity: usize,
    rtt: RttInfo,
    minimum_resend_time_ms: u32,
    maximum_resend_time_ms: u32,
}

impl TimerTable {
    pub fn new(capacity: usize, minimum_resend_time_ms: u32, maximum_resend_time_ms: u32) -> Self {
        Self {
            local: vec![None; capacity],
            remote: vec![None; capacity],
            capacity,
            rtt: RttInfo::default(),
            minimum_resend_time_ms,
            maximum_resend_time_ms,
        }
    }

    fn index(&self, seq: u16) -> usize {
        seq as usize % self.capacity
    }

    /// Records a freshly-sent packet. Called from `Write` (`spec.md` §4.3).
    pub fn on_write(&mut self, seq: u16, now_ms: u64) {
        let idx = self.index(seq);
        self.local[idx] = Some(LocalTimerEntry {
            seq,
            sent_time_ms: now_ms,
            receive_time_ms: 0,
        });
    }

    /// Records a newly-received packet from the peer, for later
    /// `processing_time_for` reporting.
    pub fn on_receive(&mut self, seq: u16, now_ms: u64) {
        let idx = self.index(seq);
        self.remote[idx] = Some(RemoteTimerEntry {
            seq,
            receive_time_ms: now_ms,
        });
    }

    /// `now - RemoteTimer[seq].ReceiveTime`, clipped to `[0, 65535]`, used
    /// to stamp `ProcessingTime` on outbound piggy-backed acks.
    pub fn processing_time_for(&self, seq: u16, now_ms: u64) -> u16 {
        let idx = self.index(seq);
        match self.remote[idx] {
            Some(entry) if entry.seq == seq => {
                now_ms.saturating_sub(entry.receive_time_ms).min(u16::MAX as u64) as u16
            }
            _ => 0,
        }
    }

    /// Folds an incoming ack for `acked_seq` into the RTT estimator, per
    /// `spec.md` §4.3. A no-op if the local timer slot doesn't match
    /// `acked_seq` or has already been consumed by an earlier ack for the
    /// same sequence (duplicate-ack suppression).
    pub fn on_ack(&mut self, acked_seq: u16, now_ms: u64, processing_time_ms: u16) {
        let idx = self.index(acked_seq);
        let Some(entry) = self.local[idx] else {
            return;
        };
        if entry.seq != acked_seq || entry.receive_time_ms != 0 {
            return;
        }
        self.local[idx] = Some(LocalTimerEntry {
            receive_time_ms: now_ms,
            ..entry
        });

        let elapsed = now_ms.saturating_sub(entry.sent_time_ms) as i64;
        let sample = (elapsed - processing_time_ms as i64).max(1) as f64;

        let delta = sample - self.rtt.smoothed_rtt_ms;
        self.rtt.last_rtt_ms = sample as u32;
        self.rtt.smoothed_rtt_ms += delta * RTT_GAIN;
        self.rtt.smoothed_variance_ms += (delta.abs() - self.rtt.smoothed_variance_ms) * VARIANCE_GAIN;
        self.rtt.resend_timeout_ms =
            (self.rtt.smoothed_rtt_ms + VARIANCE_MULTIPLIER * self.rtt.smoothed_variance_ms)
                .round() as u32;
    }

    /// Time since `seq` was last (re)sent, or `u64::MAX` if it has no
    /// outstanding local entry (never sent, or already consumed by an ack).
    /// Used by the resend scan to decide which in-flight packets are due.
    pub fn elapsed_since_write(&self, seq: u16, now_ms: u64) -> u64 {
        let idx = self.index(seq);
        match self.local[idx] {
            Some(entry) if entry.seq == seq && entry.receive_time_ms == 0 => {
                now_ms.saturating_sub(entry.sent_time_ms)
            }
            _ => u64::MAX,
        }
    }

    pub fn rtt(&self) -> RttInfo {
        self.rtt
    }

    /// `clamp(ResendTimeout, MinimumResendTime, MaximumResendTime)`.
    pub fn current_resend_time_ms(&self) -> u32 {
        self.rtt
            .resend_timeout_ms
            .clamp(self.minimum_resend_time_ms, self.maximum_resend_time_ms)
    }

    pub fn set_resend_bounds(&mut self, minimum_ms: u32, maximum_ms: u32) {
        self.minimum_resend_time_ms = minimum_ms;
        self.maximum_resend_time_ms = maximum_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_rtt_matches_spec_defaults() {
        let table = TimerTable::new(32, 64, 200);
        let rtt = table.rtt();
        assert_eq!(rtt.last_rtt_ms, 50);
        assert_eq!(rtt.smoothed_rtt_ms, 50.0);
        assert_eq!(rtt.smoothed_variance_ms, 5.0);
        assert_eq!(rtt.resend_timeout_ms, 50);
    }

    #[test]
    fn ack_without_prior_write_is_ignored() {
        let mut table = TimerTable::new(32, 64, 200);
        table.on_ack(5, 1000, 0);
        assert_eq!(table.rtt().smoothed_rtt_ms, 50.0);
    }

    #[test]
    fn single_round_trip_updates_rtt() {
        let mut table = TimerTable::new(32, 64, 200);
        table.on_write(0, 1000);
        table.on_ack(0, 1030, 0); // 30ms round trip
        let rtt = table.rtt();
        assert_eq!(rtt.last_rtt_ms, 30);
        // smoothed_rtt moves 1/8 of the way from 50 toward 30
        assert!((rtt.smoothed_rtt_ms - 47.5).abs() < 1e-9);
    }

    #[test]
    fn duplicate_ack_for_same_sequence_ignored() {
        let mut table = TimerTable::new(32, 64, 200);
        table.on_write(0, 1000);
        table.on_ack(0, 1030, 0);
        let after_first = table.rtt();
        table.on_ack(0, 1200, 0); // duplicate/resend ack for seq 0
        assert_eq!(table.rtt(), after_first);
    }

    /// P5 — RTT convergence: constant true RTT converges to within 1ms in
    /// 20 round trips.
    #[test]
    fn rtt_converges_within_20_round_trips() {
        let mut table = TimerTable::new(32, 64, 200);
        let mut now = 0u64;
        for seq in 0u16..20 {
            table.on_write(seq, now);
            now += 40;
            table.on_ack(seq, now, 0);
        }
        assert!((table.rtt().smoothed_rtt_ms - 40.0).abs() < 1.0);
    }

    #[test]
    fn resend_timeout_is_clamped() {
        let mut table = TimerTable::new(32, 64, 200);
        table.on_write(0, 0);
        table.on_ack(0, 10_000, 0); // huge single sample
        assert_eq!(table.current_resend_time_ms(), 200);
    }

    #[test]
    fn processing_time_reported_for_known_remote_sequence() {
        let mut table = TimerTable::new(32, 64, 200);
        table.on_receive(7, 1000);
        assert_eq!(table.processing_time_for(7, 1015), 15);
        assert_eq!(table.processing_time_for(8, 1015), 0);
    }

    #[test]
    fn elapsed_since_write_tracks_unacked_entries_only() {
        let mut table = TimerTable::new(32, 64, 200);
        table.on_write(3, 1000);
        assert_eq!(table.elapsed_since_write(3, 1050), 50);
        table.on_ack(3, 1050, 0);
        assert_eq!(table.elapsed_since_write(3, 1100), u64::MAX);
        assert_eq!(table.elapsed_since_write(4, 1100), u64::MAX);
    }
}
