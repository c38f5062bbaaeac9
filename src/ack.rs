//! Sequence-buffer contexts and the acknowledgement algorithm.
//!
//! Two contexts cooperate, per `spec.md` §3/§4.4: [`SentContext`] tracks
//! what the remote has acknowledged of *our* sends, [`ReceivedContext`]
//! tracks what we've seen of the remote's sends and what we've told it so
//! far. Both carry a 64-bit cumulative ack mask; bit `i` means "the
//! sequence `anchor - i` has been accounted for", where `anchor` is
//! `SentContext::acked` or `ReceivedContext::sequence` respectively.
//!
//! Grounded on `gbnet::reliability::ReliableEndpoint` (ack-bit update,
//! `process_acks`) generalized to the spec's richer classification return
//! value, and cross-checked against the "remote ack only moves forward"
//! invariant in `laminar::AcknowledgmentHandler::process_incoming`
//! (`examples/other_examples/...laminar__src-infrastructure-acknowledgment.rs.rs`).
use crate::ring::RingStore;
use crate::seq;
use smallvec::SmallVec;

/// Sequences released by one [`AckEngine::release_acked`] call rarely
/// exceed a handful even at a full window, so this avoids a heap
/// allocation on the common path.
pub type ReleasedSeqs = SmallVec<[u16; 8]>;

/// Sentinel for "nothing observed/acked yet", the wraparound-arithmetic
/// equivalent of `spec.md`'s `NullEntry = -1`.
const NULL_ENTRY: u16 = 0xFFFF;

/// Duplicate-ack threshold past which we assume our own last ack was lost
/// and force a fresh one out (`spec.md` §4.4).
const DUPLICATE_ACK_RESEND_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentContext {
    /// Next sequence number to assign to an outbound packet.
    pub sequence: u16,
    /// Last sequence the remote has acknowledged.
    pub acked: u16,
    pub ack_mask: u64,
}

impl Default for SentContext {
    fn default() -> Self {
        Self {
            sequence: 0,
            acked: NULL_ENTRY,
            ack_mask: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedContext {
    /// Highest sequence seen so far.
    pub sequence: u16,
    /// Last sequence for which we have emitted an ack.
    pub acked: u16,
    pub ack_mask: u64,
    /// `ack_mask` as of the last emitted ack; detects mask changes with no
    /// sequence advance (an out-of-order gap fill).
    pub last_ack_mask: u64,
}

impl Default for ReceivedContext {
    fn default() -> Self {
        Self {
            sequence: NULL_ENTRY,
            acked: NULL_ENTRY,
            ack_mask: 0,
            last_ack_mask: 0,
        }
    }
}

/// Outcome of classifying one inbound packet (`spec.md` §4.4 "On receive").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    Stale,
    Duplicate,
    /// Accepted; carries the packet's own sequence number. Whether this is
    /// delivered immediately or buffered for later delivery is a pipeline
    /// concern (`spec.md` §4.5), not decided here.
    Accepted(u16),
}

pub struct AckEngine {
    pub sent: SentContext,
    pub received: ReceivedContext,
    window_size: u16,
    duplicates_since_last_ack: u32,
    packets_stale: u64,
    packets_dropped: u64,
    packets_out_of_order: u64,
    packets_duplicated: u64,
}

impl AckEngine {
    pub fn new(window_size: u16) -> Self {
        Self {
            sent: SentContext::default(),
            received: ReceivedContext::default(),
            window_size,
            duplicates_since_last_ack: 0,
            packets_stale: 0,
            packets_dropped: 0,
            packets_out_of_order: 0,
            packets_duplicated: 0,
        }
    }

    pub fn packets_stale(&self) -> u64 {
        self.packets_stale
    }
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }
    pub fn packets_out_of_order(&self) -> u64 {
        self.packets_out_of_order
    }
    pub fn packets_duplicated(&self) -> u64 {
        self.packets_duplicated
    }

    /// Peeks the sequence number that would be assigned by
    /// [`AckEngine::assign_sequence`], without consuming it. Lets the
    /// caller check ring capacity before committing to a sequence number.
    pub fn next_sequence(&self) -> u16 {
        self.sent.sequence
    }

    /// Assigns the next outbound sequence number (`SentPackets.Sequence++`).
    pub fn assign_sequence(&mut self) -> u16 {
        let seq = self.sent.sequence;
        self.sent.sequence = self.sent.sequence.wrapping_add(1);
        seq
    }

    /// Snapshots the piggy-back ack fields to attach to an outbound packet
    /// and marks the receive side as having informed the peer of its
    /// current state (`spec.md` §4.4 "On send").
    pub fn piggyback_ack(&mut self) -> (u16, u64) {
        let acked_sequence_id = self.received.sequence;
        let ack_mask = self.received.ack_mask;
        self.received.acked = self.received.sequence;
        self.received.last_ack_mask = ack_mask;
        self.duplicates_since_last_ack = 0;
        (acked_sequence_id, ack_mask)
    }

    /// Classifies an inbound packet's sequence number and updates the
    /// received-side context. Mirrors `spec.md` §4.4 "On receive", steps
    /// 1-3 (does not fold the piggy-backed remote ack; call
    /// [`AckEngine::fold_remote_ack`] separately for that).
    pub fn classify_incoming(&mut self, incoming_seq: u16) -> ClassifyOutcome {
        let expected = self.received.sequence.wrapping_add(1);
        if seq::stale(incoming_seq, expected, self.window_size) {
            self.packets_stale += 1;
            return ClassifyOutcome::Stale;
        }

        if seq::greater_than(incoming_seq, self.received.sequence) {
            let d = seq::abs_distance(incoming_seq, self.received.sequence);
            if d > (self.window_size as u32).saturating_sub(1) {
                self.packets_dropped += (d - 1) as u64;
                self.received.ack_mask = 1;
            } else {
                self.received.ack_mask = (self.received.ack_mask << d) | 1;
                for i in 0..d.min(self.window_size as u32 - 1) {
                    if self.received.ack_mask & (1 << i) == 0 {
                        self.packets_dropped += 1;
                    }
                }
            }
            self.received.sequence = incoming_seq;
        } else {
            let mut d = seq::abs_distance(self.received.sequence, incoming_seq);
            if d >= 0xFFFF_u32 - self.window_size as u32 {
                // Wrap-repair: a resent packet whose stored seq pre-dates
                // `Sequence` by more than half the space. See the Open
                // Question in `spec.md` §9 — preserved verbatim, including
                // the exact threshold.
                d = (self.received.sequence.wrapping_sub(incoming_seq)) as u32;
            }
            let bit = 1u64 << d;
            if self.received.ack_mask & bit != 0 {
                self.packets_duplicated += 1;
                self.duplicates_since_last_ack += 1;
                return ClassifyOutcome::Duplicate;
            }
            self.packets_out_of_order += 1;
            self.received.ack_mask |= bit;
        }

        ClassifyOutcome::Accepted(incoming_seq)
    }

    /// Folds the remote's piggy-backed ack report into the sent-side
    /// context (`spec.md` §4.4 "Folding remote ack into sent context").
    pub fn fold_remote_ack(&mut self, acked_sequence_id: u16, ack_mask: u64) {
        if seq::greater_than(self.sent.acked, acked_sequence_id) {
            return; // stale report, ignore
        }
        if self.sent.acked == acked_sequence_id {
            self.sent.ack_mask |= ack_mask; // never un-ack
        } else {
            self.sent.acked = acked_sequence_id;
            self.sent.ack_mask = ack_mask;
        }
    }

    /// Whether a standalone ack packet must be emitted this tick
    /// (`spec.md` §4.4 "Deciding to emit a standalone ack"). Requires a full
    /// idle tick since anything last went out (`LastSentTime < PreviousTimestamp`;
    /// vacuously true if nothing has ever been sent or this is the first
    /// tick) AND at least one of: new data has arrived since the last
    /// report, the mask changed without the sequence advancing (a gap got
    /// filled), or enough duplicates have piled up that the peer's own
    /// last ack was probably lost.
    pub fn should_send_ack(
        &self,
        last_sent_time_ms: Option<u64>,
        previous_timestamp_ms: Option<u64>,
    ) -> bool {
        let tick_elapsed = match (last_sent_time_ms, previous_timestamp_ms) {
            (Some(last_sent), Some(previous)) => last_sent < previous,
            _ => true,
        };
        tick_elapsed
            && (self.received.acked != self.received.sequence
                || self.received.ack_mask != self.received.last_ack_mask
                || self.duplicates_since_last_ack >= DUPLICATE_ACK_RESEND_THRESHOLD)
    }

    /// Releases every send-ring slot the remote has now acknowledged.
    /// Returns the released sequence numbers, mirroring `spec.md` §4.4
    /// "Acked-packet release".
    ///
    /// The original's scan anchors on a wrap-safe starting index to avoid
    /// unsigned underflow while walking a raw ring buffer. This store is
    /// indexed directly by `seq % window_size` with exactly `window_size`
    /// slots, so a plain pass over every index already visits the same set
    /// of slots the anchor trick was reaching for — no anchor arithmetic
    /// is needed on top of checked wraparound distance.
    pub fn release_acked<T>(&self, ring: &mut RingStore<T>) -> ReleasedSeqs {
        let mut released = ReleasedSeqs::new();
        for idx in 0..ring.capacity() {
            if let Some((slot_seq, _)) = ring.entry_at(idx) {
                let d = seq::abs_distance(self.sent.acked, slot_seq);
                if d < self.window_size as u32 && (self.sent.ack_mask & (1u64 << d)) != 0 {
                    released.push(slot_seq);
                }
            }
        }
        for &s in &released {
            ring.release(s);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_three_in_order_packets() {
        let mut ack = AckEngine::new(4);
        for s in 0u16..3 {
            assert_eq!(ack.classify_incoming(s), ClassifyOutcome::Accepted(s));
        }
        assert_eq!(ack.received.sequence, 2);
        assert_eq!(ack.received.ack_mask & 0b111, 0b111);
    }

    #[test]
    fn reorder_scenario_matches_spec_example() {
        let mut ack = AckEngine::new(4);
        assert_eq!(ack.classify_incoming(0), ClassifyOutcome::Accepted(0));
        assert_eq!(ack.received.sequence, 0);
        assert_eq!(ack.received.ack_mask, 1);

        assert_eq!(ack.classify_incoming(2), ClassifyOutcome::Accepted(2));
        assert_eq!(ack.received.sequence, 2);
        assert_eq!(ack.received.ack_mask, 0b101);
        assert_eq!(ack.packets_out_of_order(), 0); // 2 > 0: the "ahead" branch, not the fill branch

        assert_eq!(ack.classify_incoming(1), ClassifyOutcome::Accepted(1));
        assert_eq!(ack.received.ack_mask, 0b111);
        assert_eq!(ack.packets_out_of_order(), 1);
    }

    #[test]
    fn duplicate_is_detected_and_counted() {
        let mut ack = AckEngine::new(4);
        ack.classify_incoming(0);
        assert_eq!(ack.classify_incoming(0), ClassifyOutcome::Duplicate);
        assert_eq!(ack.packets_duplicated(), 1);
    }

    #[test]
    fn three_duplicates_trigger_forced_ack() {
        let mut ack = AckEngine::new(4);
        ack.classify_incoming(0);
        ack.piggyback_ack();
        for _ in 0..3 {
            ack.classify_incoming(0);
        }
        assert!(ack.should_send_ack(Some(50), Some(100)));
    }

    #[test]
    fn forced_ack_suppressed_until_a_tick_elapses() {
        let mut ack = AckEngine::new(4);
        ack.classify_incoming(0);
        ack.piggyback_ack();
        for _ in 0..3 {
            ack.classify_incoming(0);
        }
        // last_sent didn't precede previous_timestamp: no idle tick yet.
        assert!(!ack.should_send_ack(Some(100), Some(50)));
    }

    #[test]
    fn no_ack_needed_when_nothing_changed() {
        let mut ack = AckEngine::new(4);
        ack.classify_incoming(0);
        ack.piggyback_ack();
        assert!(!ack.should_send_ack(Some(50), Some(100)));
    }

    #[test]
    fn stale_packet_rejected() {
        let mut ack = AckEngine::new(4);
        for s in 0u16..10 {
            ack.classify_incoming(s);
        }
        // window=4, expected=10, anything < 6 is stale
        assert_eq!(ack.classify_incoming(4), ClassifyOutcome::Stale);
    }

    #[test]
    fn fold_remote_ack_never_moves_backward() {
        let mut ack = AckEngine::new(32);
        ack.fold_remote_ack(10, 0b1);
        ack.fold_remote_ack(5, 0b1); // stale report
        assert_eq!(ack.sent.acked, 10);
    }

    #[test]
    fn fold_remote_ack_merges_mask_when_equal() {
        let mut ack = AckEngine::new(32);
        ack.fold_remote_ack(10, 0b0001);
        ack.fold_remote_ack(10, 0b0010);
        assert_eq!(ack.sent.ack_mask, 0b0011);
    }

    #[test]
    fn release_acked_frees_matching_slots() {
        let mut ack = AckEngine::new(4);
        let mut ring: RingStore<u8> = RingStore::new(4);
        for s in 0u16..3 {
            ring.try_acquire(s);
            ring.set(s, s as u8);
        }
        ack.fold_remote_ack(2, 0b111); // acks 2,1,0
        let released = ack.release_acked(&mut ring);
        assert_eq!(released.len(), 3);
        assert!(!ring.occupied(0));
        assert!(!ring.occupied(1));
        assert!(!ring.occupied(2));
    }

    #[test]
    fn release_acked_is_idempotent_on_second_call() {
        let mut ack = AckEngine::new(4);
        let mut ring: RingStore<u8> = RingStore::new(4);
        ring.try_acquire(0);
        ring.set(0, 0);
        ack.fold_remote_ack(0, 1);
        assert_eq!(ack.release_acked(&mut ring).len(), 1);
        assert_eq!(ack.release_acked(&mut ring).len(), 0); // P8
    }

    #[test]
    fn wrap_straddling_distances_classify_without_panicking() {
        let window = 4u16;
        for distance in [1u16, window - 1, window, window + 1] {
            let mut ack = AckEngine::new(window);
            // Put Sequence near the 0xFFFF -> 0x0000 boundary.
            for s in (0xFFFEu16..=0xFFFF).chain(0u16..1) {
                ack.classify_incoming(s);
            }
            let probe = 0u16.wrapping_sub(distance).wrapping_add(0xFFFF); // arbitrary straddling seq
            let _ = ack.classify_incoming(probe); // must not panic regardless of outcome
        }
    }
}
