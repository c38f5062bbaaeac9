//! The per-tick pipeline driver.
//!
//! `PipelineEndpoint` composes [`crate::ack::AckEngine`], [`crate::timer::TimerTable`]
//! and two [`crate::ring::RingStore`]s (one per direction) into the three
//! entry points a caller drives a tick with: [`PipelineEndpoint::send`],
//! [`PipelineEndpoint::receive`], [`PipelineEndpoint::update`]. It owns no
//! socket; callers push/pull raw datagrams (`spec.md` §5 "single-threaded
//! per connection, no locks").
//!
//! Grounded on the per-tick `match` shape of `gbnet::connection`'s
//! connection-state driver, stripped of channel/congestion/MTU concerns
//! per `spec.md`'s Non-goals, and on the cooperative resume pattern
//! described in `spec.md` §4.5 ("NeedsResume").
use crate::ack::{AckEngine, ClassifyOutcome};
use crate::config::PipelineConfig;
use crate::error::{DropReason, PipelineError};
use crate::packet::{Packet, PacketHeader, PacketType};
use crate::ring::RingStore;
use crate::seq;
use crate::stats::PipelineStats;
use crate::timer::TimerTable;

/// Result of [`PipelineEndpoint::receive`].
#[derive(Debug, Default)]
pub struct ReceiveOutcome {
    /// Payloads delivered immediately as a direct result of this datagram
    /// (zero or one; later in-order buffered packets are drained across
    /// subsequent [`PipelineEndpoint::update`] calls, not here).
    pub delivered: Vec<Vec<u8>>,
    /// Set when the datagram was classified as stale or duplicate and
    /// dropped instead of processed.
    pub dropped: Option<DropReason>,
    /// Set when there is buffered backlog (an out-of-order arrival whose
    /// predecessor has now been delivered) the caller should drain by
    /// invoking [`PipelineEndpoint::update`] again rather than waiting for
    /// the next idle tick (`spec.md` §4.5 "NeedsResume").
    pub needs_resume: bool,
}

/// Result of [`PipelineEndpoint::update`].
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    /// Payloads delivered this tick by draining one step of the
    /// out-of-order buffer (zero or one, per the cooperative resume rule).
    pub delivered: Vec<Vec<u8>>,
    /// Serialized datagrams the caller must transmit this tick: due
    /// resends, and/or a standalone ack.
    pub outgoing: Vec<Vec<u8>>,
    /// Set when backlog remains — another buffered out-of-order delivery,
    /// or another resend candidate past its timeout — that an immediate
    /// re-invocation of [`PipelineEndpoint::update`] would drain, rather
    /// than waiting for the next tick (`spec.md` §4.5 "NeedsResume").
    pub needs_resume: bool,
}

pub struct PipelineEndpoint {
    config: PipelineConfig,
    ack: AckEngine,
    timer: TimerTable,
    send_ring: RingStore<Vec<u8>>,
    recv_ring: RingStore<Vec<u8>>,
    /// Next sequence number the caller expects to have delivered, in
    /// order. Distinct from `ack.received.sequence` (the highest sequence
    /// *seen*, used for ack-mask bookkeeping): this is the highest
    /// sequence *delivered contiguously*.
    next_expected_delivery: u16,
    /// Set when a delivered slot's successor is already buffered, so the
    /// next `update()` can drain one more step without rescanning the
    /// whole ring.
    needs_resume: Option<u16>,
    last_sent_time_ms: Option<u64>,
    previous_timestamp_ms: Option<u64>,
    stats: PipelineStats,
}

impl PipelineEndpoint {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let window = config.window_size;
        Ok(Self {
            ack: AckEngine::new(window),
            timer: TimerTable::new(
                window as usize,
                config.minimum_resend_time_ms as u32,
                config.maximum_resend_time_ms as u32,
            ),
            send_ring: RingStore::new(window as usize),
            recv_ring: RingStore::new(window as usize),
            next_expected_delivery: 0,
            needs_resume: None,
            last_sent_time_ms: None,
            previous_timestamp_ms: None,
            stats: PipelineStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A read-only snapshot of this endpoint's counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            packets_sent: self.stats.packets_sent,
            packets_received: self.stats.packets_received,
            packets_resent: self.stats.packets_resent,
            packets_dropped: self.ack.packets_dropped(),
            packets_out_of_order: self.ack.packets_out_of_order(),
            packets_duplicated: self.ack.packets_duplicated(),
            packets_stale: self.ack.packets_stale(),
        }
    }

    /// Hands the caller a serialized datagram to transmit for `payload`.
    /// Fails with [`PipelineError::PayloadTooLarge`] if the payload
    /// exceeds the configured slot size, or [`PipelineError::OutgoingQueueIsFull`]
    /// if the send window is saturated — retry after the next `update()`.
    pub fn send(&mut self, payload: &[u8], now_ms: u64) -> Result<Vec<u8>, PipelineError> {
        if payload.len() > self.config.max_payload_size {
            return Err(PipelineError::PayloadTooLarge {
                len: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let seq = self.ack.next_sequence();
        if !self.send_ring.try_acquire(seq) {
            return Err(PipelineError::OutgoingQueueIsFull);
        }
        self.send_ring.set(seq, payload.to_vec());
        self.ack.assign_sequence();
        self.timer.on_write(seq, now_ms);

        let (acked_sequence, ack_mask) = self.ack.piggyback_ack();
        let processing_time = self.timer.processing_time_for(acked_sequence, now_ms);
        let packet = Packet {
            header: PacketHeader {
                packet_type: PacketType::Payload,
                processing_time,
                sequence_id: seq,
                acked_sequence,
                ack_mask,
            },
            payload: payload.to_vec(),
        };

        self.stats.packets_sent += 1;
        self.last_sent_time_ms = Some(now_ms);
        Ok(packet.serialize(self.config.window_size))
    }

    /// Processes one inbound datagram. Malformed datagrams (too short, bad
    /// packet type) are dropped silently, the same as a packet lost in
    /// flight — the wire format carries no signature to tell the two apart.
    pub fn receive(&mut self, datagram: &[u8], now_ms: u64) -> ReceiveOutcome {
        let packet = match Packet::deserialize(datagram, self.config.window_size) {
            Ok(packet) => packet,
            Err(_) => return ReceiveOutcome::default(),
        };

        // Standalone acks carry no payload and aren't part of the reliable
        // sequence stream: they exist purely to ferry the piggy-back ack
        // fields when nothing else is due to go out. Folding them into the
        // same classify/deliver path as payload packets would make them
        // consume real gaps in `ReceivedPackets`, inflating the dropped and
        // duplicate counters for datagrams that were never data to begin
        // with.
        if packet.header.packet_type == PacketType::Ack {
            self.ack
                .fold_remote_ack(packet.header.acked_sequence, packet.header.ack_mask);
            self.timer
                .on_ack(packet.header.acked_sequence, now_ms, packet.header.processing_time);
            self.ack.release_acked(&mut self.send_ring);
            self.stats.packets_received += 1;
            return ReceiveOutcome {
                needs_resume: self.needs_resume.is_some(),
                ..ReceiveOutcome::default()
            };
        }

        let accepted_seq = match self.ack.classify_incoming(packet.header.sequence_id) {
            ClassifyOutcome::Stale => {
                return ReceiveOutcome {
                    delivered: Vec::new(),
                    dropped: Some(DropReason::Stale),
                    needs_resume: self.needs_resume.is_some(),
                };
            }
            ClassifyOutcome::Duplicate => {
                // Per spec.md §4.4 step 3 / §7: a duplicate still carries the
                // sender's current piggy-backed ack and must fold it in, the
                // same as the accepted path below — otherwise a retransmit
                // that lands as a duplicate can never release the sender's
                // matching send-ring slots.
                self.ack
                    .fold_remote_ack(packet.header.acked_sequence, packet.header.ack_mask);
                self.timer
                    .on_ack(packet.header.acked_sequence, now_ms, packet.header.processing_time);
                self.ack.release_acked(&mut self.send_ring);
                self.stats.packets_received += 1;
                return ReceiveOutcome {
                    delivered: Vec::new(),
                    dropped: Some(DropReason::Duplicate),
                    needs_resume: self.needs_resume.is_some(),
                };
            }
            ClassifyOutcome::Accepted(seq) => seq,
        };

        self.timer.on_receive(accepted_seq, now_ms);
        self.ack
            .fold_remote_ack(packet.header.acked_sequence, packet.header.ack_mask);
        self.timer
            .on_ack(packet.header.acked_sequence, now_ms, packet.header.processing_time);
        self.ack.release_acked(&mut self.send_ring);
        self.stats.packets_received += 1;

        let mut delivered = Vec::new();
        if accepted_seq == self.next_expected_delivery {
            delivered.push(packet.payload);
            self.next_expected_delivery = self.next_expected_delivery.wrapping_add(1);
            if self.recv_ring.occupied(self.next_expected_delivery) {
                self.needs_resume = Some(self.next_expected_delivery);
            }
        } else {
            self.recv_ring.try_acquire(accepted_seq);
            self.recv_ring.set(accepted_seq, packet.payload);
        }

        ReceiveOutcome {
            delivered,
            dropped: None,
            needs_resume: self.needs_resume.is_some(),
        }
    }

    /// Advances one tick: drains at most one buffered out-of-order packet,
    /// resends anything past its adaptive timeout, and emits a standalone
    /// ack if nothing else already carried one this tick.
    pub fn update(&mut self, now_ms: u64) -> UpdateOutcome {
        let mut delivered = Vec::new();
        let mut outgoing = Vec::new();

        if let Some(start) = self.needs_resume.take() {
            if let Some(payload) = self.recv_ring.get(start).cloned() {
                self.recv_ring.release(start);
                delivered.push(payload);
                self.next_expected_delivery = start.wrapping_add(1);
                if self.recv_ring.occupied(self.next_expected_delivery) {
                    self.needs_resume = Some(self.next_expected_delivery);
                }
            }
        }

        // Decide whether anything needs to go out *before* touching the ack
        // engine's piggy-back bookkeeping: `should_send_ack` compares the
        // current receive state against what was last reported, and
        // `piggyback_ack()` immediately marks the current state reported.
        let resend_after_ms = self.timer.current_resend_time_ms() as u64;
        let mut due: Vec<(u16, u32, Vec<u8>)> = (0..self.send_ring.capacity())
            .filter_map(|idx| self.send_ring.entry_at(idx))
            .filter(|(seq, _)| self.timer.elapsed_since_write(*seq, now_ms) >= resend_after_ms)
            .map(|(seq, payload)| {
                // Distance from the last-acked watermark orders candidates
                // by send order: the smallest distance is the oldest
                // in-flight packet (spec.md §4.5 "emit the oldest such seq
                // first").
                let age = seq::abs_distance(seq, self.ack.sent.acked);
                (seq, age, payload.clone())
            })
            .collect();
        due.sort_by_key(|(_, age, _)| *age);
        let oldest_due = due.first().map(|(due_seq, _, payload)| (*due_seq, payload.clone()));
        let more_resends_due = due.len() > 1;

        let standalone_ack_needed = oldest_due.is_none()
            && self.ack.should_send_ack(self.last_sent_time_ms, self.previous_timestamp_ms);

        if oldest_due.is_some() || standalone_ack_needed {
            let (acked_sequence, ack_mask) = self.ack.piggyback_ack();

            if let Some((seq, payload)) = oldest_due {
                log::debug!("resending seq {} after timeout ({} ms)", seq, resend_after_ms);
                self.timer.on_write(seq, now_ms);
                let processing_time = self.timer.processing_time_for(acked_sequence, now_ms);
                let packet = Packet {
                    header: PacketHeader {
                        packet_type: PacketType::Payload,
                        processing_time,
                        sequence_id: seq,
                        acked_sequence,
                        ack_mask,
                    },
                    payload,
                };
                outgoing.push(packet.serialize(self.config.window_size));
                self.stats.packets_resent += 1;
            }

            if standalone_ack_needed {
                let processing_time = self.timer.processing_time_for(acked_sequence, now_ms);
                let packet = Packet {
                    header: PacketHeader {
                        packet_type: PacketType::Ack,
                        processing_time,
                        sequence_id: self.ack.next_sequence(),
                        acked_sequence,
                        ack_mask,
                    },
                    payload: Vec::new(),
                };
                outgoing.push(packet.serialize(self.config.window_size));
            }
        }

        if !outgoing.is_empty() {
            self.last_sent_time_ms = Some(now_ms);
        }
        self.previous_timestamp_ms = Some(now_ms);

        UpdateOutcome {
            delivered,
            outgoing,
            needs_resume: self.needs_resume.is_some() || more_resends_due,
        }
    }
}
