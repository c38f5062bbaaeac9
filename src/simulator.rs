//! A deterministic, injectable-RNG channel simulator for exercising the
//! pipeline under loss, duplication, and reordering without a real socket.
//!
//! `gbnet` documents a `NetworkSimulator` in its module list but the
//! retrieved sources never carried its implementation, so this is built
//! fresh, in the shape that reference implies: a `latency`/`jitter`/
//! `packet_loss`/`duplicate_chance` knob set plus an injected `rand::Rng`
//! (`spec.md` §9's design note replacing the original's process-global RNG
//! seed with an explicit, test-controllable one).
use rand::Rng;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorConfig {
    /// Fraction of datagrams silently dropped, `0.0..=1.0`.
    pub packet_loss: f64,
    /// Fraction of delivered datagrams additionally delivered a second
    /// time, `0.0..=1.0`.
    pub duplicate_chance: f64,
    /// Fixed one-way delay applied to every datagram that survives loss.
    pub latency_ms: u64,
    /// Extra random delay added on top of `latency_ms`, uniform in
    /// `0..=jitter_ms`.
    pub jitter_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            packet_loss: 0.0,
            duplicate_chance: 0.0,
            latency_ms: 0,
            jitter_ms: 0,
        }
    }
}

struct InFlight {
    arrival_ms: u64,
    datagram: Vec<u8>,
}

/// A one-directional simulated link. Pair two of these to simulate a full
/// duplex connection between two [`crate::pipeline::PipelineEndpoint`]s.
pub struct NetworkSimulator<R: Rng> {
    config: SimulatorConfig,
    rng: R,
    in_flight: VecDeque<InFlight>,
}

impl<R: Rng> NetworkSimulator<R> {
    pub fn new(config: SimulatorConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            in_flight: VecDeque::new(),
        }
    }

    /// Feeds one outbound datagram into the link. May drop it, may enqueue
    /// it twice (duplication), may enqueue it with delay.
    pub fn send(&mut self, datagram: Vec<u8>, now_ms: u64) {
        if self.rng.gen_bool(self.config.packet_loss.clamp(0.0, 1.0)) {
            return;
        }
        let jitter = if self.config.jitter_ms > 0 {
            self.rng.gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let arrival_ms = now_ms + self.config.latency_ms + jitter;
        self.in_flight.push_back(InFlight {
            arrival_ms,
            datagram: datagram.clone(),
        });
        if self.rng.gen_bool(self.config.duplicate_chance.clamp(0.0, 1.0)) {
            self.in_flight.push_back(InFlight { arrival_ms, datagram });
        }
    }

    /// Drains every datagram whose simulated arrival time has passed. Does
    /// not guarantee FIFO order across different delays: the caller's
    /// reorder handling is exactly what's under test.
    pub fn poll(&mut self, now_ms: u64) -> Vec<Vec<u8>> {
        let mut arrived = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.in_flight.len());
        for entry in self.in_flight.drain(..) {
            if entry.arrival_ms <= now_ms {
                arrived.push(entry.datagram);
            } else {
                remaining.push_back(entry);
            }
        }
        self.in_flight = remaining;
        arrived
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
