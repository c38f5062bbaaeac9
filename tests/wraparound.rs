//! Regression coverage for the Open Question in `spec.md` §9: the "≤
//! current" classification branch's wrap-repair condition
//! (`d >= 0xFFFF - window_size`). Exercises distances straddling the
//! `0xFFFF -> 0x0000` boundary at `1`, `window-1`, `window`, and `window+1`,
//! the exact set the spec asks a reimplementation to cover.
use reliable_sequenced::{PipelineConfig, PipelineEndpoint};

fn config(window_size: u16) -> PipelineConfig {
    PipelineConfig {
        window_size,
        minimum_resend_time_ms: 10,
        maximum_resend_time_ms: 200,
        max_payload_size: 256,
    }
}

/// Drives seq 0xFFFE, 0xFFFF, 0x0000 through in-order and verifies no slot
/// leaks and no misclassification across the wrap (spec.md §8 scenario 5).
#[test]
fn three_packets_straddling_the_wrap_deliver_in_order() {
    let mut sender = PipelineEndpoint::new(config(4)).unwrap();
    let mut receiver = PipelineEndpoint::new(config(4)).unwrap();

    // Burn the sequence counter up to 0xFFFE by sending-and-acking ahead of
    // the wrap, so every in-flight slot is released before it happens.
    let mut now = 0u64;
    while sender.stats().packets_sent < 0xFFFE {
        let datagram = sender.send(b"warm-up", now).unwrap();
        receiver.receive(&datagram, now + 1);
        for ack in receiver.update(now + 2).outgoing {
            sender.receive(&ack, now + 3);
        }
        now += 4;
    }

    for payload in [&b"a"[..], &b"b"[..], &b"c"[..]] {
        let datagram = sender.send(payload, now).unwrap();
        let outcome = receiver.receive(&datagram, now + 1);
        assert_eq!(outcome.delivered, vec![payload.to_vec()]);
        for ack in receiver.update(now + 2).outgoing {
            sender.receive(&ack, now + 3);
        }
        now += 4;
    }

    // No leaked slots: the window should be fully available again.
    assert!(sender.send(b"d", now).is_ok());
}

/// The classify path for "seq <= ReceivedPackets.Sequence" must not panic
/// at any of the distances the spec's Open Question calls out, regardless
/// of which side of the wrap `ReceivedPackets.Sequence` currently sits on.
#[test]
fn wrap_repair_distances_never_panic_near_the_boundary() {
    for window in [4u16, 32, 64] {
        for distance in [1u16, window.saturating_sub(1).max(1), window, window + 1] {
            let mut receiver = PipelineEndpoint::new(config(window)).unwrap();
            let mut sender = PipelineEndpoint::new(config(window)).unwrap();

            // Drive the receiver's `ReceivedPackets.Sequence` right up to
            // the 0xFFFF -> 0x0000 boundary.
            let mut now = 0u64;
            while sender.stats().packets_sent < 0xFFFF {
                let datagram = sender.send(b"x", now).unwrap();
                receiver.receive(&datagram, now + 1);
                for ack in receiver.update(now + 2).outgoing {
                    sender.receive(&ack, now + 3);
                }
                now += 4;
            }

            // Replay an already-seen sequence `distance` behind the current
            // one; must classify as stale or duplicate without panicking.
            let replayed_seq = 0xFFFFu16.wrapping_sub(distance);
            let mut raw = sender.send(b"probe", now).unwrap();
            // Overwrite the sequence_id field (bytes 4..6, little-endian)
            // to the replayed value without touching the rest of the header.
            let seq_bytes = replayed_seq.to_le_bytes();
            raw[4] = seq_bytes[0];
            raw[5] = seq_bytes[1];
            let outcome = receiver.receive(&raw, now + 1);
            let _ = outcome; // must not panic regardless of classification
        }
    }
}
