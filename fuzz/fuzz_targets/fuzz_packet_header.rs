#![no_main]
use libfuzzer_sys::fuzz_target;
use reliable_sequenced::Packet;

fuzz_target!(|data: &[u8]| {
    // Should never panic on arbitrary input, at either wire-mask width.
    let _ = Packet::deserialize(data, 32);
    let _ = Packet::deserialize(data, 64);
});
