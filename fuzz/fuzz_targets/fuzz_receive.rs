#![no_main]
use libfuzzer_sys::fuzz_target;
use reliable_sequenced::{PipelineConfig, PipelineEndpoint};

fuzz_target!(|data: &[u8]| {
    // An arbitrary inbound datagram, valid or not, must never panic the
    // pipeline: malformed input is dropped the same as a lost packet.
    let mut endpoint = PipelineEndpoint::new(PipelineConfig::default()).unwrap();
    let _ = endpoint.receive(data, 0);
});
