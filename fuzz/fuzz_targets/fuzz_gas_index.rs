//! Fuzz target: gas index engine
//!
//! Feeds arbitrary raw-sample streams through the index engine with
//! interleaved checkpoint/restore cycles, asserting:
//! - No panics for any sample sequence
//! - The index never leaves [0, 500]
//! - A live engine never serializes the reserved all-zero pair
//! - Restoring a checkpoint reproduces the saved state
//!
//! cargo fuzz run fuzz_gas_index

#![no_main]

use libfuzzer_sys::fuzz_target;

use airscrub::sensors::gas_index::{AlgorithmKind, CalibrationBlob, GasIndex};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let mut engine = GasIndex::new(AlgorithmKind::Voc, 340, 1000, 0);
    let mut now_ms = 0u64;

    for pair in data.chunks_exact(2) {
        let raw = u16::from_le_bytes([pair[0], pair[1]]);
        let index = engine.process(raw);
        assert!(index <= 500, "index {index} out of range");

        now_ms += 1000;
        if let Some(blob) = engine.checkpoint(now_ms) {
            assert!(
                !blob.is_empty(),
                "a genuine save must never be the reserved pair"
            );
            assert_eq!(CalibrationBlob::from_bytes(&blob.to_bytes()).unwrap(), blob);

            let mut restored = GasIndex::new(AlgorithmKind::Voc, 340, 1000, now_ms);
            assert!(restored.restore(&blob, now_ms));
            assert_eq!(restored.save(), blob);
        }
    }
});
