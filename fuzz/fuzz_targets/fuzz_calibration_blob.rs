//! Fuzz target: `CalibrationBlob` decoding and engine restore
//!
//! Drives arbitrary byte slices through the blob decoder and a warm-start
//! restore, asserting:
//! - No panics for any input length or content
//! - Decoding succeeds exactly for 8-byte inputs and round-trips losslessly
//! - The reserved all-zero pair always leaves the engine cold
//!
//! cargo fuzz run fuzz_calibration_blob

#![no_main]

use libfuzzer_sys::fuzz_target;

use airscrub::sensors::gas_index::{AlgorithmKind, CalibrationBlob, GasIndex};

fuzz_target!(|data: &[u8]| {
    let decoded = CalibrationBlob::from_bytes(data);
    if data.len() != CalibrationBlob::SIZE {
        assert!(decoded.is_err(), "only 8-byte blobs may decode");
        return;
    }

    let blob = decoded.expect("8-byte blobs always decode");
    assert_eq!(blob.to_bytes().as_slice(), data, "blob encoding must round-trip");

    let mut engine = GasIndex::new(AlgorithmKind::Voc, 340, 86_400_000, 0);
    let restored = engine.restore(&blob, 0);
    assert_eq!(restored, !blob.is_empty());

    if restored {
        // a warm-started engine publishes from the first sample
        assert_ne!(engine.process(30_000), 0);
    } else {
        // the reserved pair leaves the cold-start blackout in place
        assert_eq!(engine.process(30_000), 0);
    }
});
