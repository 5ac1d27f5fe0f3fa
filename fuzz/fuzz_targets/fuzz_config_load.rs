//! Fuzz target: persisted-config loading
//!
//! Plants arbitrary bytes under the config storage key and loads through
//! the normal path, asserting:
//! - No panics for any stored blob
//! - The result is always a valid configuration (decoded-and-validated, or
//!   the defaults when the blob is garbage)
//! - A loaded config can always be persisted again
//!
//! cargo fuzz run fuzz_config_load

#![no_main]

use libfuzzer_sys::fuzz_target;

use airscrub::adapters::storage::{load_config, store_config, MemStorage};
use airscrub::app::ports::StoragePort;

fuzz_target!(|data: &[u8]| {
    let mut storage = MemStorage::new();
    storage
        .store("syscfg", data)
        .expect("in-memory store cannot fail");

    let config = load_config(&storage);
    assert!(
        config.validate().is_ok(),
        "load_config must never yield an invalid config"
    );

    store_config(&mut storage, &config).expect("a valid config always persists");
    let reloaded = load_config(&storage);
    assert_eq!(reloaded.voc_passive_max, config.voc_passive_max);
    assert_eq!(reloaded.cooldown_secs, config.cooldown_secs);
    assert_eq!(reloaded.checkpoint_interval_secs, config.checkpoint_interval_secs);
});
