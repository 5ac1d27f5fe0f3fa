//! Storage adapters implementing [`StoragePort`].
//!
//! - [`MemStorage`] — in-memory map, the host/test backend.
//! - `NvsStorage` — ESP-IDF NVS blobs (`target_os = "espidf"` only).
//!   Writes go through `nvs_commit`, which the IDF guarantees atomic per
//!   key, so a power cut mid-checkpoint leaves the previous blob intact.
//!
//! Config (de)serialization helpers live here too: configuration persists
//! as a postcard blob under one well-known key, falling back to defaults
//! when absent or unreadable.

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::config::SystemConfig;

const CONFIG_KEY: &str = "syscfg";

/// Load persisted configuration, defaulting when the key is missing or the
/// stored blob fails decoding/validation.
pub fn load_config<S: StoragePort>(storage: &S) -> SystemConfig {
    let mut buf = [0u8; 256];
    match storage.load(CONFIG_KEY, &mut buf) {
        Ok(n) => match postcard::from_bytes::<SystemConfig>(&buf[..n]) {
            Ok(config) if config.validate().is_ok() => {
                info!("config: loaded from storage");
                config
            }
            Ok(_) => {
                warn!("config: stored config fails validation, using defaults");
                SystemConfig::default()
            }
            Err(_) => {
                warn!("config: stored config corrupted, using defaults");
                SystemConfig::default()
            }
        },
        Err(StorageError::NotFound) => {
            info!("config: none stored, using defaults");
            SystemConfig::default()
        }
        Err(e) => {
            warn!("config: load failed ({e}), using defaults");
            SystemConfig::default()
        }
    }
}

/// Validate and persist configuration.
pub fn store_config<S: StoragePort>(
    storage: &mut S,
    config: &SystemConfig,
) -> Result<(), StorageError> {
    if let Err(msg) = config.validate() {
        warn!("config: refusing to persist invalid config: {msg}");
        return Err(StorageError::IoError);
    }
    let mut buf = [0u8; 256];
    let bytes = postcard::to_slice(config, &mut buf).map_err(|_| StorageError::Full)?;
    storage.store(CONFIG_KEY, bytes)
}

// ───────────────────────────────────────────────────────────────
// In-memory backend
// ───────────────────────────────────────────────────────────────

/// Host/test storage backend.
#[derive(Default)]
pub struct MemStorage {
    store: std::collections::HashMap<String, Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemStorage {
    fn load(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.store.get(key) {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn store(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF NVS backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use espidf::NvsStorage;

#[cfg(target_os = "espidf")]
mod espidf {
    use super::{StorageError, StoragePort};
    use esp_idf_svc::sys::*;
    use log::{info, warn};

    const NAMESPACE: &[u8; 9] = b"airscrub\0";

    pub struct NvsStorage;

    impl NvsStorage {
        /// Initialise NVS flash. On first boot or after a version mismatch
        /// the partition is erased and re-initialised.
        pub fn new() -> Result<Self, StorageError> {
            // SAFETY: called from the single main-task context before any
            // concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NVS: initialised");
            Ok(Self)
        }

        fn with_handle<F, T>(write: bool, f: F) -> Result<T, i32>
        where
            F: FnOnce(nvs_handle_t) -> Result<T, i32>,
        {
            let mode = if write {
                nvs_open_mode_t_NVS_READWRITE
            } else {
                nvs_open_mode_t_NVS_READONLY
            };
            let mut handle: nvs_handle_t = 0;
            let ret = unsafe { nvs_open(NAMESPACE.as_ptr() as *const _, mode, &mut handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            let result = f(handle);
            unsafe { nvs_close(handle) };
            result
        }

        fn key_buf(key: &str) -> [u8; 16] {
            let mut buf = [0u8; 16];
            let bytes = key.as_bytes();
            let len = bytes.len().min(15);
            buf[..len].copy_from_slice(&bytes[..len]);
            buf
        }
    }

    impl StoragePort for NvsStorage {
        fn load(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
            let key_buf = Self::key_buf(key);
            let result = Self::with_handle(false, |handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }

        fn store(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
            let key_buf = Self::key_buf(key);
            Self::with_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            })
            .map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }
}
