//! Monotonic time and delay adapters.
//!
//! The core never reads a clock itself — `now_ms` is threaded into every
//! tick — so this is the adapter the bootstrap uses to produce it.
//!
//! - **`target_os = "espidf"`** — wraps the ESP-IDF high-resolution timer.
//! - otherwise — `std::time::Instant`, for host-side testing and simulation.

use embedded_hal::delay::DelayNs;

/// Milliseconds since construction, monotonic.
pub struct Uptime {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

impl Uptime {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Blocking delay for probe-time settling waits.
pub struct BlockingDelay;

impl DelayNs for BlockingDelay {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        unsafe { esp_idf_svc::sys::esp_rom_delay_us(ns.div_ceil(1000)) };
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
