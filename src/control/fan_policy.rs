//! Fan power policy.
//!
//! Two independent pieces:
//!
//! - [`FanPolicy`]: the environmental decision. Binary output — either the
//!   air justifies filtering (or recently did, via the cooldown debounce)
//!   or it doesn't.
//! - [`ThermalLimit`]: a derating coefficient from the exhaust temperature,
//!   protecting the fan/electronics when the outflow runs hot.
//!
//! The exposed fan power fraction is the product of the two, in [0, 1].
//!
//! The policy owns a copy of its parameters: evaluators never borrow from a
//! longer-lived configuration struct, so there is no ordering hazard
//! between config teardown and policy use.

use crate::config::SystemConfig;
use crate::fusion::FusedSnapshot;
use crate::reading::{Celsius, Reading};

/// Environmental policy thresholds.
#[derive(Debug, Clone, Copy)]
pub struct FanPolicyParams {
    /// VOC index at/above which it is simply too filthy not to filter.
    pub voc_passive_max: u16,
    /// Minimum (intake - exhaust) improvement proving filtering is helping.
    pub voc_improve_min: u16,
    /// How long to keep spinning after the rules stop firing.
    pub cooldown_ms: u64,
}

impl FanPolicyParams {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            voc_passive_max: config.voc_passive_max,
            voc_improve_min: config.voc_improve_min,
            cooldown_ms: u64::from(config.cooldown_secs) * 1000,
        }
    }
}

/// Stateful environmental decision function.
pub struct FanPolicy {
    params: FanPolicyParams,
    last_filtering_ms: Option<u64>,
}

impl FanPolicy {
    pub fn new(params: FanPolicyParams) -> Self {
        Self {
            params,
            last_filtering_ms: None,
        }
    }

    /// Evaluate one tick. Output is 0.0 or 1.0, never a blend.
    pub fn evaluate(&mut self, snapshot: &FusedSnapshot, now_ms: u64) -> f32 {
        // can't decide anything until both sides report
        let (Some(intake), Some(exhaust)) = (
            snapshot.intake.voc_index.value(),
            snapshot.exhaust.voc_index.value(),
        ) else {
            return 0.0;
        };

        // too filthy in here; get scrubbing
        if intake.get().max(exhaust.get()) >= self.params.voc_passive_max {
            self.last_filtering_ms = Some(now_ms);
            return 1.0;
        }

        // intake is measurably worse than exhaust: filtering is helping
        let improvement = i32::from(intake.get()) - i32::from(exhaust.get());
        if improvement >= i32::from(self.params.voc_improve_min) {
            self.last_filtering_ms = Some(now_ms);
            return 1.0;
        }

        // cooldown: keep going for a bit to mop up the leftovers
        if let Some(last) = self.last_filtering_ms {
            if now_ms < last.saturating_add(self.params.cooldown_ms) {
                return 1.0;
            }
        }

        0.0
    }
}

/// Temperature-based derating of the fan power.
#[derive(Debug, Clone, Copy)]
pub struct ThermalLimit {
    min_c: f32,
    max_c: f32,
    /// Coefficient at/above `max_c`, percent. 100 disables the limiter.
    coefficient_pct: u8,
}

impl ThermalLimit {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            min_c: config.thermal_min_c,
            max_c: config.thermal_max_c,
            coefficient_pct: config.thermal_coefficient_pct,
        }
    }

    /// Multiplier in [0, 1]. Unknown temperature never derates — the
    /// environmental policy already refuses to run blind, and a missing
    /// exhaust probe must not strand the fan at reduced power.
    pub fn coefficient(&self, exhaust_temperature: Reading<Celsius>) -> f32 {
        if self.coefficient_pct >= 100 {
            return 1.0;
        }
        let Some(t) = exhaust_temperature.value() else {
            return 1.0;
        };
        let t = t.degrees();
        let floor = f32::from(self.coefficient_pct) / 100.0;
        if t >= self.max_c {
            return floor;
        }
        if t < self.min_c {
            return 1.0;
        }
        let frac = (t - self.min_c) / (self.max_c - self.min_c);
        1.0 + (floor - 1.0) * frac
    }
}
