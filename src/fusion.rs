//! Environmental filter — redundancy fusion across sensor sources.
//!
//! Every sensor source registers a slot per side at discovery time; the slot
//! order is the registration order and never changes afterwards. Fusion picks,
//! per (side, measurement kind), the first slot holding a known reading —
//! registration order is discovery priority, not an accuracy ranking.
//!
//! A fusion pass produces a [`FusedSnapshot`] that is published wholesale;
//! consumers only ever copy the complete struct, so a torn update is not
//! observable.

use heapless::Vec;
use log::warn;

use crate::reading::{Celsius, Pascals, Reading, RelHumidity, VocIndex};

/// The two independently sensed airflow paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Intake,
    Exhaust,
}

/// Most sources a side can carry: one per bus driver kind plus the
/// host-internal temperature.
pub const MAX_SOURCES: usize = 6;

/// Handle for one registered source slot on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceId(u8);

impl SourceId {
    /// Placeholder for a driver that has not finished identification yet.
    /// Publishing against it is a no-op.
    pub(crate) const UNREGISTERED: SourceId = SourceId(u8::MAX);
}

/// Latest values published by one source. Slots a source never writes stay
/// not-known forever and fusion skips past them.
#[derive(Debug, Clone, Copy)]
struct SlotValues {
    temperature: Reading<Celsius>,
    humidity: Reading<RelHumidity>,
    pressure: Reading<Pascals>,
    voc_index: Reading<VocIndex>,
}

impl SlotValues {
    const EMPTY: Self = Self {
        temperature: Reading::NotKnown,
        humidity: Reading::NotKnown,
        pressure: Reading::NotKnown,
        voc_index: Reading::NotKnown,
    };
}

#[derive(Debug, Default)]
struct SideSlots {
    slots: Vec<SlotValues, MAX_SOURCES>,
}

impl SideSlots {
    fn first_known<T: Copy>(&self, pick: impl Fn(&SlotValues) -> Reading<T>) -> Reading<T> {
        for slot in &self.slots {
            let r = pick(slot);
            if r.is_known() {
                return r;
            }
        }
        Reading::NotKnown
    }
}

/// Per-side candidate registry and fusion engine.
#[derive(Debug, Default)]
pub struct EnvironmentalFilter {
    intake: SideSlots,
    exhaust: SideSlots,
}

impl EnvironmentalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn side(&self, side: Side) -> &SideSlots {
        match side {
            Side::Intake => &self.intake,
            Side::Exhaust => &self.exhaust,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideSlots {
        match side {
            Side::Intake => &mut self.intake,
            Side::Exhaust => &mut self.exhaust,
        }
    }

    /// Register a new candidate source on `side`. Call order fixes the
    /// fusion priority for the whole session.
    pub fn register(&mut self, side: Side) -> SourceId {
        let slots = &mut self.side_mut(side).slots;
        let id = SourceId(slots.len() as u8);
        if slots.push(SlotValues::EMPTY).is_err() {
            // registry sized for every known driver kind; reaching this
            // means a probe bug, not a runtime condition
            warn!("source registry full, fusing without the extra candidate");
        }
        id
    }

    fn slot_mut(&mut self, side: Side, src: SourceId) -> Option<&mut SlotValues> {
        self.side_mut(side).slots.get_mut(src.0 as usize)
    }

    pub fn set_temperature(&mut self, side: Side, src: SourceId, value: Reading<Celsius>) {
        if let Some(slot) = self.slot_mut(side, src) {
            slot.temperature = value;
        }
    }

    pub fn set_humidity(&mut self, side: Side, src: SourceId, value: Reading<RelHumidity>) {
        if let Some(slot) = self.slot_mut(side, src) {
            slot.humidity = value;
        }
    }

    pub fn set_pressure(&mut self, side: Side, src: SourceId, value: Reading<Pascals>) {
        if let Some(slot) = self.slot_mut(side, src) {
            slot.pressure = value;
        }
    }

    pub fn set_voc_index(&mut self, side: Side, src: SourceId, value: Reading<VocIndex>) {
        if let Some(slot) = self.slot_mut(side, src) {
            slot.voc_index = value;
        }
    }

    /// Current best temperature/humidity for on-device compensation inputs,
    /// with the conventional 25 °C / 50 %RH fallbacks.
    pub fn compensation(&self, side: Side) -> (f32, f32) {
        let slots = self.side(side);
        let t = slots
            .first_known(|s| s.temperature)
            .value()
            .map_or(25.0, Celsius::degrees);
        let h = slots
            .first_known(|s| s.humidity)
            .value()
            .map_or(50.0, RelHumidity::percent);
        (t, h)
    }

    /// Run one fusion pass. The returned snapshot replaces the previous one
    /// as a whole.
    pub fn fuse(&self, mcu_temperature: Reading<Celsius>) -> FusedSnapshot {
        let fuse_side = |slots: &SideSlots| SideReadings {
            temperature: slots.first_known(|s| s.temperature),
            humidity: slots.first_known(|s| s.humidity),
            pressure: slots.first_known(|s| s.pressure),
            voc_index: slots.first_known(|s| s.voc_index),
        };
        FusedSnapshot {
            intake: fuse_side(&self.intake),
            exhaust: fuse_side(&self.exhaust),
            mcu_temperature,
        }
    }
}

/// Fused values for one side.
#[derive(Debug, Clone, Copy)]
pub struct SideReadings {
    pub temperature: Reading<Celsius>,
    pub humidity: Reading<RelHumidity>,
    pub pressure: Reading<Pascals>,
    pub voc_index: Reading<VocIndex>,
}

impl SideReadings {
    pub const NOT_KNOWN: Self = Self {
        temperature: Reading::NotKnown,
        humidity: Reading::NotKnown,
        pressure: Reading::NotKnown,
        voc_index: Reading::NotKnown,
    };
}

/// One coherent view of the environment, replaced atomically each pass.
#[derive(Debug, Clone, Copy)]
pub struct FusedSnapshot {
    pub intake: SideReadings,
    pub exhaust: SideReadings,
    pub mcu_temperature: Reading<Celsius>,
}

impl FusedSnapshot {
    pub const NOT_KNOWN: Self = Self {
        intake: SideReadings::NOT_KNOWN,
        exhaust: SideReadings::NOT_KNOWN,
        mcu_temperature: Reading::NotKnown,
    };
}
