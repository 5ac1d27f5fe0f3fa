//! Host-side gas index engine.
//!
//! Raw metal-oxide signals drift with sensor age and environment, so an
//! absolute reading is meaningless; what matters is deviation from a learned
//! baseline. The engine keeps an incremental estimate of the raw signal's
//! mean and typical deviation (both Q8.8 fixed point) and maps each sample's
//! z-score onto an index scale where the baseline sits at the algorithm
//! offset and 500 is the ceiling.
//!
//! The learned baseline is the part worth keeping across power cycles:
//! [`GasIndex::checkpoint`] serializes the two state words once per
//! checkpoint interval and [`GasIndex::restore`] warm-starts from them,
//! skipping the cold-start blackout.

use crate::error::{Error, Result};

/// Two words of persisted baseline state. The all-zero pair is reserved to
/// mean "never saved"; a live engine cannot produce it (the deviation word
/// is floored above zero from the first sample).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationBlob(pub [i32; 2]);

impl CalibrationBlob {
    pub const SIZE: usize = 8;

    pub fn is_empty(&self) -> bool {
        self.0 == [0, 0]
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.0[0].to_le_bytes());
        out[4..].copy_from_slice(&self.0[1].to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::Config("calibration blob must be 8 bytes"));
        }
        let a = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let b = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self([a, b]))
    }
}

/// Which index family the instance computes. They share the estimator; the
/// baseline output differs (VOC centers at 100, NOx at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Voc,
    Nox,
}

impl AlgorithmKind {
    fn offset(self) -> f32 {
        match self {
            Self::Voc => 100.0,
            Self::Nox => 1.0,
        }
    }
}

/// Samples to swallow before the index is considered meaningful on a cold
/// start. At the 1 s tick this is the usual blackout window for these
/// algorithms; a restored baseline skips it.
const WARMUP_SAMPLES: u32 = 45;

/// Exponential time constant for baseline adaptation, in samples.
const TAU_SAMPLES: i32 = 64;

/// Floor for the deviation estimate (Q8.8): keeps z-scores finite and keeps
/// a genuine save distinguishable from the never-saved all-zero pair.
const MIN_DEVIATION_Q8: i32 = 4 << 8;

/// Initial deviation estimate (Q8.8) before any spread has been observed.
const INITIAL_DEVIATION_Q8: i32 = 50 << 8;

/// Index points per unit of z-score.
const INDEX_GAIN: f32 = 50.0;

pub struct GasIndex {
    kind: AlgorithmKind,
    /// Learned raw-signal mean, Q8.8.
    mean_q8: i32,
    /// Learned absolute deviation, Q8.8.
    deviation_q8: i32,
    samples: u32,
    warm: bool,
    /// Baseline adaptation is suspended while the index sits above this.
    gating: u16,
    checkpoint_interval_ms: u64,
    next_checkpoint_ms: u64,
}

impl GasIndex {
    pub fn new(kind: AlgorithmKind, gating: u16, checkpoint_interval_ms: u64, now_ms: u64) -> Self {
        Self {
            kind,
            mean_q8: 0,
            deviation_q8: 0,
            samples: 0,
            warm: false,
            gating,
            checkpoint_interval_ms,
            next_checkpoint_ms: now_ms.saturating_add(checkpoint_interval_ms),
        }
    }

    /// Feed one raw sample; returns the index in [0, 500] where 0 means "not
    /// yet available" (cold start blackout). A 0 result must not overwrite a
    /// previously published index — callers simply skip publishing it.
    pub fn process(&mut self, raw: u16) -> u16 {
        let raw_q8 = i32::from(raw) << 8;

        if self.samples == 0 && !self.warm {
            self.mean_q8 = raw_q8;
            self.deviation_q8 = INITIAL_DEVIATION_Q8;
        }
        self.samples = self.samples.saturating_add(1);

        let delta = raw_q8 - self.mean_q8;
        let spread = self.deviation_q8.max(MIN_DEVIATION_Q8) as f32;
        let z = delta as f32 / spread;
        let index = (self.kind.offset() + z * INDEX_GAIN).clamp(1.0, 500.0) as u16;

        // adapt only while below the gating threshold so a sustained event
        // doesn't become the new baseline
        if index <= self.gating {
            self.mean_q8 += delta / TAU_SAMPLES;
            self.deviation_q8 += (delta.abs() - self.deviation_q8) / TAU_SAMPLES;
            self.deviation_q8 = self.deviation_q8.max(MIN_DEVIATION_Q8);
        }

        if !self.warm {
            if self.samples < WARMUP_SAMPLES {
                return 0;
            }
            self.warm = true;
        }
        index
    }

    /// Serialize the baseline state.
    pub fn save(&self) -> CalibrationBlob {
        CalibrationBlob([self.mean_q8, self.deviation_q8])
    }

    /// Warm-start from a persisted blob. Returns `false` iff the blob is the
    /// reserved never-saved pair, leaving the engine in its cold-start
    /// state. Either way the checkpoint deadline restarts from `now_ms`.
    pub fn restore(&mut self, blob: &CalibrationBlob, now_ms: u64) -> bool {
        self.next_checkpoint_ms = now_ms.saturating_add(self.checkpoint_interval_ms);
        if blob.is_empty() {
            return false;
        }
        self.mean_q8 = blob.0[0];
        self.deviation_q8 = blob.0[1].max(MIN_DEVIATION_Q8);
        self.warm = true;
        true
    }

    /// Returns the serialized state exactly once per interval crossing,
    /// rescheduling the deadline to `now_ms + interval`.
    pub fn checkpoint(&mut self, now_ms: u64) -> Option<CalibrationBlob> {
        if now_ms < self.next_checkpoint_ms {
            return None;
        }
        self.next_checkpoint_ms = now_ms.saturating_add(self.checkpoint_interval_ms);
        Some(self.save())
    }
}
