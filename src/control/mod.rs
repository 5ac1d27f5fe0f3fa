//! Control policies driven by the fused environmental snapshot.

pub mod fan_policy;
