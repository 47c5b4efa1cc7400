//! Delayed-event source (DES, §4.3).
//!
//! A polymorphic device exposing the capability set `{arm,
//! event_has_happened, get_launch_time, get_time_before_idle,
//! get_time_after_idle, init, exit}` plus the optional `{time_to_ns,
//! get_trace_data}`. Modeled as a trait so [`crate::engine::Engine`] is
//! generic over the concrete source and never pays for dynamic dispatch on
//! the hot path (§9, "Polymorphic device").

use std::io::Result;

pub mod hrt;

#[cfg(feature = "bpf")]
pub mod bpf;

/// Which concrete source backs a run; reported to the consumer and used to
/// pick the wire encoding (trace_printk vs. synthetic event, §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Variant {
    Hrt,
    Bpf,
}

/// Capability set exposed by a concrete delayed-event source.
pub trait DelayedEventSource: Sized {
    /// Smallest legal `ldist`, bounded by this source's timer granularity.
    const LDIST_MIN: u64;
    /// Largest legal `ldist`.
    const LDIST_MAX: u64;

    fn init(cpu: u32) -> Result<Self>;

    /// Programs a wake `ldist` ns from now; returns the stamped launch
    /// time. MUST record `ltime = now_ns() + ldist` atomically with arming.
    fn arm(&mut self, ldist: u64) -> Result<u64>;

    /// Consulted inside `after_idle` to decide whether the observed wake
    /// was the programmed one. MAY false-negative only while `ltime` is
    /// still in the future.
    fn event_has_happened(&mut self) -> bool;

    /// The `ltime` stamped by the most recent [`arm`][Self::arm].
    fn get_launch_time(&self) -> u64;

    /// Timestamp to use for `tbi`; normally `now_ns()`.
    fn get_time_before_idle(&self) -> u64;

    /// Timestamp to use for `tai`; normally `now_ns()`.
    fn get_time_after_idle(&self) -> u64;

    fn exit(&mut self) -> Result<()>;

    /// Converts a counter-derived duration to nanoseconds. Only meaningful
    /// for TSC-cycle-based sources; `None` means "not supported".
    fn time_to_ns(&self, _cycles: u64) -> Option<u64> {
        None
    }

    /// Driver-specific `(name, value)` pairs to append to an emitted record
    /// as `drv_fields` (§3, §6). Empty by default.
    fn get_trace_data(&self) -> Vec<(&'static str, u64)> {
        Vec::new()
    }

    fn variant(&self) -> Variant;
}
