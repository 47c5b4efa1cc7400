//! Setup-time errors (§7).
//!
//! Everything that happens once a datapoint is in flight — a transient TSC
//! read failure, a window-invariant violation, a ring overflow — is handled
//! locally and never surfaces as a [`SetupError`]. Only the handful of named
//! failures that make a run impossible reach the consumer through
//! [`crate::engine::Engine::enable`].

use thiserror::Error;

/// Fatal failures raised by [`Engine::enable`][crate::engine::Engine::enable].
///
/// Recovery is not attempted at this level: the caller decides whether to
/// retry (e.g. after the operator loads the `cstate_core`/`cstate_pkg` PMU
/// driver) or give up.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The `cpu_idle` tracepoint could not be resolved by name.
    #[error("cpu_idle tracepoint not found")]
    TracepointNotFound,

    /// The detected CPU family/model has no entry in the C-state table.
    #[error("CPU family {family:#x} model {model:#x} has no known C-state table")]
    UnsupportedCpu { family: u8, model: u8 },

    /// A required MSR or PMU counter could not be opened.
    #[error("required counter unavailable: {0}")]
    CounterUnavailable(#[source] std::io::Error),

    /// The requested CPU is not online.
    #[error("CPU {0} is not online")]
    CpuNotOnline(u32),

    /// `min_t`/`max_t` violate `1 <= min_t < max_t <= 20_000_000` (§6).
    #[error("invalid launch distance bounds: min_t={min_t} max_t={max_t}")]
    InvalidBounds { min_t: u64, max_t: u64 },
}
