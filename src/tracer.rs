//! Idle tracer (IT, §4.4).
//!
//! The state machine driven from the three sample points the engine loop
//! calls into: [`before_idle`][IdleTracer::before_idle] just before the CPU
//! goes idle, [`after_idle`][IdleTracer::after_idle] right after it wakes,
//! and [`interrupt`][IdleTracer::interrupt] from the wake IRQ handler itself
//! — the last two may arrive in either order. A [`Record`] is only produced
//! once both have run and every invariant in §3 holds; every other path is a
//! silent discard, counted in [`Diagnostics`].

use std::io;

use crate::clock::{Clock, SystemClock};
use crate::cstate::{CStateBank, CStateDef};
use crate::des::DelayedEventSource;
use crate::error::SetupError;
use crate::record::{Datapoint, Record};
use crate::smi::SmiNmiCounter;

/// Scratch state threaded between `before_idle`, `after_idle` and
/// `interrupt` for one in-flight cycle (§3).
#[derive(Default)]
struct EngineState {
    tbi: u64,
    tai: u64,
    tintr: u64,
    ltime: u64,
    ldist: u64,
    req_cstate: u32,
    got_measurements: bool,
    /// TSC-derived cost of `after_idle`'s own accounting work, subtracted
    /// out of `intr_latency` (§3, §4.4 step 8).
    ai_overhead: u64,
    smi_bi: u64,
    nmi_bi: u64,
    smi_ai: u64,
    nmi_ai: u64,
    smi_intr: u64,
    nmi_intr: u64,
}

/// Counters surfaced to the consumer through
/// [`crate::engine::Engine::diagnostics`] (§7).
#[derive(Default, Clone, Copy, Debug)]
pub struct Diagnostics {
    /// Records discarded because `tbi < ltime < tai` did not hold.
    pub discarded_window: u64,
    /// Records discarded because an extra wake was observed between arm and
    /// wake (§3 invariant 3, "Arm accounting").
    pub discarded_arm: u64,
    /// The one record every run discards: deltas computed against an
    /// uninitialized snapshot (§9, decided open question).
    pub discarded_first: u64,
    /// Records discarded because `intr_latency` went negative after
    /// subtracting `ai_overhead` (§3 invariant 4).
    pub discarded_latency: u64,
    /// PING records emitted on the POLL (`req_cstate == 0`) path.
    pub pings_emitted: u64,
}

/// Returns whether the launch-time window invariant holds: the timer must
/// have fired strictly between `before_idle` and `after_idle` (§3
/// invariant 2).
fn window_ok(tbi: u64, ltime: u64, tai: u64) -> bool {
    tbi < ltime && ltime < tai
}

/// Returns whether exactly one arm is outstanding against the wakes
/// observed so far (§3 invariant 3).
fn arm_accounting_ok(events_armed: u64, events_happened: u64) -> bool {
    events_armed.wrapping_sub(events_happened) == 1
}

/// `intr_latency = tintr - ltime - ai_overhead` (§3), or `None` if that goes
/// negative (§3 invariant 4).
fn intr_latency_ns(tintr: u64, ltime: u64, ai_overhead: u64) -> Option<u64> {
    let raw = tintr as i64 - ltime as i64 - ai_overhead as i64;
    (raw >= 0).then_some(raw as u64)
}

/// The idle tracer itself, generic over [`Clock`] so tests can inject a
/// fake one (§8, "TSC read failure").
pub struct IdleTracer<C: Clock = SystemClock> {
    clock: C,
    csb: CStateBank,
    smi_nmi: SmiNmiCounter,
    state: EngineState,
    events_armed: u64,
    events_happened: u64,
    diagnostics: Diagnostics,
    /// Set whenever the in-flight cycle concludes — by emission (`Data` or
    /// `Ping`) or by any discard — and cleared by
    /// [`take_rearm_needed`][Self::take_rearm_needed]. The HRT source is
    /// one-shot (§4.3), so every conclusion, not only an emitted record,
    /// must re-arm it or the engine starves after the first cycle (§9's
    /// mandatory first-record discard).
    rearm_needed: bool,
}

/// Candidate locations of the tracing filesystem, newest first; ftrace mounts
/// at `/sys/kernel/tracing` on modern kernels and `/sys/kernel/debug/tracing`
/// on older ones where `debugfs` carries it instead.
const TRACEFS_ROOTS: &[&str] = &["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Resolves the `cpu_idle` tracepoint by name (§4.5, "Enable"). The actual
/// hook registration is the out-of-scope bridge's job (§1); this only
/// confirms the tracepoint this run depends on exists before anything is
/// armed.
fn resolve_cpu_idle_tracepoint() -> Result<(), SetupError> {
    let found = TRACEFS_ROOTS
        .iter()
        .any(|root| std::path::Path::new(root).join("events/power/cpu_idle").is_dir());
    found.then_some(()).ok_or(SetupError::TracepointNotFound)
}

impl IdleTracer<SystemClock> {
    /// Opens the C-state bank and SMI/NMI counters for `cpu` and wires them
    /// to the real clock.
    pub fn open(cpu: u32) -> Result<Self, SetupError> {
        resolve_cpu_idle_tracepoint()?;
        let csb = CStateBank::open(cpu)?;
        let smi_nmi = SmiNmiCounter::open(cpu).map_err(SetupError::CounterUnavailable)?;
        Ok(Self::new(SystemClock, csb, smi_nmi))
    }
}

impl<C: Clock> IdleTracer<C> {
    pub(crate) fn new(clock: C, csb: CStateBank, smi_nmi: SmiNmiCounter) -> Self {
        Self {
            clock,
            csb,
            smi_nmi,
            state: EngineState::default(),
            events_armed: 0,
            events_happened: 0,
            diagnostics: Diagnostics::default(),
            rearm_needed: false,
        }
    }

    /// C-states tracked, in wire order; needed by callers to encode records.
    pub fn cstates(&self) -> &'static [CStateDef] {
        self.csb.cstates()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Whether the in-flight cycle concluded since the last call — by
    /// emission or by any discard — and the delayed-event source should be
    /// re-armed. Consumes the flag (§4.5, "Steady state").
    pub fn take_rearm_needed(&mut self) -> bool {
        std::mem::take(&mut self.rearm_needed)
    }

    /// Called by the engine immediately after a successful
    /// `des.arm(ldist)` (§3 invariant 3).
    pub fn note_armed(&mut self, ldist: u64) {
        self.events_armed = self.events_armed.wrapping_add(1);
        self.state.ldist = ldist;
    }

    /// `before_idle(req_cstate)` (§4.4, step 1).
    pub fn before_idle(&mut self, des: &impl DelayedEventSource, req_cstate: u32) -> io::Result<()> {
        self.state.got_measurements = false;
        self.state.req_cstate = req_cstate;

        let (smi, nmi) = self.smi_nmi.read()?;
        self.state.smi_bi = smi;
        self.state.nmi_bi = nmi;
        self.csb.read_before()?;
        self.state.tbi = des.get_time_before_idle();
        self.state.tai = 0;
        self.state.tintr = 0;
        Ok(())
    }

    /// `after_idle()` (§4.4, step 2).
    ///
    /// On the POLL path (`req_cstate == 0`) this returns a [`Record::Ping`]
    /// as soon as the armed event is recognized, bypassing every other
    /// invariant check — POLL records carry no C-state or latency data
    /// (§4.4, §8 "POLL path ping"). Otherwise it runs the window and
    /// arm-accounting checks, computes C-state deltas, and returns a
    /// completed [`Record::Data`] if `interrupt` had already been delivered.
    pub fn after_idle(&mut self, des: &mut impl DelayedEventSource) -> io::Result<Option<Record>> {
        self.state.tai = des.get_time_after_idle();

        if self.state.req_cstate == 0 {
            if des.event_has_happened() {
                self.diagnostics.pings_emitted += 1;
                self.reset_for_next_cycle();
                return Ok(Some(Record::Ping));
            }
            self.state.tai = 0;
            return Ok(None);
        }

        let cyc1 = self.clock.read_tsc();

        if !des.event_has_happened() {
            // Spurious wake (§9, decided): clear `tai`, retain `tbi`, wait
            // for the next idle-exit. `before_idle` is not re-run.
            self.state.tai = 0;
            return Ok(None);
        }

        if !arm_accounting_ok(self.events_armed, self.events_happened) {
            self.events_happened = self.events_happened.wrapping_add(1);
            self.diagnostics.discarded_arm += 1;
            self.reset_for_next_cycle();
            return Ok(None);
        }
        self.events_happened = self.events_happened.wrapping_add(1);

        self.csb.read_after()?;
        let ltime = des.get_launch_time();
        self.state.ltime = ltime;

        if !window_ok(self.state.tbi, ltime, self.state.tai) {
            self.diagnostics.discarded_window += 1;
            self.reset_for_next_cycle();
            return Ok(None);
        }

        let (smi, nmi) = self.smi_nmi.read()?;
        self.state.smi_ai = smi;
        self.state.nmi_ai = nmi;

        // First record of a run: deltas would be computed against an
        // uninitialized `read_before` snapshot (§9, decided). Must be
        // checked before `compute_deltas` flips the bank's own init guard.
        let first_record = !self.csb.is_initialized();
        self.csb.compute_deltas();

        if first_record {
            self.diagnostics.discarded_first += 1;
            self.reset_for_next_cycle();
            return Ok(None);
        }

        let cyc2 = self.clock.read_tsc();
        let raw_cycles = cyc2.wrapping_sub(cyc1);
        self.state.ai_overhead = des.time_to_ns(raw_cycles).unwrap_or(raw_cycles);
        self.state.got_measurements = true;

        Ok(self.maybe_emit(des))
    }

    /// `interrupt(tintr)` (§4.4, step 3), delivered from the wake IRQ
    /// handler; may arrive before or after `after_idle` completes. A no-op
    /// on the POLL path, which never disables interrupts for this reason.
    pub fn interrupt(
        &mut self,
        des: &impl DelayedEventSource,
        tintr: u64,
    ) -> io::Result<Option<Record>> {
        if self.state.req_cstate == 0 {
            return Ok(None);
        }
        let (smi, nmi) = self.smi_nmi.read()?;
        self.state.tintr = tintr;
        self.state.smi_intr = smi;
        self.state.nmi_intr = nmi;
        Ok(self.maybe_emit(des))
    }

    fn maybe_emit(&mut self, des: &impl DelayedEventSource) -> Option<Record> {
        if !(self.state.got_measurements && self.state.tintr != 0) {
            return None;
        }

        let Some(intr_latency) =
            intr_latency_ns(self.state.tintr, self.state.ltime, self.state.ai_overhead)
        else {
            self.diagnostics.discarded_latency += 1;
            self.reset_for_next_cycle();
            return None;
        };

        let deltas = self.csb.deltas();
        let dp = Datapoint {
            silent_time: self.state.ltime.saturating_sub(self.state.tbi),
            wake_latency: self.state.tai.saturating_sub(self.state.ltime),
            intr_latency,
            ldist: self.state.ldist,
            req_cstate: self.state.req_cstate,
            tsc_cycles: deltas.tsc_cycles,
            mperf_cycles: deltas.mperf_cycles,
            cc_cycles: deltas.cc_cycles.clone(),
            smi_wake: self.state.smi_ai.saturating_sub(self.state.smi_bi),
            nmi_wake: self.state.nmi_ai.saturating_sub(self.state.nmi_bi),
            // §3: the delta between `before_idle` and `interrupt`, not
            // `after_idle` and `interrupt` — `interrupt` may arrive before
            // `after_idle` (§4.4), which would saturate this to 0 against
            // the later `*_ai` snapshot.
            smi_intr: self.state.smi_intr.saturating_sub(self.state.smi_bi),
            nmi_intr: self.state.nmi_intr.saturating_sub(self.state.nmi_bi),
            drv_fields: des.get_trace_data(),
        };
        self.reset_for_next_cycle();
        Some(Record::Data(dp))
    }

    /// Called at every conclusion of an in-flight cycle — emission or
    /// discard alike — which is exactly when the delayed-event source needs
    /// re-arming (§4.5), so it also raises [`rearm_needed`][Self::take_rearm_needed]
    /// here rather than at each call site individually.
    fn reset_for_next_cycle(&mut self) {
        self.state.tbi = 0;
        self.state.tai = 0;
        self.state.tintr = 0;
        self.state.ai_overhead = 0;
        self.state.got_measurements = false;
        self.rearm_needed = true;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn window_holds_only_when_ltime_is_strictly_between() {
        assert!(window_ok(100, 150, 200));
        assert!(!window_ok(100, 100, 200), "ltime == tbi must fail");
        assert!(!window_ok(100, 200, 200), "ltime == tai must fail");
        assert!(!window_ok(100, 50, 200), "ltime before tbi must fail");
        assert!(!window_ok(100, 250, 200), "ltime after tai must fail");
    }

    #[test]
    fn arm_accounting_requires_exactly_one_outstanding_arm() {
        assert!(arm_accounting_ok(1, 0));
        assert!(arm_accounting_ok(5, 4));
        assert!(!arm_accounting_ok(2, 0), "two arms, no wakes yet: not in sync");
        assert!(!arm_accounting_ok(1, 1), "no outstanding arm");
        assert!(!arm_accounting_ok(1, 2), "more wakes than arms");
    }

    #[test]
    fn intr_latency_subtracts_ai_overhead() {
        assert_eq!(intr_latency_ns(1_012_000, 1_000_000, 2_000), Some(10_000));
    }

    #[test]
    fn intr_latency_below_zero_is_discarded() {
        assert_eq!(intr_latency_ns(1_000_500, 1_000_000, 1_000), None);
    }
}
