//! Engine loop (EL, §4.5).
//!
//! Coordinates the delayed-event source, idle tracer and event ring: primes
//! the first arm at [`Engine::enable`], re-arms with a fresh uniform
//! `ldist` whenever the idle tracer concludes an in-flight cycle — whether
//! by emitting a record or discarding one (§7) — and exposes the
//! idle-entry, idle-exit and interrupt hook points that a `cpu_idle`
//! tracepoint bridge (out of scope here, §1) drives.

use std::io;

use rand::Rng;

use crate::des::{DelayedEventSource, Variant};
use crate::error::SetupError;
use crate::record::Record;
use crate::ring::{EventRing, MIN_CAPACITY};
use crate::tracer::{Diagnostics, IdleTracer};

/// Configuration handed to [`Engine::enable`] (§6). Constructed by the
/// out-of-scope CLI layer; no parsing logic lives in this crate.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunParams {
    /// Smallest legal launch distance, ns.
    pub min_t: u64,
    /// Largest legal launch distance, ns (exclusive upper bound of the
    /// uniform draw).
    pub max_t: u64,
    pub cpu_num: u32,
    pub variant: Variant,
}

/// Hard ceiling shared by every [`DelayedEventSource`] variant (§4.3).
const LDIST_HARD_MAX: u64 = 20_000_000;

fn validate_bounds(min_t: u64, max_t: u64) -> Result<(), SetupError> {
    if min_t >= 1 && min_t < max_t && max_t <= LDIST_HARD_MAX {
        Ok(())
    } else {
        Err(SetupError::InvalidBounds { min_t, max_t })
    }
}

/// `cpu0` has no `online` sysfs knob (it can never be hot-unplugged), so a
/// missing file is treated as "online" rather than an error.
fn check_cpu_online(cpu: u32) -> Result<(), SetupError> {
    let path = format!("/sys/devices/system/cpu/cpu{cpu}/online");
    match std::fs::read_to_string(&path) {
        Ok(state) if state.trim() == "0" => Err(SetupError::CpuNotOnline(cpu)),
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SetupError::CounterUnavailable(err)),
    }
}

/// The engine loop, generic over the concrete [`DelayedEventSource`] so the
/// hot path never pays for dynamic dispatch (§9, "Polymorphic device").
pub struct Engine<D: DelayedEventSource> {
    des: D,
    tracer: IdleTracer,
    ring: EventRing,
    min_t: u64,
    max_t: u64,
    rng: rand::rngs::ThreadRng,
}

impl<D: DelayedEventSource> Engine<D> {
    /// Opens the C-state bank and SMI/NMI counters, initializes the
    /// delayed-event source on `params.cpu_num`, and primes the first arm
    /// (§4.5, "Enable").
    pub fn enable(params: RunParams) -> Result<Self, SetupError> {
        validate_bounds(params.min_t, params.max_t)?;
        check_cpu_online(params.cpu_num)?;

        let des = D::init(params.cpu_num).map_err(SetupError::CounterUnavailable)?;
        let tracer = IdleTracer::open(params.cpu_num)?;
        let ring = EventRing::new(MIN_CAPACITY);

        let mut engine = Self {
            des,
            tracer,
            ring,
            min_t: params.min_t,
            max_t: params.max_t,
            rng: rand::thread_rng(),
        };
        engine.kick_timer().map_err(SetupError::CounterUnavailable)?;
        Ok(engine)
    }

    /// Draws a fresh `ldist ∈ [min_t, max_t)` and arms the delayed-event
    /// source (§4.5, "Steady state"). Called once at `enable` and again
    /// whenever the idle tracer concludes an in-flight cycle, whether by
    /// emitting a record or discarding one; an arm failure is reported to
    /// the caller without stamping `ltime`, per §7's "Arm failure" handling.
    pub fn kick_timer(&mut self) -> io::Result<()> {
        let ldist = self.rng.gen_range(self.min_t..self.max_t);
        match self.des.arm(ldist) {
            Ok(_ltime) => {
                self.tracer.note_armed(ldist);
                Ok(())
            }
            Err(err) => {
                log::warn!("DES.arm({ldist}) failed: {err}; will retry on next tick");
                Err(err)
            }
        }
    }

    /// Idle-entry notification (§4.4, step 1).
    pub fn on_idle_enter(&mut self, req_cstate: u32) -> io::Result<()> {
        self.tracer.before_idle(&self.des, req_cstate)
    }

    /// Idle-exit notification (§4.4, step 2). Publishes a completed record
    /// if one was produced, then re-arms if the cycle concluded — which
    /// includes every discard path (window violation, arm-accounting
    /// mismatch, the mandatory first-record discard), not only an emitted
    /// record: the HRT source is one-shot (§4.3), so a discard that never
    /// re-arms starves the engine permanently.
    pub fn on_idle_exit(&mut self) -> io::Result<()> {
        let record = self.tracer.after_idle(&mut self.des)?;
        if let Some(record) = record {
            self.publish(record);
        }
        self.rearm_if_concluded();
        Ok(())
    }

    /// Wake-interrupt notification (§4.4, step 3); may arrive before or
    /// after [`on_idle_exit`][Self::on_idle_exit]. Re-arms on conclusion,
    /// same as `on_idle_exit`.
    pub fn on_interrupt(&mut self, tintr: u64) -> io::Result<()> {
        let record = self.tracer.interrupt(&self.des, tintr)?;
        if let Some(record) = record {
            self.publish(record);
        }
        self.rearm_if_concluded();
        Ok(())
    }

    fn publish(&mut self, record: Record) {
        if !self.ring.push(record) {
            log::warn!("event ring full ({} slots); dropping record", self.ring.capacity());
        }
    }

    /// Re-arms if the idle tracer's in-flight cycle concluded since the
    /// last check (§4.5, "Steady state"), whether it concluded by emitting
    /// a record or by discarding one.
    fn rearm_if_concluded(&mut self) {
        if self.tracer.take_rearm_needed() {
            if let Err(err) = self.kick_timer() {
                log::warn!("re-arm after cycle conclusion failed: {err}");
            }
        }
    }

    /// Pops the oldest unread record, or `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<Record> {
        self.ring.pop()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.tracer.diagnostics()
    }

    /// Records dropped to date because the ring was full (§7).
    pub fn ring_drops(&self) -> usize {
        self.ring.drops()
    }

    /// C-states tracked, in wire order; needed by callers to encode records.
    pub fn cstates(&self) -> &'static [crate::cstate::CStateDef] {
        self.tracer.cstates()
    }

    pub fn variant(&self) -> Variant {
        self.des.variant()
    }

    /// Unregisters the tracepoint, cancels the armed timer and waits for
    /// quiescence (§4.5, "Disable"). Consumes the engine: a later `enable`
    /// starts fresh, leaving no in-flight arm (§8, "Disable/enable cycle").
    pub fn disable(mut self) -> io::Result<()> {
        self.des.exit()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounds_within_the_hard_ceiling_are_accepted() {
        assert!(validate_bounds(1, 20_000_000).is_ok());
        assert!(validate_bounds(500_000, 1_000_000).is_ok());
    }

    #[test]
    fn zero_min_t_is_rejected() {
        assert!(matches!(
            validate_bounds(0, 1_000),
            Err(SetupError::InvalidBounds { min_t: 0, max_t: 1_000 })
        ));
    }

    #[test]
    fn min_t_not_less_than_max_t_is_rejected() {
        assert!(validate_bounds(1_000, 1_000).is_err());
        assert!(validate_bounds(2_000, 1_000).is_err());
    }

    #[test]
    fn max_t_above_hard_ceiling_is_rejected() {
        assert!(validate_bounds(1, 20_000_001).is_err());
    }

    #[test]
    fn missing_online_knob_is_treated_as_online() {
        // No machine has this many CPUs, so the `online` file is always
        // absent here; cpu0 hits the same fallback since it has no knob.
        assert!(check_cpu_online(999_999).is_ok());
    }
}
