//! BPF-driven delayed-event source (§4.3, "BPF variant").
//!
//! Loads a precompiled kernel program (shipped as a separate build artifact
//! the way `aya`-based projects typically split a `-ebpf` crate from their
//! userspace loader; this crate ships only the loader half, consistent with
//! the host crate carrying no kernel-module code either) with three entry
//! points:
//!
//! - a `syscall` program that seeds `(min_t, max_t)` into a shared bounds map,
//! - a `cpu_idle` tracepoint that differentiates enter vs. exit
//!   (`PWR_EVENT_EXIT`) and drives the timer,
//! - a timer callback that re-arms and publishes events into a ring buffer.
//!
//! TSC and C-state counter reads happen on the kernel side through a
//! perf-event array indexed by counter id (slot 0 = TSC, slot 1 = MPERF,
//! per §4.2); the userspace side here only reads the shared state the
//! kernel program publishes.

use std::io::{Error, ErrorKind, Result};

use aya::maps::{Array, RingBuf};
use aya::programs::TracePoint;
use aya::Ebpf;
use rand::Rng;

use super::{DelayedEventSource, Variant};
use crate::clock::Clock;

/// Fixed layout of the shared state array the kernel program publishes,
/// indexed by these slots. Must match the kernel program's record layout
/// exactly (§9, "BPF / sandbox duality").
mod slot {
    pub const LTIME: u32 = 0;
    pub const HAPPENED: u32 = 1;
}

/// Default install location of the compiled kernel program, the way a
/// packaged `aya` consumer typically ships its companion `-ebpf` artifact
/// next to the loader instead of embedding it in the binary.
pub const DEFAULT_PROGRAM_PATH: &str = "/usr/lib/wult/wult.bpf.o";

pub struct Bpf {
    _ebpf: Ebpf,
    bounds: Array<aya::maps::MapData, u64>,
    state: Array<aya::maps::MapData, u64>,
    events: RingBuf<aya::maps::MapData>,
    rng: rand::rngs::ThreadRng,
    min_t: u64,
    max_t: u64,
    ltime: u64,
    events_seen: u64,
}

impl Bpf {
    /// Like [`DelayedEventSource::init`], but loads the kernel program from
    /// `program_path` instead of [`DEFAULT_PROGRAM_PATH`].
    pub fn init_with_program(cpu: u32, program_path: &str) -> Result<Self> {
        let mut ebpf = Ebpf::load_file(program_path).map_err(to_io_error)?;

        // Bridges the kernel program's `bpf_printk`-based warn channel
        // (§9, "BPF / sandbox duality") into the `log` facade, the same
        // channel every other recoverable failure in this crate logs
        // through.
        if let Err(err) = aya_log::EbpfLogger::init(&mut ebpf) {
            log::warn!("aya-log init failed, kernel-side warns will not surface: {err}");
        }

        let program: &mut TracePoint = ebpf
            .program_mut("cpu_idle")
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "cpu_idle program not found"))?
            .try_into()
            .map_err(to_io_error)?;
        program.load().map_err(to_io_error)?;
        program.attach("power", "cpu_idle").map_err(to_io_error)?;

        let bounds: Array<_, u64> = ebpf
            .take_map("BOUNDS")
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "BOUNDS map not found"))?
            .try_into()
            .map_err(to_io_error)?;
        let state: Array<_, u64> = ebpf
            .take_map("STATE")
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "STATE map not found"))?
            .try_into()
            .map_err(to_io_error)?;
        let events: RingBuf<_> = ebpf
            .take_map("EVENTS")
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "EVENTS map not found"))?
            .try_into()
            .map_err(to_io_error)?;

        // The tracepoint fires on whichever CPU is idle; pinning the
        // *reader* to `cpu` (not done here) is what keeps this source's
        // notion of "the" target CPU consistent with the engine's.
        let _ = cpu;

        Ok(Self {
            _ebpf: ebpf,
            bounds,
            state,
            events,
            rng: rand::thread_rng(),
            min_t: 1,
            max_t: 20_000_000,
            ltime: 0,
            events_seen: 0,
        })
    }

    /// Draws a uniform `ldist` in `[min_t, max_t)`, matching the BPF
    /// program's own draw so the engine's re-arm and the kernel's internal
    /// one stay statistically consistent (§4.3, §4.5).
    pub fn draw_ldist(&mut self, min_t: u64, max_t: u64) -> u64 {
        self.rng.gen_range(min_t..max_t)
    }
}

impl DelayedEventSource for Bpf {
    const LDIST_MIN: u64 = 1;
    const LDIST_MAX: u64 = 20_000_000;

    fn init(cpu: u32) -> Result<Self> {
        Self::init_with_program(cpu, DEFAULT_PROGRAM_PATH)
    }

    fn arm(&mut self, ldist: u64) -> Result<u64> {
        // The BPF timer callback draws its own `ldist` uniformly in
        // `[min_t, max_t)` once armed (§4.3); the `ldist` passed in here
        // narrows those bounds to a single-shot window so the engine's own
        // `uniform(min_t, max_t)` draw (§4.5) still governs observed
        // distances.
        self.min_t = ldist;
        self.max_t = ldist + 1;
        self.bounds.set(0, self.min_t, 0).map_err(to_io_error)?;
        self.bounds.set(1, self.max_t, 0).map_err(to_io_error)?;

        self.ltime = self.state.get(&slot::LTIME, 0).map_err(to_io_error)?;
        Ok(self.ltime)
    }

    fn event_has_happened(&mut self) -> bool {
        while self.events.next().is_some() {
            self.events_seen += 1;
        }
        self.state.get(&slot::HAPPENED, 0).unwrap_or(0) != 0
    }

    fn get_launch_time(&self) -> u64 {
        self.ltime
    }

    fn get_time_before_idle(&self) -> u64 {
        crate::clock::SystemClock.now_ns()
    }

    fn get_time_after_idle(&self) -> u64 {
        crate::clock::SystemClock.now_ns()
    }

    fn exit(&mut self) -> Result<()> {
        // Programs and maps are torn down when `_ebpf` drops.
        Ok(())
    }

    fn time_to_ns(&self, cycles: u64) -> Option<u64> {
        // TSC frequency is not known without a calibration pass; a real
        // driver reads it from `/sys/devices/system/cpu/cpu0/tsc_freq_khz`
        // or calibrates against `CLOCK_MONOTONIC`. Left unsupported here.
        let _ = cycles;
        None
    }

    fn get_trace_data(&self) -> Vec<(&'static str, u64)> {
        vec![("BPFSeq", self.events_seen)]
    }

    fn variant(&self) -> Variant {
        Variant::Bpf
    }
}

fn to_io_error<E: std::fmt::Display>(err: E) -> Error {
    Error::other(err.to_string())
}
