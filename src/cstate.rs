//! C-state counter bank (CSB, §4.2).
//!
//! Enumerates the C-states a CPU family/model supports, opens one counter
//! per C-state (plus TSC and MPERF, which always occupy slots 0 and 1) and
//! groups them with [`CounterGroup`] so the whole bank is scheduled onto the
//! target CPU atomically — a single leader read yields a self-consistent
//! snapshot of every counter in the bank.

use std::io;

use crate::config::{Cpu, Opts, Proc};
use crate::count::group::CounterGroup;
use crate::count::Counter;
use crate::error::SetupError;
use crate::event::dp::DynamicPmu;
use crate::event::hw::Hardware;

/// One C-state tracked by the bank, in the fixed enumeration order the bank
/// yields cycles in across every datapoint of a run.
#[derive(Clone, Copy, Debug)]
pub struct CStateDef {
    /// Name used in the wire record (`CxCyc`), e.g. `"C6"`.
    pub name: &'static str,
    /// OS-visible C-state index, matched against `req_cstate`.
    pub index: u32,
    /// `cstate_core` sysfs event file name, e.g. `"c6-residency"`.
    event: &'static str,
}

/// Static table keyed by `(family, model)`, mirroring how the kernel driver
/// keys its per-model MSR tables. Not exhaustive; covers the common Intel
/// client/server families this engine was built against.
const CSTATE_TABLES: &[(u8, &[u8], &[CStateDef])] = &[(
    0x06,
    &[0x8E, 0x9E, 0xA5, 0xA6, 0x97, 0xBA, 0xCF, 0x8F, 0xCF],
    &[
        CStateDef { name: "C1", index: 1, event: "c1-residency" },
        CStateDef { name: "C1E", index: 2, event: "c1e-residency" },
        CStateDef { name: "C3", index: 3, event: "c3-residency" },
        CStateDef { name: "C6", index: 4, event: "c6-residency" },
        CStateDef { name: "C7", index: 5, event: "c7-residency" },
    ],
)];

fn cstates_for(family: u8, model: u8) -> Option<&'static [CStateDef]> {
    CSTATE_TABLES
        .iter()
        .find(|(f, models, _)| *f == family && models.contains(&model))
        .map(|(_, _, cstates)| *cstates)
}

/// Family/model read from `/proc/cpuinfo`.
fn detect_cpu_model() -> Result<(u8, u8), SetupError> {
    let text = std::fs::read_to_string("/proc/cpuinfo")
        .map_err(SetupError::CounterUnavailable)?;

    let field = |key: &str| -> Option<u8> {
        text.lines()
            .find(|line| line.trim_start().starts_with(key))
            .and_then(|line| line.split(':').nth(1))
            .and_then(|v| v.trim().parse::<u8>().ok())
    };

    let family = field("cpu family").ok_or_else(|| {
        SetupError::CounterUnavailable(io::Error::other("cpu family not found in /proc/cpuinfo"))
    })?;
    let model = field("model").ok_or_else(|| {
        SetupError::CounterUnavailable(io::Error::other("model not found in /proc/cpuinfo"))
    })?;
    Ok((family, model))
}

/// Per-counter deltas for one datapoint, slots 0/1 fixed to TSC/MPERF
/// followed by one entry per [`CStateDef`] in enumeration order.
#[derive(Clone, Debug, Default)]
pub struct Deltas {
    pub tsc_cycles: u64,
    pub mperf_cycles: u64,
    pub cc_cycles: Vec<u64>,
}

/// The counter bank itself.
pub struct CStateBank {
    cstates: &'static [CStateDef],
    group: CounterGroup,
    before: Vec<u64>,
    after: Vec<u64>,
    deltas: Deltas,
    /// Set once a `read_before`/`read_after` pair has completed; guards the
    /// first-record discard decided in §9's Open Questions.
    initialized: bool,
}

impl CStateBank {
    /// Detects the CPU model, opens TSC/MPERF/per-C-state counters grouped
    /// onto `cpu` and enables the group. Fails with [`SetupError`] if the
    /// model is unsupported or a counter cannot be opened.
    pub fn open(cpu: u32) -> Result<Self, SetupError> {
        let (family, model) = detect_cpu_model()?;
        let cstates =
            cstates_for(family, model).ok_or(SetupError::UnsupportedCpu { family, model })?;

        let target = (Proc::ALL, Cpu(cpu));
        let mut opts = Opts::default();
        opts.stat_format.siblings = true;
        opts.stat_format.id = false;
        opts.enable = false; // Enabled explicitly below, once the group is complete.

        // Slot 0: TSC, via the architectural `REF_CPU_CYCLES` hardware event
        // (runs at the TSC rate, unlike `CPU_CYCLES` which tracks the core's
        // dynamic frequency).
        let tsc = Counter::new(Hardware::RefCpuCycle, target, opts.clone())
            .map_err(SetupError::CounterUnavailable)?;
        let mut group = CounterGroup::from(tsc);

        // Slot 1: MPERF, via the `msr` dynamic PMU.
        let msr_ty = DynamicPmu::resolve_type("/sys/bus/event_source/devices/msr")
            .map_err(SetupError::CounterUnavailable)?;
        group
            .add(
                DynamicPmu { ty: msr_ty, config: 0x1, config1: 0, config2: 0, config3: 0 },
                &opts,
            )
            .map_err(SetupError::CounterUnavailable)?;

        // Slots 2..: one per tracked C-state, via `cstate_core`.
        let cstate_dir = "/sys/bus/event_source/devices/cstate_core";
        let cstate_ty =
            DynamicPmu::resolve_type(cstate_dir).map_err(SetupError::CounterUnavailable)?;
        for def in cstates {
            let event_path = format!("{cstate_dir}/events/{}", def.event);
            let config =
                DynamicPmu::resolve_config(&event_path).map_err(SetupError::CounterUnavailable)?;
            group
                .add(
                    DynamicPmu { ty: cstate_ty, config, config1: 0, config2: 0, config3: 0 },
                    &opts,
                )
                .map_err(SetupError::CounterUnavailable)?;
        }

        group.enable().map_err(SetupError::CounterUnavailable)?;

        let slots = cstates.len() + 2;
        Ok(Self {
            cstates,
            group,
            before: vec![0; slots],
            after: vec![0; slots],
            deltas: Deltas::default(),
            initialized: false,
        })
    }

    /// C-states tracked by this bank, in wire order.
    pub fn cstates(&self) -> &'static [CStateDef] {
        self.cstates
    }

    fn snapshot(&self) -> io::Result<Vec<u64>> {
        let stat = self.group.leader().stat()?;
        let mut values = Vec::with_capacity(1 + stat.siblings.len());
        values.push(stat.count);
        values.extend(stat.siblings.iter().map(|s| s.count));
        Ok(values)
    }

    /// `CSB.read_before()`, called from `before_idle`.
    pub fn read_before(&mut self) -> io::Result<()> {
        self.before = self.snapshot()?;
        Ok(())
    }

    /// `CSB.read_after()`, called from `after_idle`.
    pub fn read_after(&mut self) -> io::Result<()> {
        self.after = self.snapshot()?;
        Ok(())
    }

    /// `CSB.compute_deltas()`. The first call (no prior `read_before` taken
    /// against an already-initialized bank) still computes a delta against
    /// whatever was last snapshotted; the tracer is responsible for
    /// discarding that first record per §9.
    pub fn compute_deltas(&mut self) -> &Deltas {
        let tsc_cycles = self.after[0].wrapping_sub(self.before[0]);
        let mperf_cycles = self.after[1].wrapping_sub(self.before[1]);
        let cc_cycles = (0..self.cstates.len())
            .map(|i| self.after[2 + i].wrapping_sub(self.before[2 + i]))
            .collect();
        self.deltas = Deltas { tsc_cycles, mperf_cycles, cc_cycles };
        self.initialized = true;
        &self.deltas
    }

    /// Whether at least one `compute_deltas` has completed; gates the
    /// first-record discard in [`crate::tracer`].
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn deltas(&self) -> &Deltas {
        &self.deltas
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cstates_for_known_family_model_is_ordered_by_index() {
        let cstates = cstates_for(0x06, 0x8E).expect("known family/model");
        let indices: Vec<_> = cstates.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn cstates_for_unknown_model_is_none() {
        assert!(cstates_for(0x06, 0xFF).is_none());
    }
}
