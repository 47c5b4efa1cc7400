//! SMI/NMI counters (§3, §4.4), read at all three idle-tracer sample
//! points (`before_idle`, `after_idle`, `interrupt`).

use std::io;

use crate::config::{Cpu, Opts, Proc};
use crate::count::Counter;
use crate::event::raw::Raw;

/// System-management-interrupt count, read via the per-core raw MSR
/// `0x34` (`MSR_SMI_COUNT`) the same way [`crate::cstate::CStateBank`]
/// reads TSC/MPERF, plus the machine-wide NMI total.
pub struct SmiNmiCounter {
    smi: Counter,
}

impl SmiNmiCounter {
    pub fn open(cpu: u32) -> io::Result<Self> {
        let target = (Proc::ALL, Cpu(cpu));
        let mut opts = Opts::default();
        opts.enable = true;
        let smi = Counter::new(
            Raw { config: 0x34, config1: 0, config2: 0, config3: 0 },
            target,
            opts,
        )?;
        Ok(Self { smi })
    }

    /// Returns `(smi_count, nmi_count)`. NMIs have no convenient per-core
    /// MSR on most platforms, so the total is read from the `NMI:` row of
    /// `/proc/interrupts`, summed across CPUs.
    pub fn read(&self) -> io::Result<(u64, u64)> {
        let smi = self.smi.stat()?.count;
        let nmi = read_nmi_total()?;
        Ok((smi, nmi))
    }
}

fn read_nmi_total() -> io::Result<u64> {
    let text = std::fs::read_to_string("/proc/interrupts")?;
    let line = text
        .lines()
        .find(|l| l.trim_start().starts_with("NMI:"))
        .ok_or_else(|| io::Error::other("NMI row not found in /proc/interrupts"))?;
    Ok(line.split_whitespace().skip(1).filter_map(|tok| tok.parse::<u64>().ok()).sum())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nmi_row_parses_per_cpu_counts() {
        let text = "           CPU0       CPU1\nNMI:          3          5   Non-maskable interrupts\n";
        let line = text.lines().find(|l| l.trim_start().starts_with("NMI:")).unwrap();
        let total: u64 = line.split_whitespace().skip(1).filter_map(|t| t.parse::<u64>().ok()).sum();
        assert_eq!(total, 8);
    }
}
