use std::io::Result;

use crate::ffi::bindings as b;

pub(super) mod attr;
mod target;

pub use target::*;

macro_rules! unsupported {
    () => {
        Err(std::io::ErrorKind::Unsupported)?
    };
    ($bool:expr) => {
        if $bool {
            Err(std::io::ErrorKind::Unsupported)?
        }
    };
}
pub(super) use unsupported;

/// Counter-opening options.
///
/// The C-state counter bank only ever opens counters in plain counting mode
/// (no sampling, no mmap ring), so this is a deliberately small subset of the
/// options `perf_event_open` exposes.
#[derive(Clone, Debug, Default)]
pub struct Opts {
    pub exclude: Priv,
    /// Counter starts disabled unless this is set; `Engine::enable` flips it on
    /// for every counter in the bank at once via [`count::group::CounterGroup::enable`][crate::count::group::CounterGroup::enable].
    pub enable: bool,
    /// Only schedule this counter if every counter in its group can be scheduled.
    pub only_group: bool,
    pub pin_on_pmu: bool,
    pub stat_format: StatFormat,
}

/// Privilege levels to exclude from the count.
#[derive(Clone, Debug, Default)]
pub struct Priv {
    /// User space.
    pub user: bool,

    /// Kernel space.
    pub kernel: bool,

    /// Hypervisor.
    pub hv: bool,

    /// Idle task.
    pub idle: bool,
}

/// Controls the format of [`Stat`][crate::count::Stat].
#[derive(Clone, Debug, Default)]
pub struct StatFormat {
    /// Contains the [event ID][crate::count::SiblingStat::id].
    pub id: bool,

    /// Contains the [enabled time][crate::count::Stat::time_enabled] of the counter.
    pub time_enabled: bool,

    /// Contains the [running time][crate::count::Stat::time_running] of the counter.
    pub time_running: bool,

    /// Contains [sibling event counts][crate::count::Stat::siblings], i.e. every other
    /// counter opened into the same group as this one.
    pub siblings: bool,
}

impl StatFormat {
    pub(crate) fn as_read_format(&self) -> Result<u64> {
        let mut val = 0;
        macro_rules! when {
            ($field:ident, $flag:ident) => {
                if self.$field {
                    val |= b::$flag;
                }
            };
        }
        when!(id, PERF_FORMAT_ID);
        when!(time_enabled, PERF_FORMAT_TOTAL_TIME_ENABLED);
        when!(time_running, PERF_FORMAT_TOTAL_TIME_RUNNING);
        when!(siblings, PERF_FORMAT_GROUP);
        Ok(val)
    }
}
