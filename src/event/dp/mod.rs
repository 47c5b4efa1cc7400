use std::fs::File;
use std::io::{Error, Read, Result};
use std::path::Path;

use super::EventConfig;

/// Dynamic PMU event.
///
/// Used to address PMUs that are not covered by the fixed [`Hardware`][super::hw::Hardware]
/// and [`Software`][super::sw::Software] event sets, such as the per-package `cstate_pkg`
/// and per-core `cstate_core` residency counters consulted by the C-state counter bank.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DynamicPmu {
    /// The type value to use can be found in the sysfs filesystem: there is a subdirectory per
    /// PMU instance under `/sys/bus/event_source/devices`. In each subdirectory there is a
    /// type file whose content is an integer that can be used in the this field.
    ///
    /// For instance, `/sys/bus/event_source/devices/cstate_core/type` contains the value
    /// used to address the per-core C-state residency PMU.
    pub ty: u32,
    /// Event config. For `cstate_core`/`cstate_pkg` this selects the residency counter,
    /// e.g. the value found in `/sys/bus/event_source/devices/cstate_core/events/c1-residency`.
    pub config: u64,
    /// Event config1.
    pub config1: u64,
    /// Event config2.
    pub config2: u64,
    /// Event config3.
    pub config3: u64,
}

impl DynamicPmu {
    /// Resolves the `type` value of a dynamic PMU from its sysfs directory,
    /// e.g. `/sys/bus/event_source/devices/cstate_core`.
    pub fn resolve_type<P: AsRef<Path>>(pmu_dir: P) -> Result<u32> {
        get_type(pmu_dir.as_ref().join("type"))
    }

    /// Resolves a named event's `config` value from its sysfs event file,
    /// e.g. `/sys/bus/event_source/devices/cstate_core/events/c1-residency`, which contains
    /// a string such as `event=0x01`.
    pub fn resolve_config<P: AsRef<Path>>(event_file: P) -> Result<u64> {
        let raw = std::fs::read_to_string(event_file)?;
        let raw = raw.trim();
        let hex = raw
            .strip_prefix("event=0x")
            .ok_or_else(|| Error::other(format!("unexpected event config format: {raw}")))?;
        u64::from_str_radix(hex, 16).map_err(Error::other)
    }
}

fn get_type<P>(path: P) -> Result<u32>
where
    P: AsRef<Path>,
{
    let mut file = File::open(path)?;

    let mut acc = Vec::with_capacity(1);
    let mut buf = [0];
    while file.read(&mut buf)? > 0 {
        if buf[0] == b'\n' {
            break;
        }
        acc.extend(buf);
    }
    let bit = unsafe { std::str::from_utf8_unchecked(&acc) };

    bit.parse::<u32>().map_err(Error::other)
}

super::try_from!(DynamicPmu, value, {
    let event_cfg = EventConfig {
        ty: value.ty,
        config: value.config,
        config1: value.config1,
        config2: value.config2,
        config3: value.config3,
        bp_type: 0,
    };
    Ok(Self(event_cfg))
});
