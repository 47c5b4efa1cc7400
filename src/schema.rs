//! Turbostat input schema (§6), fixed here purely to type the boundary with
//! the statistics collector. This module is intentionally logic-free: no
//! turbostat invocation, parsing, or reprocessing lives in this crate (§1,
//! Out of scope) — it only catalogs the columns a collaborator is expected
//! to recognize, the way the host crate's `config`/`event` modules catalog
//! `perf_event_open`'s ABI without implementing a perf front-end.

/// Value type of a catalogued turbostat column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnType {
    Integer,
    Float,
    Percent,
}

/// Whether a collector should drop a row lacking this column, or treat a
/// missing value as zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DropEmptyPolicy {
    DropRow,
    TreatAsZero,
}

/// Catalog entry for one turbostat column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TurbostatColumn {
    pub title: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub short_unit: &'static str,
    pub ty: ColumnType,
    pub drop_empty: DropEmptyPolicy,
}

macro_rules! column {
    ($title:expr, $description:expr, $unit:expr, $short_unit:expr, $ty:expr, $drop_empty:expr) => {
        TurbostatColumn {
            title: $title,
            description: $description,
            unit: $unit,
            short_unit: $short_unit,
            ty: $ty,
            drop_empty: $drop_empty,
        }
    };
}

/// Columns recognized from turbostat output, in no particular order (§6).
pub const TURBOSTAT_COLUMNS: &[TurbostatColumn] = &[
    column!("Busy%", "Percentage of time the CPU spent in C0", "%", "%", ColumnType::Percent, DropEmptyPolicy::TreatAsZero),
    column!("Bzy_MHz", "Average frequency while in C0", "MHz", "MHz", ColumnType::Float, DropEmptyPolicy::DropRow),
    column!("Avg_MHz", "Average frequency across all states", "MHz", "MHz", ColumnType::Float, DropEmptyPolicy::DropRow),
    column!("UncMHz", "Uncore frequency", "MHz", "MHz", ColumnType::Float, DropEmptyPolicy::TreatAsZero),
    column!("Pkg%pcx", "Package C-state residency percentage", "%", "%", ColumnType::Percent, DropEmptyPolicy::TreatAsZero),
    column!("CPU%cx", "Core C-state residency percentage", "%", "%", ColumnType::Percent, DropEmptyPolicy::TreatAsZero),
    column!("Cx%", "Generic C-state residency percentage", "%", "%", ColumnType::Percent, DropEmptyPolicy::TreatAsZero),
    column!("CorWatt", "Core power", "watt", "W", ColumnType::Float, DropEmptyPolicy::TreatAsZero),
    column!("PkgWatt", "Package power", "watt", "W", ColumnType::Float, DropEmptyPolicy::TreatAsZero),
    column!("GFXWatt", "Integrated GPU power", "watt", "W", ColumnType::Float, DropEmptyPolicy::TreatAsZero),
    column!("CoreTmp", "Core temperature", "degrees Celsius", "C", ColumnType::Integer, DropEmptyPolicy::TreatAsZero),
    column!("PkgTmp", "Package temperature", "degrees Celsius", "C", ColumnType::Integer, DropEmptyPolicy::TreatAsZero),
    column!("IRQ", "Interrupt count", "count", "", ColumnType::Integer, DropEmptyPolicy::TreatAsZero),
    column!("SMI", "System management interrupt count", "count", "", ColumnType::Integer, DropEmptyPolicy::TreatAsZero),
    column!("IPC", "Instructions retired per cycle", "instructions/cycle", "", ColumnType::Float, DropEmptyPolicy::TreatAsZero),
    column!("Time_Of_Day_Seconds", "Wall-clock timestamp of the row", "seconds", "s", ColumnType::Float, DropEmptyPolicy::DropRow),
];

/// Looks up a column by its turbostat title, e.g. `"PkgWatt"`.
pub fn lookup(title: &str) -> Option<&'static TurbostatColumn> {
    TURBOSTAT_COLUMNS.iter().find(|c| c.title == title)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_documented_column_is_catalogued() {
        for title in [
            "Busy%", "Bzy_MHz", "Avg_MHz", "UncMHz", "Pkg%pcx", "CPU%cx", "Cx%", "CorWatt",
            "PkgWatt", "GFXWatt", "CoreTmp", "PkgTmp", "IRQ", "SMI", "IPC", "Time_Of_Day_Seconds",
        ] {
            assert!(lookup(title).is_some(), "missing column: {title}");
        }
    }

    #[test]
    fn unknown_column_is_none() {
        assert!(lookup("NotAColumn").is_none());
    }
}
