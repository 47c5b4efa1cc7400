//! Data model (§3) and the two wire encodings (§6).
//!
//! [`Datapoint`] is the immutable record the idle tracer emits once every
//! invariant in §3 holds; [`Record`] additionally carries the distinguished
//! `PING` marker used to kick user-space out of a POLL wait (§4.4).

use std::fmt::Write as _;
use std::io;

/// Immutable measurement emitted to the consumer. Field semantics per §3.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Datapoint {
    pub silent_time: u64,
    pub wake_latency: u64,
    pub intr_latency: u64,
    pub ldist: u64,
    pub req_cstate: u32,
    pub tsc_cycles: u64,
    pub mperf_cycles: u64,
    /// Per-C-state cycle deltas, ordered by C-state index.
    pub cc_cycles: Vec<u64>,
    pub smi_wake: u64,
    pub nmi_wake: u64,
    pub smi_intr: u64,
    pub nmi_intr: u64,
    /// Ordered driver-specific `(name, value)` pairs (§3, §6).
    pub drv_fields: Vec<(&'static str, u64)>,
}

/// One entry published to the [`crate::ring::EventRing`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Record {
    Data(Datapoint),
    /// Zero-data marker forcing the consumer to wake the CPU out of POLL
    /// (§4.4). Never carries `req_cstate == 0` datapoint fields.
    Ping,
}

/// Common field names shared by both encodings, in order, before the
/// per-C-state and driver-specific fields (§6).
const COMMON_FIELDS: &[&str] = &[
    "SilentTime",
    "WakeLatency",
    "IntrLatency",
    "LDist",
    "ReqCState",
];

/// Which wire encoding a run uses; selected once at `Engine::enable` and
/// otherwise agnostic to the rest of the engine (§9, "Compat branching").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// `trace_printk` fallback: one formatted `key=value` line per record.
    TracePrintk,
    /// Typed synthetic event with the same field set under different names.
    SyntheticEvent,
}

impl Encoding {
    /// Encodes `dp` into `buf` and returns the number of bytes written.
    /// Returns `InvalidInput` if `buf` is too small, without emitting
    /// anything (§7, "Buffer too small").
    pub fn encode(&self, dp: &Datapoint, cstate_names: &[&str], buf: &mut [u8]) -> io::Result<usize> {
        let line = match self {
            Encoding::TracePrintk => encode_trace_printk(dp, cstate_names),
            Encoding::SyntheticEvent => encode_synthetic_event(dp, cstate_names),
        };
        if line.len() > buf.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "encoded record exceeds buffer"));
        }
        buf[..line.len()].copy_from_slice(line.as_bytes());
        Ok(line.len())
    }
}

fn encode_trace_printk(dp: &Datapoint, cstate_names: &[&str]) -> String {
    let mut out = String::new();
    let values: [(&str, u64); 11] = [
        ("SilentTime", dp.silent_time),
        ("WakeLatency", dp.wake_latency),
        ("IntrLatency", dp.intr_latency),
        ("LDist", dp.ldist),
        ("ReqCState", dp.req_cstate as u64),
        ("TSC", dp.tsc_cycles),
        ("MPERF", dp.mperf_cycles),
        ("SMIWake", dp.smi_wake),
        ("NMIWake", dp.nmi_wake),
        ("SMIIntr", dp.smi_intr),
        ("NMIIntr", dp.nmi_intr),
    ];
    for (name, value) in values {
        let _ = write!(out, "{name}={value} ");
    }
    for (name, cycles) in cstate_names.iter().zip(&dp.cc_cycles) {
        let _ = write!(out, "{name}Cyc={cycles} ");
    }
    for (name, value) in &dp.drv_fields {
        let _ = write!(out, "{name}={value} ");
    }
    out.truncate(out.trim_end().len());
    out
}

fn encode_synthetic_event(dp: &Datapoint, cstate_names: &[&str]) -> String {
    let tot_cyc = dp.tsc_cycles;
    let cc0_cyc = dp.cc_cycles.first().copied().unwrap_or(0);
    let mut out = format!(
        "SilentTime={} WakeLatency={} IntrLatency={} LDist={} ReqCState={} TotCyc={} CC0Cyc={} \
         SMIWake={} NMIWake={} SMIIntr={} NMIIntr={}",
        dp.silent_time,
        dp.wake_latency,
        dp.intr_latency,
        dp.ldist,
        dp.req_cstate,
        tot_cyc,
        cc0_cyc,
        dp.smi_wake,
        dp.nmi_wake,
        dp.smi_intr,
        dp.nmi_intr,
    );
    for (name, cycles) in cstate_names.iter().zip(&dp.cc_cycles) {
        let _ = write!(out, " {name}Cyc={cycles}");
    }
    for (name, value) in &dp.drv_fields {
        let _ = write!(out, " {name}={value}");
    }
    out
}

/// Asserts [`COMMON_FIELDS`] stays in sync with the encoders above; used in
/// tests rather than at runtime, since the encoders build field names
/// directly (unrolling would add indirection for no benefit on the hot
/// path).
#[cfg(test)]
fn common_field_prefix(line: &str) -> Vec<&str> {
    line.split_whitespace()
        .take(COMMON_FIELDS.len())
        .map(|tok| tok.split('=').next().unwrap())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Datapoint {
        Datapoint {
            silent_time: 1_000_000,
            wake_latency: 12_000,
            intr_latency: 8_000,
            ldist: 1_012_000,
            req_cstate: 4,
            tsc_cycles: 3_000_000,
            mperf_cycles: 2_900_000,
            cc_cycles: vec![10, 20, 30, 900_000, 0],
            smi_wake: 0,
            nmi_wake: 0,
            smi_intr: 0,
            nmi_intr: 0,
            drv_fields: vec![("BICHelper", 7)],
        }
    }

    const CSTATES: &[&str] = &["C1", "C1E", "C3", "C6", "C7"];

    #[test]
    fn trace_printk_starts_with_common_fields_in_order() {
        let line = encode_trace_printk(&sample(), CSTATES);
        assert_eq!(
            common_field_prefix(&line),
            vec!["SilentTime", "WakeLatency", "IntrLatency", "LDist", "ReqCState"]
        );
        assert!(line.contains("C6Cyc=900000"));
        assert!(line.contains("BICHelper=7"));
    }

    #[test]
    fn synthetic_event_carries_totcyc_and_cc0cyc() {
        let line = encode_synthetic_event(&sample(), CSTATES);
        assert!(line.contains("TotCyc=3000000"));
        assert!(line.contains("CC0Cyc=10"));
        assert!(line.contains("C7Cyc=0"));
    }

    #[test]
    fn encode_into_too_small_buffer_is_invalid_input() {
        let mut buf = [0u8; 4];
        let err = Encoding::TracePrintk.encode(&sample(), CSTATES, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    /// Every field `sample()` sets appears in the encoded line with its
    /// exact value (§8's round-trip property, without a decoder to decode
    /// back through: decoding is the consumer's job, out of scope here, so
    /// this only checks the encoder loses nothing on the way out).
    #[test]
    fn synthetic_event_encodes_every_field_bit_exact() {
        let mut buf = [0u8; 512];
        let n = Encoding::SyntheticEvent.encode(&sample(), CSTATES, &mut buf).unwrap();
        let line = std::str::from_utf8(&buf[..n]).unwrap();
        for expected in [
            "SilentTime=1000000",
            "WakeLatency=12000",
            "IntrLatency=8000",
            "LDist=1012000",
            "ReqCState=4",
            "TotCyc=3000000",
            "CC0Cyc=10",
            "SMIWake=0",
            "NMIWake=0",
            "SMIIntr=0",
            "NMIIntr=0",
            "C1Cyc=10",
            "C1ECyc=20",
            "C3Cyc=30",
            "C6Cyc=900000",
            "C7Cyc=0",
            "BICHelper=7",
        ] {
            assert!(line.contains(expected), "missing {expected:?} in {line:?}");
        }
    }
}
