//! Wake-up latency measurement engine for hardware idle states.
//!
//! Arms a delayed wake event a chosen `ldist` nanoseconds out, lets the
//! target CPU enter an idle C-state, and on wake correlates timestamps with
//! TSC/MPERF/C-state counters and SMI/NMI counts to derive silent time,
//! wake latency and interrupt latency for each cycle.
//!
//! ## Example
//!
//! Run with the high-resolution-timer delayed-event source on CPU 0,
//! draining whatever records a `cpu_idle` tracepoint bridge (not part of
//! this crate) has fed into the engine:
//!
//! ```rust,no_run
//! use wult_engine::des::hrt::Hrt;
//! use wult_engine::des::Variant;
//! use wult_engine::engine::{Engine, RunParams};
//! use wult_engine::record::Record;
//!
//! let params = RunParams { min_t: 1_000, max_t: 10_000_000, cpu_num: 0, variant: Variant::Hrt };
//! let mut engine = Engine::<Hrt>::enable(params).unwrap();
//!
//! // A tracepoint bridge would drive these from the kernel's `cpu_idle`
//! // notifications; shown here as a single manual cycle.
//! engine.on_idle_enter(4).unwrap();
//! engine.on_idle_exit().unwrap();
//! engine.on_interrupt(123).unwrap();
//!
//! while let Some(record) = engine.pop() {
//!     match record {
//!         Record::Data(dp) => println!("silent_time={}ns", dp.silent_time),
//!         Record::Ping => println!("ping"),
//!     }
//! }
//! ```
//!
//! ## Kernel compatibility
//!
//! Any Linux kernel since 4.0 is supported by the underlying counter layer.

pub mod clock;
pub mod config;
pub mod count;
pub mod cstate;
pub mod des;
pub mod engine;
mod error;
pub mod event;
mod ffi;
pub mod record;
pub mod ring;
pub mod schema;
mod smi;
pub mod tracer;

pub use error::SetupError;
