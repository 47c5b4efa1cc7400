//! Hand-authored subset of `linux/perf_event.h` needed to open counting-mode
//! events. Unlike the full wrapper this crate is derived from, there is no
//! per-kernel-version bindgen matrix here: the engine only ever uses the
//! stable counting subset of the `perf_event_open` ABI (no sampling, no mmap
//! ring, no breakpoint events), so a single fixed layout covering every
//! kernel since 4.0 is enough and is hand-maintained instead of generated.
#![allow(non_camel_case_types)]

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_TRACEPOINT: u32 = 2;
pub const PERF_TYPE_RAW: u32 = 4;

pub const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
pub const PERF_COUNT_HW_INSTRUCTIONS: u64 = 1;
pub const PERF_COUNT_HW_CACHE_REFERENCES: u64 = 2;
pub const PERF_COUNT_HW_CACHE_MISSES: u64 = 3;
pub const PERF_COUNT_HW_BRANCH_INSTRUCTIONS: u64 = 4;
pub const PERF_COUNT_HW_BRANCH_MISSES: u64 = 5;
pub const PERF_COUNT_HW_BUS_CYCLES: u64 = 6;
pub const PERF_COUNT_HW_STALLED_CYCLES_FRONTEND: u64 = 7;
pub const PERF_COUNT_HW_STALLED_CYCLES_BACKEND: u64 = 8;
pub const PERF_COUNT_HW_REF_CPU_CYCLES: u64 = 9;

pub const PERF_TYPE_HW_CACHE: u32 = 3;

pub const PERF_COUNT_HW_CACHE_L1D: u64 = 0;
pub const PERF_COUNT_HW_CACHE_L1I: u64 = 1;
pub const PERF_COUNT_HW_CACHE_LL: u64 = 2;
pub const PERF_COUNT_HW_CACHE_DTLB: u64 = 3;
pub const PERF_COUNT_HW_CACHE_ITLB: u64 = 4;
pub const PERF_COUNT_HW_CACHE_BPU: u64 = 5;
pub const PERF_COUNT_HW_CACHE_NODE: u64 = 6;

pub const PERF_COUNT_HW_CACHE_OP_READ: u64 = 0;
pub const PERF_COUNT_HW_CACHE_OP_WRITE: u64 = 1;
pub const PERF_COUNT_HW_CACHE_OP_PREFETCH: u64 = 2;

pub const PERF_COUNT_HW_CACHE_RESULT_ACCESS: u64 = 0;
pub const PERF_COUNT_HW_CACHE_RESULT_MISS: u64 = 1;

pub const PERF_COUNT_SW_CPU_CLOCK: u64 = 0;
pub const PERF_COUNT_SW_TASK_CLOCK: u64 = 1;
pub const PERF_COUNT_SW_PAGE_FAULTS: u64 = 2;
pub const PERF_COUNT_SW_CONTEXT_SWITCHES: u64 = 3;
pub const PERF_COUNT_SW_CPU_MIGRATIONS: u64 = 4;
pub const PERF_COUNT_SW_PAGE_FAULTS_MIN: u64 = 5;
pub const PERF_COUNT_SW_PAGE_FAULTS_MAJ: u64 = 6;
pub const PERF_COUNT_SW_ALIGNMENT_FAULTS: u64 = 7;
pub const PERF_COUNT_SW_EMULATION_FAULTS: u64 = 8;
pub const PERF_COUNT_SW_DUMMY: u64 = 9;
pub const PERF_COUNT_SW_BPF_OUTPUT: u64 = 10;
pub const PERF_COUNT_SW_CGROUP_SWITCHES: u64 = 11;

pub const PERF_FLAG_FD_CLOEXEC: u64 = 1 << 3;
pub const PERF_FLAG_PID_CGROUP: u64 = 1 << 2;

pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;
pub const PERF_FORMAT_ID: u64 = 1 << 2;
pub const PERF_FORMAT_GROUP: u64 = 1 << 3;
pub const PERF_FORMAT_LOST: u64 = 1 << 4;

// `_IO('$', n)` / `_IOW('$', n, ty)` / `_IOR('$', n, ty)`, '$' = 0x24.
pub const PERF_IOC_OP_ENABLE: u64 = 0x2400;
pub const PERF_IOC_OP_DISABLE: u64 = 0x2401;
pub const PERF_IOC_OP_REFRESH: u64 = 0x2402;
pub const PERF_IOC_OP_RESET: u64 = 0x2403;
pub const PERF_IOC_OP_PERIOD: u64 = 0x4008_2404;
pub const PERF_IOC_OP_SET_FILTER: u64 = 0x4008_2406;
pub const PERF_IOC_OP_ID: u64 = 0x8008_2407;

pub const PERF_IOC_FLAG_GROUP: u64 = 1;

/// `struct perf_event_attr`, trimmed to the counting-mode fields this crate
/// ever sets. The sampling/breakpoint unions (`sample_period`/`sample_freq`,
/// `bp_addr`/`bp_len`/`kprobe_*`/`uprobe_*`/`config1`/`config2`) are
/// collapsed to their `config1`/`config2` aliases since no sampling or
/// breakpoint path is exercised — see DESIGN.md for the rationale.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct perf_event_attr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    flags: u64,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    __reserved_2: u16,
    pub aux_sample_size: u32,
    __reserved_3: u32,
    pub sig_data: u64,
    pub config3: u64,
}

impl Default for perf_event_attr {
    fn default() -> Self {
        // Every field is legal when zeroed: `disabled` defaulting to 0 just means
        // `set_disabled` must be called explicitly, matching `attr::from`.
        unsafe { std::mem::zeroed() }
    }
}

macro_rules! bitfield {
    ($get:ident, $set:ident, $bit:expr) => {
        pub fn $get(&self) -> u64 {
            (self.flags >> $bit) & 1
        }

        pub fn $set(&mut self, val: u64) {
            self.flags = (self.flags & !(1 << $bit)) | ((val & 1) << $bit);
        }
    };
}

impl perf_event_attr {
    bitfield!(disabled, set_disabled, 0);
    bitfield!(inherit, set_inherit, 1);
    bitfield!(pinned, set_pinned, 2);
    bitfield!(exclusive, set_exclusive, 3);
    bitfield!(exclude_user, set_exclude_user, 4);
    bitfield!(exclude_kernel, set_exclude_kernel, 5);
    bitfield!(exclude_hv, set_exclude_hv, 6);
    bitfield!(exclude_idle, set_exclude_idle, 7);
    bitfield!(enable_on_exec, set_enable_on_exec, 12);
}
