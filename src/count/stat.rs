use std::fmt;

use crate::ffi::{bindings as b, deref_offset};

/// Counter read-out.
///
/// Returned by [`Counter::stat`][super::Counter::stat] and
/// [`CounterGroup::leader`][super::group::CounterGroup::leader]'s stat. The
/// C-state counter bank reads every counter in the bank with `id` and
/// `siblings` enabled so a single leader read yields TSC, MPERF and every
/// C-state residency count atomically.
#[derive(Clone)]
pub struct Stat {
    pub count: u64,
    pub id: Option<u64>,
    pub time_enabled: Option<u64>,
    pub time_running: Option<u64>,
    pub siblings: Vec<SiblingStat>,
}

impl Stat {
    // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L344
    // struct read_format {
    //     {
    //         u64 value;
    //         { u64 time_enabled; } && PERF_FORMAT_TOTAL_TIME_ENABLED
    //         { u64 time_running; } && PERF_FORMAT_TOTAL_TIME_RUNNING
    //         { u64 id;           } && PERF_FORMAT_ID
    //     } && !PERF_FORMAT_GROUP
    //     {
    //         u64 nr;
    //         { u64 time_enabled; } && PERF_FORMAT_TOTAL_TIME_ENABLED
    //         { u64 time_running; } && PERF_FORMAT_TOTAL_TIME_RUNNING
    //         {
    //             u64 value;
    //             { u64 id;   } && PERF_FORMAT_ID
    //         } cntr[nr];
    //     } && PERF_FORMAT_GROUP
    // };
    pub(crate) unsafe fn from_ptr_offset(ptr: &mut *const u8, read_format: u64) -> Self {
        macro_rules! when {
            ($flag:ident, $ty:ty) => {
                (read_format & b::$flag > 0).then(|| deref_offset::<$ty>(ptr))
            };
        }

        if read_format & b::PERF_FORMAT_GROUP == 0 {
            let count = deref_offset(ptr);
            let time_enabled = when!(PERF_FORMAT_TOTAL_TIME_ENABLED, u64);
            let time_running = when!(PERF_FORMAT_TOTAL_TIME_RUNNING, u64);
            let id = when!(PERF_FORMAT_ID, u64);

            Self {
                count,
                id,
                time_enabled,
                time_running,
                siblings: vec![],
            }
        } else {
            let nr: u64 = deref_offset(ptr);
            let time_enabled = when!(PERF_FORMAT_TOTAL_TIME_ENABLED, u64);
            let time_running = when!(PERF_FORMAT_TOTAL_TIME_RUNNING, u64);

            let count = deref_offset(ptr);
            let id = when!(PERF_FORMAT_ID, u64);

            let siblings = (1..nr)
                .map(|_| {
                    let count = deref_offset(ptr);
                    let id = when!(PERF_FORMAT_ID, u64);
                    SiblingStat { count, id }
                })
                .collect();

            Self {
                count,
                id,
                time_enabled,
                time_running,
                siblings,
            }
        }
    }

    /// Decodes a `read_format`-shaped buffer read from a counter's file
    /// descriptor, starting at `ptr`.
    pub(crate) unsafe fn from_ptr(ptr: *const u8, read_format: u64) -> Self {
        let mut ptr = ptr;
        Self::from_ptr_offset(&mut ptr, read_format)
    }

    /// Size, in bytes, of the buffer needed to `read(2)` a counter whose
    /// group (leader plus siblings) has `group_size` members and is opened
    /// with `read_format`. `group_size` is ignored unless `PERF_FORMAT_GROUP`
    /// is set, since only then does the kernel emit one value per sibling.
    pub(crate) fn read_buf_size(group_size: usize, read_format: u64) -> usize {
        const U64: usize = size_of::<u64>();

        // Leading `u64`: `value` when `!PERF_FORMAT_GROUP`, `nr` when set.
        let mut size = U64;
        if read_format & b::PERF_FORMAT_TOTAL_TIME_ENABLED > 0 {
            size += U64;
        }
        if read_format & b::PERF_FORMAT_TOTAL_TIME_RUNNING > 0 {
            size += U64;
        }

        if read_format & b::PERF_FORMAT_GROUP == 0 {
            if read_format & b::PERF_FORMAT_ID > 0 {
                size += U64;
            }
        } else {
            let mut per_cntr = U64;
            if read_format & b::PERF_FORMAT_ID > 0 {
                per_cntr += U64;
            }
            size += per_cntr * group_size.max(1);
        }

        size
    }
}

impl fmt::Debug for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stat")
            .field("count", &self.count)
            .field("id", &self.id)
            .field("time_enabled", &self.time_enabled)
            .field("time_running", &self.time_running)
            .field("siblings", &self.siblings)
            .finish()
    }
}

#[derive(Clone)]
pub struct SiblingStat {
    pub count: u64,
    pub id: Option<u64>,
}

impl fmt::Debug for SiblingStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiblingStat")
            .field("count", &self.count)
            .field("id", &self.id)
            .finish()
    }
}
