//! High-resolution-timer delayed-event source (§4.3, "HRT variant").
//!
//! Pins the calling thread to the target CPU and arms a `timerfd` in
//! relative-monotonic mode; the timer does not restart itself on fire — the
//! engine loop re-arms after every emitted record (§4.5).

use std::fs::File;
use std::io::Result;
use std::os::fd::AsRawFd;

use super::{DelayedEventSource, Variant};
use crate::clock::{Clock, SystemClock};
use crate::ffi::syscall::{pin_to_cpu, timerfd_create, timerfd_settime_relative};

pub struct Hrt {
    clock: SystemClock,
    timer: File,
    ltime: u64,
    armed: bool,
}

impl DelayedEventSource for Hrt {
    // `ldist_gran = hrtimer_resolution` in the original device; a plain
    // userspace `timerfd` cannot query that, so 1ns is used as the
    // documented lower bound and relies on the kernel to clamp internally.
    const LDIST_MIN: u64 = 1;
    const LDIST_MAX: u64 = 20_000_000;

    fn init(cpu: u32) -> Result<Self> {
        pin_to_cpu(cpu)?;
        let timer = timerfd_create()?;
        Ok(Self { clock: SystemClock, timer, ltime: 0, armed: false })
    }

    fn arm(&mut self, ldist: u64) -> Result<u64> {
        let ltime = self.clock.now_ns() + ldist;
        timerfd_settime_relative(&self.timer, ldist)?;
        self.ltime = ltime;
        self.armed = true;
        Ok(ltime)
    }

    fn event_has_happened(&mut self) -> bool {
        // A second `before_idle` before `after_idle` observed this source
        // is a programming error per the ordering guarantee in §4.4.
        debug_assert!(self.armed, "Hrt::event_has_happened called with no event armed");

        let mut expirations: u64 = 0;
        let buf = std::slice::from_mut(&mut expirations);
        // SAFETY: `buf` is 8 live bytes backing a `u64`, the ABI `timerfd`
        // read(2) expects.
        let buf = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut u8, std::mem::size_of::<u64>())
        };
        let n = unsafe { libc::read(self.timer.as_raw_fd(), buf.as_mut_ptr() as _, buf.len()) };
        if n == buf.len() as isize {
            self.armed = false;
            true
        } else {
            // EAGAIN (non-blocking, not yet fired) or a transient error:
            // both are reported as "not yet happened".
            false
        }
    }

    fn get_launch_time(&self) -> u64 {
        self.ltime
    }

    fn get_time_before_idle(&self) -> u64 {
        self.clock.now_ns()
    }

    fn get_time_after_idle(&self) -> u64 {
        self.clock.now_ns()
    }

    fn exit(&mut self) -> Result<()> {
        // Disarm by setting a zero relative timeout; the fd is closed by
        // `File`'s `Drop`.
        timerfd_settime_relative(&self.timer, 0)?;
        self.armed = false;
        Ok(())
    }

    fn variant(&self) -> Variant {
        Variant::Hrt
    }
}
