//! Monotonic millisecond clock backing `time_msec`.
//!
//! The hardware timer itself (PIT/APIC programming, the interrupt vector it
//! fires on) is an external collaborator per the design notes: this module
//! only owns the running millisecond count, advanced by whatever arch-level
//! code handles that vector.

use core::sync::atomic::{AtomicU64, Ordering};

/// Monotonic uptime counter in milliseconds, updated on each tick.
static UPTIME_MS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    UPTIME_MS.store(0, Ordering::Relaxed);
}

/// Advance the clock by `elapsed_ms`. Called from the timer interrupt
/// handler once hardware ticks are wired up.
pub fn tick(elapsed_ms: u64) {
    UPTIME_MS.fetch_add(elapsed_ms, Ordering::Relaxed);
}

/// Milliseconds since `init`. Backs the `time_msec` syscall.
pub fn uptime_ms() -> u64 {
    UPTIME_MS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_uptime() {
        init();
        assert_eq!(uptime_ms(), 0);
        tick(10);
        tick(5);
        assert_eq!(uptime_ms(), 15);
    }
}
