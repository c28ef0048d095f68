//! Time base (C10): a free-running tick counter advanced by the timer IRQ
//! at a nominal 100 Hz. There is no wall clock; every coarse timeout
//! elsewhere (ICMP reply wait, TCP handshake, HTTP response wait) is
//! expressed in multiples of ticks.

use core::sync::atomic::{AtomicU64, Ordering};

pub const TICK_HZ: u64 = 100;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Advances the counter by one. Called only from the timer IRQ path
/// (`process::scheduler::timer_tick`); nothing else may mutate this.
pub fn advance() -> u64 {
    TICKS.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::SeqCst)
}

pub const fn ms_to_ticks(ms: u64) -> u64 {
    (ms * TICK_HZ) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_conversion_matches_100hz() {
        assert_eq!(ms_to_ticks(1000), 100);
        assert_eq!(ms_to_ticks(10), 1);
    }
}
