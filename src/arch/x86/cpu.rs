//! Interrupt-flag control and the primitive used to bracket kernel-global
//! mutable state, per the concurrency model: on a single CPU with a
//! cooperative-plus-timer scheduler, mutual exclusion across tasks is
//! exactly interrupt exclusion.

#[inline]
pub unsafe fn enable_interrupts() {
    core::arch::asm!("sti", options(nomem, nostack));
}

#[inline]
pub unsafe fn disable_interrupts() {
    core::arch::asm!("cli", options(nomem, nostack));
}

#[inline]
pub fn interrupts_enabled() -> bool {
    let flags: u32;
    unsafe {
        core::arch::asm!(
            "pushfd",
            "pop {0}",
            out(reg) flags,
            options(nomem, preserves_flags)
        );
    }
    flags & (1 << 9) != 0
}

/// Halt until the next interrupt. Used by the spin-wait loops in the
/// network stack so polling does not burn the CPU.
#[inline]
pub fn halt() {
    unsafe {
        core::arch::asm!("sti", "hlt", options(nomem, nostack));
    }
}

/// Halt forever with interrupts disabled. The tail of kernel panic.
pub fn halt_forever() -> ! {
    loop {
        unsafe {
            core::arch::asm!("cli", "hlt", options(nomem, nostack));
        }
    }
}

/// Run `f` with interrupts disabled, restoring the prior flag state
/// afterwards. This is the kernel's only synchronization primitive for
/// kernel-global singletons (frame bitmap, heap cursor, ARP cache, IP id,
/// the TCP connection, the process list).
#[cfg(not(test))]
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let was_enabled = interrupts_enabled();
    if was_enabled {
        unsafe { disable_interrupts() };
    }
    let result = f();
    if was_enabled {
        unsafe { enable_interrupts() };
    }
    result
}

/// `cli`/`sti` are ring-0-only; under `cargo kernel-test` this runs as an
/// ordinary ring-3 process on the host, so there is no flag to save and
/// nothing to disable. Every caller only needs mutual exclusion, which the
/// `spin::Mutex` each of them also holds already provides on a hosted
/// single-threaded test run.
#[cfg(test)]
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}
