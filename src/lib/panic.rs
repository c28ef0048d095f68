//! Fatal-error handling (spec.md section 7, taxonomy kind 1). Every
//! invariant violation in this kernel reaches the user through exactly one
//! path: disable interrupts, print a banner with the message and recent
//! log history, then halt forever. There is no recovery.

use crate::arch::x86::cpu;
use crate::lib::printk::recent_log_lines;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static PANICKING: AtomicBool = AtomicBool::new(false);
static PANIC_COUNT: AtomicU64 = AtomicU64::new(0);

/// Entry point for invariant violations detected by kernel code itself
/// (as opposed to a Rust `panic!`, which routes through
/// [`rust_panic_handler`] below). Both converge on the same banner.
pub fn kernel_panic(message: &str) -> ! {
    fatal(message, None)
}

fn fatal(message: &str, location: Option<&core::panic::Location>) -> ! {
    unsafe { cpu::disable_interrupts() };

    let count = PANIC_COUNT.fetch_add(1, Ordering::SeqCst);
    if PANICKING.swap(true, Ordering::SeqCst) && count > 0 {
        // Re-entrant panic: don't trust formatting machinery or the log
        // ring any further, just get a message out and stop.
        crate::lib::printk::console_write_bytes(b"\n*** double panic, halting ***\n");
        cpu::halt_forever();
    }

    crate::kprintln!("\n================ KERNEL PANIC ================");
    match location {
        Some(loc) => crate::kprintln!("panic at {}:{}:{}: {}", loc.file(), loc.line(), loc.column(), message),
        None => crate::kprintln!("panic: {}", message),
    }
    crate::kprintln!("------------------------------------------------");
    crate::kprintln!("recent log lines:");
    for line in recent_log_lines::<20>().iter() {
        crate::kprintln!("  {}", line);
    }
    crate::kprintln!("================================================");
    crate::kprintln!("system halted - power cycle to recover");

    cpu::halt_forever();
}

#[cfg(not(test))]
#[panic_handler]
fn rust_panic_handler(info: &core::panic::PanicInfo) -> ! {
    let message = info.message();
    let mut buf: heapless::String<160> = heapless::String::new();
    let _ = core::fmt::write(&mut buf, format_args!("{}", message));
    fatal(&buf, info.location())
}
