pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod pic;
pub mod port;
pub mod serial;
pub mod trapframe;

/// C1: flat segment table, interrupt table, PIC remap. Does not enable
/// interrupts; that is deferred to the last bootstrap step (C13 step 9).
/// Not available under `cargo kernel-test`; see `idt::init`.
#[cfg(not(test))]
pub fn init_traps() {
    gdt::init();
    idt::init();
}
