//! Interrupt-descriptor table: 256 gates. Vectors 0-31 are CPU exceptions,
//! 32-47 are the remapped hardware IRQs (C1), and 0x80 is the syscall gate,
//! callable from ring 3. Every other vector is present (so an unexpected
//! interrupt doesn't triple-fault) but carries no handler.

use super::pic;
use super::trapframe::TrapFrame;
use crate::lib::panic::kernel_panic;
use crate::lib::printk::kprintln;
use core::mem::size_of;
use spin::Mutex;

const ENTRY_COUNT: usize = 256;
const SYSCALL_VECTOR: u8 = 0x80;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 }
    }

    fn new(handler: u32, selector: u16, type_attr: u8) -> Self {
        IdtEntry {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

const GATE_INTERRUPT_RING0: u8 = 0x8E; // present, ring 0, 32-bit interrupt gate
const GATE_INTERRUPT_RING3: u8 = 0xEE; // present, ring 3, 32-bit interrupt gate

static mut IDT: [IdtEntry; ENTRY_COUNT] = [IdtEntry::missing(); ENTRY_COUNT];

pub type HandlerFn = fn(&mut TrapFrame);

static HANDLERS: Mutex<[Option<HandlerFn>; ENTRY_COUNT]> = Mutex::new([None; ENTRY_COUNT]);
static WARNED_MISSING_IRQ: Mutex<[bool; 16]> = Mutex::new([false; 16]);

/// Register a handler for `vector`. Overwrites any previous registration;
/// there is one slot per vector, matching the spec's flat registry.
pub fn register_handler(vector: u8, handler: HandlerFn) {
    HANDLERS.lock()[vector as usize] = Some(handler);
}

#[cfg(not(test))]
macro_rules! isr_symbols {
    ($($name:ident),* $(,)?) => {
        extern "C" {
            $(fn $name();)*
        }
    };
}

#[cfg(not(test))]
isr_symbols!(
    isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7, isr8, isr9, isr10, isr11, isr12, isr13, isr14,
    isr15, isr16, isr17, isr18, isr19, isr20, isr21, isr22, isr23, isr24, isr25, isr26, isr27,
    isr28, isr29, isr30, isr31, irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10,
    irq11, irq12, irq13, irq14, irq15,
);

#[cfg(not(test))]
use super::trapframe::syscall_stub;
#[cfg(not(test))]
use super::gdt::KERNEL_CODE_SELECTOR;

/// Builds the IDT from the assembly stubs in `trapframe` and loads it.
/// Not available under `cargo kernel-test`: the stubs it wires up are
/// 32-bit-only assembly that the hosted test target can't assemble.
#[cfg(not(test))]
pub fn init() {
    let isr_addrs: [unsafe extern "C" fn(); 32] = [
        isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7, isr8, isr9, isr10, isr11, isr12, isr13,
        isr14, isr15, isr16, isr17, isr18, isr19, isr20, isr21, isr22, isr23, isr24, isr25, isr26,
        isr27, isr28, isr29, isr30, isr31,
    ];
    let irq_addrs: [unsafe extern "C" fn(); 16] = [
        irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11, irq12, irq13,
        irq14, irq15,
    ];

    unsafe {
        for (vector, &addr) in isr_addrs.iter().enumerate() {
            IDT[vector] = IdtEntry::new(addr as usize as u32, KERNEL_CODE_SELECTOR, GATE_INTERRUPT_RING0);
        }
        for (i, &addr) in irq_addrs.iter().enumerate() {
            IDT[32 + i] = IdtEntry::new(addr as usize as u32, KERNEL_CODE_SELECTOR, GATE_INTERRUPT_RING0);
        }
        IDT[SYSCALL_VECTOR as usize] =
            IdtEntry::new(syscall_stub as usize as u32, KERNEL_CODE_SELECTOR, GATE_INTERRUPT_RING3);

        let pointer = IdtPointer {
            limit: (size_of::<[IdtEntry; ENTRY_COUNT]>() - 1) as u16,
            base: IDT.as_ptr() as u32,
        };
        core::arch::asm!("lidt [{0}]", in(reg) &pointer);
    }

    pic::remap();
}

/// Called from the single assembly common stub for every vector: CPU
/// exceptions, hardware IRQs, and the syscall gate. Always returns a valid
/// ESP; the caller's `mov esp, eax` takes it unconditionally. For the
/// timer IRQ and a blocking syscall this is a different task's saved
/// stack pointer (the mechanism by which "RECV on an empty inbox" gets the
/// CPU to a different task without a second interrupt); for everything
/// else it is simply the frame just pushed, i.e. no switch happens.
#[no_mangle]
extern "C" fn common_dispatch(frame: *mut TrapFrame) -> u32 {
    let frame_ref = unsafe { &mut *frame };
    let vector = frame_ref.int_no as u8;

    if vector == SYSCALL_VECTOR {
        return crate::syscall::dispatch(frame_ref, frame as u32);
    }

    if (32..48).contains(&vector) {
        let irq = vector - 32;
        if irq == 0 {
            return crate::process::scheduler::timer_tick(frame as u32);
        }
        if let Some(handler) = HANDLERS.lock()[vector as usize] {
            handler(frame_ref);
        } else {
            let mut warned = WARNED_MISSING_IRQ.lock();
            if !warned[irq as usize] {
                kprintln!("unhandled IRQ{} (no registered handler)", irq);
                warned[irq as usize] = true;
            }
        }
        pic::send_eoi(irq);
        return frame as u32;
    }

    // CPU exception.
    if let Some(handler) = HANDLERS.lock()[vector as usize] {
        handler(frame_ref);
        return frame as u32;
    }
    if vector == 14 {
        report_page_fault(frame_ref);
    }
    kernel_panic("unhandled CPU exception");
}

fn report_page_fault(frame: &TrapFrame) {
    let fault_addr: u32;
    unsafe {
        core::arch::asm!("mov {0}, cr2", out(reg) fault_addr, options(nomem, nostack, preserves_flags));
    }
    let present = frame.err_code & 1 != 0;
    let write = frame.err_code & 2 != 0;
    let user = frame.err_code & 4 != 0;
    kprintln!(
        "page fault: addr={:#010x} present={} write={} user={} eip={:#010x}",
        fault_addr,
        present,
        write,
        user,
        { frame.eip }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_overwrite_handler() {
        fn first(_f: &mut TrapFrame) {}
        fn second(_f: &mut TrapFrame) {}
        register_handler(200, first);
        assert!(HANDLERS.lock()[200].is_some());
        register_handler(200, second);
        assert!(HANDLERS.lock()[200].is_some());
    }
}
