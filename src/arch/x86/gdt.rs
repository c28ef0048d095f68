//! Flat segment table (C1).
//!
//! Five selectors: null, kernel code, kernel data, user code, user data,
//! plus one task-state segment descriptor holding the ring-0 stack used on
//! trap entry from ring 3. All four code/data segments are flat (base 0,
//! limit 4 GiB) — segmentation does no real work here, paging does all the
//! protection; the GDT exists because protected mode requires it and
//! because the privilege transition needs a TSS.

use core::mem::size_of;
use lazy_static::lazy_static;
use spin::Mutex;

pub const KERNEL_CODE_SELECTOR: u16 = 1 << 3;
pub const KERNEL_DATA_SELECTOR: u16 = 2 << 3;
pub const USER_CODE_SELECTOR: u16 = (3 << 3) | 3;
pub const USER_DATA_SELECTOR: u16 = (4 << 3) | 3;
pub const TSS_SELECTOR: u16 = 5 << 3;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_middle: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        GdtEntry { limit_low: 0, base_low: 0, base_middle: 0, access: 0, granularity: 0, base_high: 0 }
    }

    const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        GdtEntry {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_middle: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (((limit >> 16) & 0x0F) as u8) | (flags << 4),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// 32-bit TSS. Only `esp0`/`ss0` matter for this kernel: ring-3 code never
/// actually runs here (the spec's user/ring-3 surface is the syscall gate
/// only), but `iret` back to ring 0 after a trap still reads through this
/// structure's layout conventions, and a populated esp0 is what a future
/// ring-3 task would need.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct Tss {
    prev_tss: u32,
    esp0: u32,
    ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        // SAFETY-relevant only in the sense that an all-zero TSS with a
        // real esp0/ss0 is a valid minimal TSS for our single ring-0 kernel.
        Tss {
            prev_tss: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

const ENTRY_COUNT: usize = 6;

struct GdtTable {
    entries: [GdtEntry; ENTRY_COUNT],
    tss: Tss,
}

lazy_static! {
    static ref GDT: Mutex<GdtTable> = Mutex::new(GdtTable {
        entries: [GdtEntry::null(); ENTRY_COUNT],
        tss: Tss::new(),
    });
}

/// Ring-0 interrupt stack, used as the TSS's `esp0`. Traps taken from
/// ring 3 switch to this stack before the common trap stub runs.
const KERNEL_STACK_SIZE: usize = 16 * 1024;
static mut KERNEL_STACK: [u8; KERNEL_STACK_SIZE] = [0; KERNEL_STACK_SIZE];

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

/// Access byte flags (present, ring, code/data, direction, rw, accessed).
const ACCESS_PRESENT: u8 = 0x80;
const ACCESS_RING3: u8 = 0x60;
const ACCESS_CODE_DATA: u8 = 0x10;
const ACCESS_EXEC: u8 = 0x08;
const ACCESS_RW: u8 = 0x02;
const ACCESS_TSS: u8 = 0x89; // present, type=0x9 (32-bit TSS, available)

const GRAN_4K_32BIT: u8 = 0xC; // granularity=1 (4K), size=1 (32-bit)

pub fn init() {
    let mut table = GDT.lock();

    table.entries[0] = GdtEntry::null();
    table.entries[1] = GdtEntry::new(
        0,
        0xFFFFF,
        ACCESS_PRESENT | ACCESS_CODE_DATA | ACCESS_EXEC | ACCESS_RW,
        GRAN_4K_32BIT,
    );
    table.entries[2] = GdtEntry::new(0, 0xFFFFF, ACCESS_PRESENT | ACCESS_CODE_DATA | ACCESS_RW, GRAN_4K_32BIT);
    table.entries[3] = GdtEntry::new(
        0,
        0xFFFFF,
        ACCESS_PRESENT | ACCESS_RING3 | ACCESS_CODE_DATA | ACCESS_EXEC | ACCESS_RW,
        GRAN_4K_32BIT,
    );
    table.entries[4] = GdtEntry::new(
        0,
        0xFFFFF,
        ACCESS_PRESENT | ACCESS_RING3 | ACCESS_CODE_DATA | ACCESS_RW,
        GRAN_4K_32BIT,
    );

    let stack_top = unsafe { KERNEL_STACK.as_ptr().add(KERNEL_STACK_SIZE) as u32 };
    table.tss.esp0 = stack_top;
    table.tss.ss0 = KERNEL_DATA_SELECTOR as u32;

    let tss_base = &table.tss as *const Tss as u32;
    let tss_limit = (size_of::<Tss>() - 1) as u32;
    table.entries[5] = GdtEntry::new(tss_base, tss_limit, ACCESS_TSS, 0);

    let pointer = GdtPointer {
        limit: (size_of::<[GdtEntry; ENTRY_COUNT]>() - 1) as u16,
        base: table.entries.as_ptr() as u32,
    };

    unsafe {
        core::arch::asm!(
            "lgdt [{0}]",
            in(reg) &pointer,
        );
        reload_segments();
        core::arch::asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
    }
}

/// Reload CS via a far-return trampoline (the only way to load CS outside
/// of a call/jump/interrupt gate) and the data segments directly.
unsafe fn reload_segments() {
    core::arch::asm!(
        "push {code_sel}",
        "push 2f",
        "retf",
        "2:",
        "mov ax, {data_sel:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        code_sel = in(reg) KERNEL_CODE_SELECTOR as u32,
        data_sel = in(reg) KERNEL_DATA_SELECTOR,
    );
}

/// Sets the TSS's esp0 to a fresh ring-0 stack top. Would be used when
/// switching to a process whose main task runs at ring 3; unused while
/// every task in this kernel runs at ring 0, kept for the contract.
pub fn set_kernel_stack(esp0: u32) {
    GDT.lock().tss.esp0 = esp0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_have_expected_rpl() {
        assert_eq!(KERNEL_CODE_SELECTOR & 3, 0);
        assert_eq!(KERNEL_DATA_SELECTOR & 3, 0);
        assert_eq!(USER_CODE_SELECTOR & 3, 3);
        assert_eq!(USER_DATA_SELECTOR & 3, 3);
    }

    #[test]
    fn entries_are_in_expected_index_order() {
        assert_eq!(KERNEL_CODE_SELECTOR >> 3, 1);
        assert_eq!(KERNEL_DATA_SELECTOR >> 3, 2);
        assert_eq!(USER_CODE_SELECTOR >> 3, 3);
        assert_eq!(USER_DATA_SELECTOR >> 3, 4);
        assert_eq!(TSS_SELECTOR >> 3, 5);
    }
}
