//! Multiboot1 header and assembly entry point (C13 steps 1-2).
//!
//! The loader hands control to `_start` in 32-bit protected mode with
//! paging disabled, `eax` holding the multiboot magic value and `ebx`
//! holding a physical pointer to the loader's info structure. We set up a
//! small boot stack and jump straight into Rust; everything else is
//! written in the target language.

pub const MULTIBOOT_MAGIC: u32 = 0x2BADB002;
const MULTIBOOT_HEADER_MAGIC: u32 = 0x1BADB002;
const MULTIBOOT_FLAGS: u32 = 0x0000_0003; // align modules on page boundaries + provide memory map

#[repr(C, packed)]
struct MultibootHeader {
    magic: u32,
    flags: u32,
    checksum: u32,
}

#[used]
#[link_section = ".multiboot_header"]
static MULTIBOOT_HEADER: MultibootHeader = MultibootHeader {
    magic: MULTIBOOT_HEADER_MAGIC,
    flags: MULTIBOOT_FLAGS,
    checksum: (0u32)
        .wrapping_sub(MULTIBOOT_HEADER_MAGIC)
        .wrapping_sub(MULTIBOOT_FLAGS),
};

const BOOT_STACK_SIZE: usize = 64 * 1024;

#[repr(align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

#[used]
static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

core::arch::global_asm!(
    r#"
.section .text
.global _start
_start:
    mov esp, offset {stack} + {stack_size}
    push ebx        # multiboot info pointer
    push eax        # multiboot magic
    call rust_entry
    cli
.hang:
    hlt
    jmp .hang
"#,
    stack = sym BOOT_STACK,
    stack_size = const BOOT_STACK_SIZE,
);

/// Multiboot loader info structure, fields used by this kernel only.
/// Field layout per the Multiboot Specification 0.6.96, table 3.3.
#[repr(C)]
pub struct MultibootInfo {
    pub flags: u32,
    pub mem_lower: u32,
    pub mem_upper: u32,
    pub boot_device: u32,
    pub cmdline: u32,
    pub mods_count: u32,
    pub mods_addr: u32,
    pub syms: [u32; 4],
    pub mmap_length: u32,
    pub mmap_addr: u32,
}

pub const MULTIBOOT_FLAG_MEM: u32 = 1 << 0;
pub const MULTIBOOT_FLAG_MMAP: u32 = 1 << 6;

#[repr(C, packed)]
pub struct MultibootMmapEntry {
    pub size: u32,
    pub addr_low: u32,
    pub addr_high: u32,
    pub len_low: u32,
    pub len_high: u32,
    pub entry_type: u32,
}

pub const MULTIBOOT_MEMORY_AVAILABLE: u32 = 1;
