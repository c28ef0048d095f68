//! The trap frame: per-task register state folded onto the top of each
//! task's stack, per DESIGN NOTES "Trap frames as task state". Interrupt
//! entry/exit is the only place that loads or stores the full register
//! file; a context switch is reduced to swapping two stack pointers
//! (see `process::scheduler`).
//!
//! Every vector, including exceptions and the syscall gate, funnels
//! through one common stub that always resumes via whatever stack pointer
//! `common_dispatch` returns. For the timer IRQ and a blocking `RECV` this
//! is a different task's saved stack pointer; for everything else it is
//! simply the frame that was just pushed, i.e. no switch happens.

/// Layout matches what the common stub below pushes, top of stack first.
/// `pusha` order is edi, esi, ebp, esp(ignored on popa), ebx, edx, ecx, eax.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub int_no: u32,
    pub err_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    // Present only when the trap crossed a privilege level (ring 3 -> 0).
    pub useresp: u32,
    pub ss: u32,
}

#[cfg(not(test))]
extern "C" {
    pub fn syscall_stub();
}

// `pusha`/`popa` and the segment-register juggling below are 32-bit-mode
// only and do not assemble for `cargo kernel-test`'s hosted
// `x86_64-unknown-linux-gnu` target; this block only needs to exist in the
// real kernel binary.
#[cfg(not(test))]
core::arch::global_asm!(
    r#"
.macro ISR_NOERR num
.global isr\num
isr\num:
    push 0
    push \num
    jmp common_stub
.endm

.macro ISR_ERR num
.global isr\num
isr\num:
    push \num
    jmp common_stub
.endm

.macro IRQ num, vec
.global irq\num
irq\num:
    push 0
    push \vec
    jmp common_stub
.endm

.section .text

ISR_NOERR 0
ISR_NOERR 1
ISR_NOERR 2
ISR_NOERR 3
ISR_NOERR 4
ISR_NOERR 5
ISR_NOERR 6
ISR_NOERR 7
ISR_ERR   8
ISR_NOERR 9
ISR_ERR   10
ISR_ERR   11
ISR_ERR   12
ISR_ERR   13
ISR_ERR   14
ISR_NOERR 15
ISR_NOERR 16
ISR_ERR   17
ISR_NOERR 18
ISR_NOERR 19
ISR_NOERR 20
ISR_NOERR 21
ISR_NOERR 22
ISR_NOERR 23
ISR_NOERR 24
ISR_NOERR 25
ISR_NOERR 26
ISR_NOERR 27
ISR_NOERR 28
ISR_NOERR 29
ISR_ERR   30
ISR_NOERR 31

IRQ 0, 32
IRQ 1, 33
IRQ 2, 34
IRQ 3, 35
IRQ 4, 36
IRQ 5, 37
IRQ 6, 38
IRQ 7, 39
IRQ 8, 40
IRQ 9, 41
IRQ 10, 42
IRQ 11, 43
IRQ 12, 44
IRQ 13, 45
IRQ 14, 46
IRQ 15, 47

.global syscall_stub
syscall_stub:
    push 0
    push 0x80
    jmp common_stub

common_stub:
    pusha
    mov ax, ds
    push eax
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    push esp
    call common_dispatch
    mov esp, eax
    pop eax
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    popa
    add esp, 8
    iretd
"#
);
