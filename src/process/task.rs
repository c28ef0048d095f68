//! Task creation (C5): builds a trap-frame image at the top of a fresh
//! stack so that the common IRQ stub's `popa`/`iretd` tail resumes
//! execution at `entry` exactly as if the task had just been interrupted
//! mid-flight. Grounded on `kernel/task.c`'s `task_create`, adapted to the
//! trap-frame layout in `arch::x86::trapframe`.

use crate::arch::x86::gdt::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};
use crate::arch::x86::trapframe::TrapFrame;
use alloc::boxed::Box;

pub type TaskId = u32;

const STACK_SIZE: usize = 16 * 1024;
const EFLAGS_IF: u32 = 0x202; // interrupts enabled, reserved bit 1 set

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Waiting,
}

pub struct Task {
    pub id: TaskId,
    pub esp: u32,
    pub state: TaskState,
    pub owner_pid: u32,
    /// Index (not raw pointer, per the arena-allocation guidance in
    /// section 9) of the next task in the scheduling ring.
    pub next: TaskId,
    // Keeps the backing stack allocation alive for the task's lifetime.
    // Tasks are never destroyed in this spec, so this is never dropped.
    _stack: Box<[u8; STACK_SIZE]>,
}

impl Task {
    /// Allocates a stack and constructs the fake trap frame described
    /// above. `entry` never returns by contract (section 4.5); tasks are
    /// infinite loops.
    pub fn create(id: TaskId, owner_pid: u32, entry: extern "C" fn() -> !) -> Task {
        let mut stack = Box::new([0u8; STACK_SIZE]);
        let stack_top = stack.as_mut_ptr() as usize + STACK_SIZE;
        let frame_addr = (stack_top - core::mem::size_of::<TrapFrame>()) & !0xF;

        let frame = TrapFrame {
            ds: KERNEL_DATA_SELECTOR as u32,
            edi: 0,
            esi: 0,
            ebp: 0,
            esp_dummy: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            int_no: 0,
            err_code: 0,
            eip: entry as usize as u32,
            cs: KERNEL_CODE_SELECTOR as u32,
            eflags: EFLAGS_IF,
            useresp: 0,
            ss: 0,
        };

        unsafe {
            core::ptr::write(frame_addr as *mut TrapFrame, frame);
        }

        Task { id, esp: frame_addr as u32, state: TaskState::Ready, owner_pid, next: id, _stack: stack }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry() -> ! {
        loop {}
    }

    #[test]
    fn fresh_task_is_ready_and_self_linked() {
        let task = Task::create(3, 7, dummy_entry);
        assert_eq!(task.state, TaskState::Ready);
        assert_eq!(task.next, 3, "a task not yet linked into a ring points at itself");
        assert_eq!(task.owner_pid, 7);
    }

    #[test]
    fn frame_fields_match_entry_contract() {
        let task = Task::create(1, 1, dummy_entry);
        let frame = unsafe { &*(task.esp as *const TrapFrame) };
        assert_eq!({ frame.eip }, dummy_entry as usize as u32);
        assert_eq!({ frame.cs }, KERNEL_CODE_SELECTOR as u32);
        assert_eq!({ frame.eflags } & EFLAGS_IF, EFLAGS_IF);
        assert_eq!({ frame.eax }, 0);
    }
}
