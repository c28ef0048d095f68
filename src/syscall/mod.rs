//! System-call gate (C7): software interrupt 0x80, callable from ring 3.
//! Call number in `eax`, up to two arguments in `ebx`/`ecx`. Result is
//! written back into the frame's `eax` so the common trap stub's `popa`
//! hands it to the caller on return. Grounded on `kernel/syscall.c`'s
//! `syscall_dispatch` switch, adapted to this kernel's trap-frame-as-task
//! architecture.

use crate::arch::x86::trapframe::TrapFrame;
use crate::mm::paging::{USER_SPACE_END, USER_SPACE_START};
use crate::process::inbox::Message;
use crate::process::scheduler;
use crate::process::{process, task::TaskId};
use crate::shm;

const WRITE: u32 = 1;
const SEND: u32 = 2;
const RECV: u32 = 3;
const POLL: u32 = 4;
const SHM_CREATE: u32 = 5;
const SHM_MAP: u32 = 6;
const SHM_UNMAP: u32 = 7;

const WRITE_MAX_LEN: u32 = 1024;
const GUARD_PAGE_SIZE: u32 = 4096;
const FAILURE: u32 = 0xFFFF_FFFF; // -1 as u32

/// Pointer validation (section 4.6 and open-question decision 1): non-null,
/// 4-byte aligned, not inside the first page (traps null-adjacent
/// dereferences), and the `[ptr, ptr+len)` span does not overflow. WRITE
/// additionally requires the whole span to lie inside the reserved
/// user-virtual window; the other calls do not (matching the documented,
/// narrower-than-implied original behavior preserved by decision 1).
fn validate_pointer(ptr: u32, len: u32, require_user_window: bool) -> bool {
    if ptr == 0 || ptr % 4 != 0 || ptr < GUARD_PAGE_SIZE {
        return false;
    }
    let Some(end) = ptr.checked_add(len) else {
        return false;
    };
    if require_user_window && !(ptr >= USER_SPACE_START && end <= USER_SPACE_END) {
        return false;
    }
    true
}

fn current_caller_pid() -> Option<u32> {
    let task_id: TaskId = scheduler::current_task_id()?;
    scheduler::owner_pid_of(task_id)
}

/// Entry point called from `arch::x86::idt::common_dispatch` for vector
/// 0x80. Returns the stack pointer the common stub should resume on: the
/// caller's own frame for every call that completes synchronously, or a
/// different task's saved stack pointer when `RECV` blocks.
pub fn dispatch(frame: &mut TrapFrame, current_esp: u32) -> u32 {
    let call = frame.eax;
    let arg1 = frame.ebx;
    let arg2 = frame.ecx;

    let Some(caller_pid) = current_caller_pid() else {
        frame.eax = FAILURE;
        return current_esp;
    };

    match call {
        WRITE => {
            frame.eax = syscall_write(arg1) as u32;
            current_esp
        }
        SEND => {
            frame.eax = syscall_send(caller_pid, arg1, arg2) as u32;
            current_esp
        }
        RECV => syscall_recv(frame, caller_pid, arg1, current_esp),
        POLL => {
            frame.eax = syscall_poll(caller_pid, arg1) as u32;
            current_esp
        }
        SHM_CREATE => {
            frame.eax = shm::create(caller_pid, arg1 as usize);
            current_esp
        }
        SHM_MAP => {
            frame.eax = syscall_shm_map(arg1, arg2) as u32;
            current_esp
        }
        SHM_UNMAP => {
            frame.eax = syscall_shm_unmap(arg1) as u32;
            current_esp
        }
        _ => {
            frame.eax = FAILURE;
            current_esp
        }
    }
}

fn syscall_write(str_ptr: u32) -> i32 {
    if !validate_pointer(str_ptr, WRITE_MAX_LEN, true) {
        return -1;
    }
    let bytes = unsafe { core::slice::from_raw_parts(str_ptr as *const u8, WRITE_MAX_LEN as usize) };
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(WRITE_MAX_LEN as usize);
    crate::lib::printk::console_write_bytes(&bytes[..len]);
    0
}

/// User-space layout for SEND's message argument: (msg_type, data1, data2)
/// — three words, 12 bytes. The kernel stamps `sender_pid` itself so it
/// cannot be spoofed by the caller.
fn syscall_send(caller_pid: u32, target_pid: u32, msg_ptr: u32) -> i32 {
    if !validate_pointer(msg_ptr, 12, false) {
        return -1;
    }
    if !process::exists(target_pid) {
        return -1;
    }
    let words = unsafe { core::slice::from_raw_parts(msg_ptr as *const u32, 3) };
    let message =
        Message { sender_pid: caller_pid, msg_type: words[0], data1: words[1], data2: words[2] };
    match process::send(target_pid, message) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// User-space layout for RECV/POLL's out-pointer: (sender_pid, msg_type,
/// data1, data2) — four words, 16 bytes.
fn write_message_out(ptr: u32, message: Message) {
    let words = unsafe { core::slice::from_raw_parts_mut(ptr as *mut u32, 4) };
    words[0] = message.sender_pid;
    words[1] = message.msg_type;
    words[2] = message.data1;
    words[3] = message.data2;
}

fn syscall_poll(caller_pid: u32, out_ptr: u32) -> i32 {
    if !validate_pointer(out_ptr, 16, false) {
        return -1;
    }
    match process::poll(caller_pid) {
        Ok(message) => {
            write_message_out(out_ptr, message);
            0
        }
        Err(_) => -1,
    }
}

/// RECV: non-blocking fast path identical to POLL when a message is
/// already queued. On an empty inbox, transitions the caller to `waiting`
/// and rewinds `eip` past the two-byte `int 0x80` so that, once woken and
/// rescheduled, the same instruction re-executes and the syscall appears
/// never to have happened (section 4.5).
fn syscall_recv(frame: &mut TrapFrame, caller_pid: u32, out_ptr: u32, current_esp: u32) -> u32 {
    if !validate_pointer(out_ptr, 16, false) {
        frame.eax = FAILURE;
        return current_esp;
    }
    match process::poll(caller_pid) {
        Ok(message) => {
            write_message_out(out_ptr, message);
            frame.eax = 0;
            current_esp
        }
        Err(_) => {
            frame.eip = frame.eip.wrapping_sub(2);
            scheduler::block_current_and_switch(current_esp)
        }
    }
}

fn syscall_shm_map(id: u32, out_ptr: u32) -> i32 {
    if !validate_pointer(out_ptr, 4, false) {
        return -1;
    }
    match shm::map(id) {
        Ok(address) => {
            unsafe { *(out_ptr as *mut u32) = address };
            0
        }
        Err(_) => -1,
    }
}

fn syscall_shm_unmap(id: u32) -> i32 {
    match shm::unmap(id) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_validation_rejects_null_and_low_and_misaligned() {
        assert!(!validate_pointer(0, 4, false));
        assert!(!validate_pointer(4, 4, false));
        assert!(!validate_pointer(0x2000_0001, 4, false));
    }

    #[test]
    fn pointer_validation_rejects_overflowing_span() {
        assert!(!validate_pointer(u32::MAX - 2, 16, false));
    }

    #[test]
    fn write_pointer_must_lie_in_user_window() {
        assert!(validate_pointer(USER_SPACE_START + 16, 12, true));
        assert!(!validate_pointer(USER_SPACE_START - 16, 12, true));
        assert!(!validate_pointer(USER_SPACE_END, 12, true));
    }
}
