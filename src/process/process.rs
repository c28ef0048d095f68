//! Process model (C6): a process is an address space, one main task, and
//! an inbox, identified by a monotonically allocated PID. Grounded on
//! `kernel/task.c`'s process table plus `kernel/ipc/ipc.c`'s per-process
//! inbox field.

use super::inbox::Inbox;
use super::scheduler;
use super::task::TaskId;
use crate::arch::x86::cpu::without_interrupts;
use crate::mm::paging;
use spin::Mutex;

pub type Pid = u32;

pub const MAX_PROCESSES: usize = 32;

pub struct Process {
    pub pid: Pid,
    pub page_directory: u32,
    pub main_task: TaskId,
    pub inbox: Inbox,
    /// Next process in the circular process list (section 3), independent
    /// of the task scheduling ring even though today each process has
    /// exactly one task.
    pub next: Pid,
}

struct Registry {
    processes: [Option<Process>; MAX_PROCESSES],
    next_pid: Pid,
    head: Option<Pid>,
}

impl Registry {
    const fn new() -> Self {
        const NONE_PROC: Option<Process> = None;
        Registry { processes: [NONE_PROC; MAX_PROCESSES], next_pid: 0, head: None }
    }
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());

/// Creates a process with a fresh page directory and one main task
/// entering `entry`. PIDs are allocated monotonically from 0 and never
/// reused (section 3: processes are never destroyed in this spec).
pub fn spawn(entry: extern "C" fn() -> !) -> Pid {
    without_interrupts(|| {
        let mut reg = REGISTRY.lock();
        let pid = reg.next_pid;
        reg.next_pid += 1;
        assert!((pid as usize) < MAX_PROCESSES, "process table exhausted");

        let page_directory = paging::new_process_directory();
        drop(reg);
        let main_task = scheduler::spawn(pid, entry);
        let mut reg = REGISTRY.lock();

        let mut process =
            Process { pid, page_directory, main_task, inbox: Inbox::new(), next: pid };

        match reg.head {
            None => {
                reg.head = Some(pid);
            }
            Some(head_pid) => {
                let tail_pid = find_tail(&reg, head_pid);
                process.next = reg.processes[tail_pid as usize].as_ref().unwrap().next;
                reg.processes[tail_pid as usize].as_mut().unwrap().next = pid;
            }
        }

        reg.processes[pid as usize] = Some(process);
        pid
    })
}

fn find_tail(reg: &Registry, head: Pid) -> Pid {
    let mut candidate = head;
    loop {
        let next = reg.processes[candidate as usize].as_ref().unwrap().next;
        if next == head {
            return candidate;
        }
        candidate = next;
    }
}

/// Looks up a process by PID. Returns `None` for an out-of-range or
/// never-allocated PID (the `SEND`/`SHM_MAP` "unknown PID" error path).
pub fn exists(pid: Pid) -> bool {
    without_interrupts(|| {
        (pid as usize) < MAX_PROCESSES && REGISTRY.lock().processes[pid as usize].is_some()
    })
}

pub fn main_task_of(pid: Pid) -> Option<TaskId> {
    without_interrupts(|| {
        REGISTRY.lock().processes.get(pid as usize)?.as_ref().map(|p| p.main_task)
    })
}

/// Enqueues `message` into `pid`'s inbox and, on success, wakes that
/// process's main task if it was waiting. Returns `Err` unchanged on an
/// unknown PID or a full inbox (section 4.7: a failed SEND leaves the
/// target inbox unchanged).
pub fn send(pid: Pid, message: super::inbox::Message) -> Result<(), crate::lib::error::KernelError> {
    without_interrupts(|| {
        let mut reg = REGISTRY.lock();
        let process = reg
            .processes
            .get_mut(pid as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(crate::lib::error::KernelError::NoSuchProcess)?;
        process.inbox.enqueue(message)?;
        let task_id = process.main_task;
        drop(reg);
        scheduler::wake(task_id);
        Ok(())
    })
}

/// Non-blocking dequeue from `pid`'s own inbox (POLL, and the post-wake
/// half of RECV).
pub fn poll(pid: Pid) -> Result<super::inbox::Message, crate::lib::error::KernelError> {
    without_interrupts(|| {
        REGISTRY
            .lock()
            .processes
            .get_mut(pid as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(crate::lib::error::KernelError::NoSuchProcess)?
            .inbox
            .dequeue()
    })
}

pub fn process_count() -> usize {
    without_interrupts(|| REGISTRY.lock().processes.iter().flatten().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy() -> ! {
        loop {}
    }

    #[test]
    fn pids_allocate_monotonically_from_zero() {
        let p1 = spawn(dummy);
        let p2 = spawn(dummy);
        assert_eq!(p2, p1 + 1);
        assert!(exists(p1));
        assert!(exists(p2));
    }

    #[test]
    fn unknown_pid_reports_absent() {
        assert!(!exists(9999));
    }

    #[test]
    fn send_to_unknown_pid_fails() {
        let result = send(12345, super::super::inbox::Message::default());
        assert_eq!(result, Err(crate::lib::error::KernelError::NoSuchProcess));
    }
}
