//! Task scheduler (C5): single-CPU, preemptive round-robin over a
//! circular list of tasks. The timer IRQ is the sole preemption source;
//! the only other way off the CPU is a task issuing `RECV` on an empty
//! inbox. Grounded on `kernel/task.c`'s `task_scheduler_tick`, adapted so
//! a blocking syscall can trigger the same kind of reschedule the timer
//! does (see `arch::x86::idt::common_dispatch`).

use super::task::{Task, TaskId, TaskState};
use crate::arch::x86::cpu::without_interrupts;
use crate::arch::x86::pic;
use crate::lib::printk::log_line;
use spin::Mutex;

pub const MAX_TASKS: usize = 64;

struct Scheduler {
    tasks: [Option<Task>; MAX_TASKS],
    current: Option<TaskId>,
    task_count: usize,
}

impl Scheduler {
    const fn new() -> Self {
        const NONE_TASK: Option<Task> = None;
        Scheduler { tasks: [NONE_TASK; MAX_TASKS], current: None, task_count: 0 }
    }
}

static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// Allocates a task id and links it into the ring immediately after the
/// current task (or as the sole member if the ring is empty), per section
/// 4.5's task-creation rule.
pub fn spawn(owner_pid: u32, entry: extern "C" fn() -> !) -> TaskId {
    without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let id = sched
            .tasks
            .iter()
            .position(Option::is_none)
            .expect("task table exhausted") as TaskId;

        let mut task = Task::create(id, owner_pid, entry);

        match sched.current {
            None => {
                task.next = id;
                sched.current = Some(id);
            }
            Some(current_id) => {
                let current_next = sched.tasks[current_id as usize].as_ref().unwrap().next;
                task.next = current_next;
                sched.tasks[current_id as usize].as_mut().unwrap().next = id;
            }
        }

        sched.tasks[id as usize] = Some(task);
        sched.task_count += 1;
        id
    })
}

/// Timer IRQ entry point. Increments the tick counter, acknowledges the
/// PIC, and — if at least two tasks exist — round-robins to the next
/// ready-or-running task, skipping blocked/waiting ones. If a full
/// revolution finds none, stays on the current task.
pub fn timer_tick(current_esp: u32) -> u32 {
    crate::time::advance();
    pic::send_eoi(0);

    without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let Some(current_id) = sched.current else {
            return current_esp;
        };
        if sched.task_count < 2 {
            return current_esp;
        }

        sched.tasks[current_id as usize].as_mut().unwrap().esp = current_esp;
        if sched.tasks[current_id as usize].as_ref().unwrap().state == TaskState::Running {
            sched.tasks[current_id as usize].as_mut().unwrap().state = TaskState::Ready;
        }

        let next_id = find_next_runnable(&sched, current_id);
        sched.current = Some(next_id);
        sched.tasks[next_id as usize].as_mut().unwrap().state = TaskState::Running;
        sched.tasks[next_id as usize].as_ref().unwrap().esp
    })
}

fn find_next_runnable(sched: &Scheduler, from: TaskId) -> TaskId {
    let mut candidate = sched.tasks[from as usize].as_ref().unwrap().next;
    while candidate != from {
        let state = sched.tasks[candidate as usize].as_ref().unwrap().state;
        if state == TaskState::Ready || state == TaskState::Running {
            return candidate;
        }
        candidate = sched.tasks[candidate as usize].as_ref().unwrap().next;
    }
    from
}

/// Transitions the current task to `waiting` and returns the stack
/// pointer of whatever task should run next (matching `timer_tick`'s
/// contract so the caller in `common_dispatch` can treat both uniformly).
/// Used by `RECV` on an empty inbox.
pub fn block_current_and_switch(current_esp: u32) -> u32 {
    without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let Some(current_id) = sched.current else {
            return current_esp;
        };

        sched.tasks[current_id as usize].as_mut().unwrap().esp = current_esp;
        sched.tasks[current_id as usize].as_mut().unwrap().state = TaskState::Waiting;

        if sched.task_count < 2 {
            // No other task to run; the only option is to stay "current"
            // even though it's logically waiting, until woken. This can
            // only happen transiently during bootstrap before the fixed
            // process set exists.
            sched.tasks[current_id as usize].as_mut().unwrap().state = TaskState::Running;
            return current_esp;
        }

        let next_id = find_next_runnable(&sched, current_id);
        sched.current = Some(next_id);
        sched.tasks[next_id as usize].as_mut().unwrap().state = TaskState::Running;
        sched.tasks[next_id as usize].as_ref().unwrap().esp
    })
}

/// Wakes a waiting task (enqueue-side of the inbox rendezvous). The woken
/// task becomes `ready`; it is not guaranteed to run before the waker's
/// next quantum (section 5).
pub fn wake(task_id: TaskId) {
    without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        if let Some(task) = sched.tasks[task_id as usize].as_mut() {
            if task.state == TaskState::Waiting {
                task.state = TaskState::Ready;
            }
        }
    });
}

pub fn task_state(task_id: TaskId) -> Option<TaskState> {
    without_interrupts(|| SCHEDULER.lock().tasks[task_id as usize].as_ref().map(|t| t.state))
}

/// P6: exactly one task in state `running` at any observable instant.
pub fn exactly_one_running() -> bool {
    without_interrupts(|| {
        let sched = SCHEDULER.lock();
        sched.tasks.iter().flatten().filter(|t| t.state == TaskState::Running).count() == 1
    })
}

pub fn current_task_id() -> Option<TaskId> {
    without_interrupts(|| SCHEDULER.lock().current)
}

pub fn owner_pid_of(task_id: TaskId) -> Option<u32> {
    without_interrupts(|| SCHEDULER.lock().tasks[task_id as usize].as_ref().map(|t| t.owner_pid))
}

pub fn log_liveness_warning(task_id: TaskId) {
    log_line("WARN", format_args!("task {} has not made progress", task_id));
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy() -> ! {
        loop {}
    }

    #[test]
    fn single_task_tick_is_noop() {
        let id = spawn(1, dummy);
        let esp_before = task_state(id).map(|_| ()).is_some();
        assert!(esp_before);
        let esp = timer_tick(0xDEAD_0000);
        assert_eq!(esp, 0xDEAD_0000, "fewer than two tasks: tick must not switch");
    }

    #[test]
    fn two_tasks_round_robin() {
        let a = spawn(10, dummy);
        let b = spawn(10, dummy);
        assert_eq!(task_state(a), Some(TaskState::Ready));
        // Force `a` to be "current" and "running" to exercise the switch.
        {
            let mut sched = SCHEDULER.lock();
            sched.current = Some(a);
            sched.tasks[a as usize].as_mut().unwrap().state = TaskState::Running;
        }
        let new_esp = timer_tick(0x1000);
        let b_esp = SCHEDULER.lock().tasks[b as usize].as_ref().unwrap().esp;
        assert_eq!(new_esp, b_esp);
        assert_eq!(task_state(a), Some(TaskState::Ready));
        assert_eq!(task_state(b), Some(TaskState::Running));
    }

    #[test]
    fn waiting_tasks_are_skipped_during_round_robin() {
        let a = spawn(1, dummy);
        let b = spawn(1, dummy);
        let c = spawn(1, dummy);
        {
            let mut sched = SCHEDULER.lock();
            sched.current = Some(a);
            sched.tasks[a as usize].as_mut().unwrap().state = TaskState::Running;
            sched.tasks[b as usize].as_mut().unwrap().state = TaskState::Waiting;
        }
        timer_tick(0x2000);
        assert_eq!(task_state(c), Some(TaskState::Running));
    }
}
