//! UX/session state (C12): a process-wide record the keyboard-event
//! producer writes and the browser/renderer processes read. Outside the
//! kernel proper in spirit, but the kernel owns the singleton and uses its
//! `silent` flag to gate boot-time logging. Grounded on `include/ux.h` /
//! `kernel/ux/ux.c`. Mutation is non-atomic by design (section 5): readers
//! may observe a torn string mid-update, which is acceptable for this
//! domain.

use crate::arch::x86::cpu::without_interrupts;
use heapless::String;
use spin::Mutex;

const INPUT_CAPACITY: usize = 128;

pub struct Session {
    pub last_input: String<INPUT_CAPACITY>,
    pub active_pid: Option<u32>,
    pub boot_complete: bool,
    pub silent: bool,
}

impl Session {
    const fn new() -> Self {
        Session { last_input: String::new(), active_pid: None, boot_complete: false, silent: true }
    }
}

static SESSION: Mutex<Session> = Mutex::new(Session::new());

/// Appends a printable character produced by the keyboard-event path.
/// Silently drops characters once the buffer is full rather than
/// panicking — session state is best-effort (section 5).
pub fn push_char(c: char) {
    without_interrupts(|| {
        let _ = SESSION.lock().last_input.push(c);
    });
}

/// The submit signal (Enter): snapshots and clears the input line. Callers
/// needing the submitted text should read the snapshot, not `last_input`
/// after this returns.
pub fn take_submitted_input() -> String<INPUT_CAPACITY> {
    without_interrupts(|| {
        let mut session = SESSION.lock();
        let snapshot = session.last_input.clone();
        session.last_input.clear();
        snapshot
    })
}

pub fn set_active_pid(pid: u32) {
    without_interrupts(|| SESSION.lock().active_pid = Some(pid));
}

pub fn active_pid() -> Option<u32> {
    without_interrupts(|| SESSION.lock().active_pid)
}

/// Flipped once by bootstrap (C13 step 9) after the fixed process set is
/// running and interrupts are enabled. Used only to gate the boot
/// animation's verbosity in the original; here it silences the leveled
/// logging macros' highest-frequency lines until boot settles.
pub fn mark_boot_complete() {
    without_interrupts(|| {
        let mut session = SESSION.lock();
        session.boot_complete = true;
        session.silent = false;
    });
}

pub fn is_silent() -> bool {
    without_interrupts(|| SESSION.lock().silent)
}

pub fn boot_complete() -> bool {
    without_interrupts(|| SESSION.lock().boot_complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_clears_the_line_and_returns_the_prior_contents() {
        push_char('h');
        push_char('i');
        let submitted = take_submitted_input();
        assert_eq!(submitted.as_str(), "hi");
        assert_eq!(take_submitted_input().as_str(), "");
    }

    #[test]
    fn boot_complete_clears_silent_mode() {
        mark_boot_complete();
        assert!(boot_complete());
        assert!(!is_silent());
    }
}
