//! Process and task model (C5, C6, C8): the scheduling ring, the PID
//! registry, and the per-process inbox.

pub mod inbox;
pub mod process;
pub mod scheduler;
pub mod task;
