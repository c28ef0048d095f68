//! Kernel console output. A `ConsoleSink` trait keeps this decoupled from
//! the concrete byte sink (serial today; the out-of-scope VGA driver could
//! implement the same trait). The WRITE syscall (C7 #1) and every
//! diagnostic macro in the kernel share this one path, and every line also
//! lands in the log retention ring so the panic handler can dump recent
//! history.

use super::ringbuf::LogRing;
use crate::time;
use core::fmt::Write as _;
use spin::Mutex;

pub trait ConsoleSink {
    fn write_str(&mut self, s: &str);
}

struct SerialSink;

impl ConsoleSink for SerialSink {
    fn write_str(&mut self, s: &str) {
        crate::arch::x86::serial::write_str(s);
    }
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing::new());

pub struct Printer;

impl core::fmt::Write for Printer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        SerialSink.write_str(s);
        Ok(())
    }
}

/// Writes raw bytes to the console, matching the contract the WRITE
/// syscall needs (no implicit newline, no retention-ring entry — retention
/// is for structured log lines, not arbitrary user output).
pub fn console_write_bytes(bytes: &[u8]) {
    for &b in bytes {
        crate::arch::x86::serial::write_byte(b);
    }
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    let _ = Printer.write_fmt(args);
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::lib::printk::_print(core::format_args!($($arg)*)));
}

#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", core::format_args!($($arg)*)));
}

pub use kprintln;

/// Leveled logging: each line is timestamped with the current tick count
/// (C10) and retained in the log ring in addition to being printed.
pub fn log_line(level: &str, args: core::fmt::Arguments) {
    let tick = time::ticks();
    let mut line: heapless::String<96> = heapless::String::new();
    let _ = core::write!(line, "[{:>8}] {:<5} ", tick, level);
    let _ = core::fmt::write(&mut line, args);
    kprintln!("{}", line);
    LOG_RING.lock().push(&line);
}

pub fn recent_log_lines<const N: usize>() -> heapless::Vec<heapless::String<96>, N> {
    let ring = LOG_RING.lock();
    ring.iter()
        .map(|s| {
            let mut owned: heapless::String<96> = heapless::String::new();
            let _ = owned.push_str(s);
            owned
        })
        .collect()
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => ($crate::lib::printk::log_line("INFO", core::format_args!($($arg)*)));
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => ($crate::lib::printk::log_line("WARN", core::format_args!($($arg)*)));
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => ($crate::lib::printk::log_line("ERROR", core::format_args!($($arg)*)));
}
