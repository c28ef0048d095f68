//! Fixed-capacity log retention ring, grounded on the teacher's
//! `lib/ringbuf.rs`. The kernel has no persistent storage (spec.md
//! section 6: "Persistent state: None"), so this in-memory ring is the
//! entire crash-reporting surface: the panic handler dumps its contents
//! before halting.

const CAPACITY: usize = 20;
const LINE_WIDTH: usize = 96;

#[derive(Clone, Copy)]
struct Line {
    bytes: [u8; LINE_WIDTH],
    len: u8,
}

impl Line {
    const fn empty() -> Self {
        Line { bytes: [0; LINE_WIDTH], len: 0 }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("<invalid utf8>")
    }
}

pub struct LogRing {
    lines: [Line; CAPACITY],
    next: usize,
    filled: usize,
}

impl LogRing {
    pub const fn new() -> Self {
        LogRing { lines: [Line::empty(); CAPACITY], next: 0, filled: 0 }
    }

    pub fn push(&mut self, text: &str) {
        let mut line = Line::empty();
        let n = text.len().min(LINE_WIDTH);
        line.bytes[..n].copy_from_slice(&text.as_bytes()[..n]);
        line.len = n as u8;
        self.lines[self.next] = line;
        self.next = (self.next + 1) % CAPACITY;
        self.filled = (self.filled + 1).min(CAPACITY);
    }

    /// Yields the retained lines oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let start = if self.filled < CAPACITY { 0 } else { self.next };
        (0..self.filled).map(move |i| self.lines[(start + i) % CAPACITY].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_most_recent_lines_in_order() {
        let mut ring = LogRing::new();
        for i in 0..(CAPACITY + 5) {
            let mut buf = heapless::String::<16>::new();
            core::fmt::write(&mut buf, format_args!("line{}", i)).unwrap();
            ring.push(&buf);
        }
        let lines: heapless::Vec<&str, CAPACITY> = ring.iter().collect::<heapless::Vec<_, CAPACITY>>();
        assert_eq!(lines.len(), CAPACITY);
        assert_eq!(lines[0], "line5");
        assert_eq!(lines[CAPACITY - 1], "line24");
    }

    #[test]
    fn empty_ring_yields_nothing() {
        let ring = LogRing::new();
        assert_eq!(ring.iter().count(), 0);
    }
}
