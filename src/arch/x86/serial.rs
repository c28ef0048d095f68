//! COM1 16550 UART, hand-rolled (the `uart_16550` crate gates its register
//! wrapper behind x86_64 and can't be used on this target). This is the
//! channel the kernel console (WRITE syscall, `kprintln!`, panic banner)
//! writes to, and what the test harness and QEMU both observe.

use super::port::{inb, outb};
use spin::Mutex;

const COM1: u16 = 0x3F8;

struct Uart {
    base: u16,
}

impl Uart {
    const fn new(base: u16) -> Self {
        Uart { base }
    }

    fn init(&mut self) {
        unsafe {
            outb(self.base + 1, 0x00); // disable interrupts
            outb(self.base + 3, 0x80); // enable DLAB
            outb(self.base, 0x03); // divisor low: 38400 baud
            outb(self.base + 1, 0x00); // divisor high
            outb(self.base + 3, 0x03); // 8 bits, no parity, one stop bit
            outb(self.base + 2, 0xC7); // enable FIFO, clear, 14-byte threshold
            outb(self.base + 4, 0x0B); // IRQs enabled, RTS/DSR set
        }
    }

    fn is_transmit_empty(&self) -> bool {
        unsafe { inb(self.base + 5) & 0x20 != 0 }
    }

    fn write_byte(&mut self, byte: u8) {
        while !self.is_transmit_empty() {
            core::hint::spin_loop();
        }
        unsafe { outb(self.base, byte) };
    }
}

static SERIAL: Mutex<Uart> = Mutex::new(Uart::new(COM1));

pub fn init() {
    SERIAL.lock().init();
}

pub fn write_byte(byte: u8) {
    let mut uart = SERIAL.lock();
    if byte == b'\n' {
        uart.write_byte(b'\r');
    }
    uart.write_byte(byte);
}

pub fn write_str(s: &str) {
    let mut uart = SERIAL.lock();
    for byte in s.bytes() {
        if byte == b'\n' {
            uart.write_byte(b'\r');
        }
        uart.write_byte(byte);
    }
}
