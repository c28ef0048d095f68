//! NIC contract (external collaborator, section 4.11): the kernel needs a
//! `send_frame`, a `poll_receive` that drains the ring and invokes the
//! link-layer callback once per frame, and a readable MAC address. The
//! concrete RTL8139 register-level driver is out of scope (section 1); any
//! conforming implementation is acceptable, so this is a trait plus the
//! minimal non-hardware implementation needed to boot without a NIC
//! present.

use super::MacAddr;
use spin::Mutex;

pub trait NicDevice: Send {
    fn send_frame(&self, bytes: &[u8]);
    fn poll_receive(&self, on_frame: &mut dyn FnMut(&[u8]));
    fn mac_address(&self) -> MacAddr;
}

/// Boundary placeholder for the out-of-scope hardware driver: never
/// receives a frame, and drops anything handed to it for transmission.
/// A real build replaces this with an RTL8139 driver satisfying the same
/// trait; nothing above this layer needs to change.
pub struct NullNic {
    mac: MacAddr,
}

impl NullNic {
    pub const fn new(mac: MacAddr) -> Self {
        NullNic { mac }
    }
}

impl NicDevice for NullNic {
    fn send_frame(&self, _bytes: &[u8]) {}
    fn poll_receive(&self, _on_frame: &mut dyn FnMut(&[u8])) {}
    fn mac_address(&self) -> MacAddr {
        self.mac
    }
}

static DEVICE: Mutex<Option<&'static (dyn NicDevice + Sync)>> = Mutex::new(None);

pub fn register(device: &'static (dyn NicDevice + Sync)) {
    *DEVICE.lock() = Some(device);
}

pub fn send_frame(bytes: &[u8]) {
    if let Some(device) = *DEVICE.lock() {
        device.send_frame(bytes);
    }
}

pub fn poll_receive(on_frame: &mut dyn FnMut(&[u8])) {
    if let Some(device) = *DEVICE.lock() {
        device.poll_receive(on_frame);
    }
}

pub fn mac_address() -> MacAddr {
    DEVICE.lock().map(|d| d.mac_address()).unwrap_or([0; 6])
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use alloc::vec::Vec;

    /// A queue-backed NIC for hosted tests: `poll_receive` drains whatever
    /// `inject` queued, `send_frame` records everything transmitted so
    /// tests can assert on wire bytes without real hardware.
    pub struct MockNic {
        pub mac: MacAddr,
        pub inbound: Mutex<Vec<Vec<u8>>>,
        pub outbound: Mutex<Vec<Vec<u8>>>,
    }

    impl MockNic {
        pub fn new(mac: MacAddr) -> Self {
            MockNic { mac, inbound: Mutex::new(Vec::new()), outbound: Mutex::new(Vec::new()) }
        }

        pub fn inject(&self, frame: Vec<u8>) {
            self.inbound.lock().push(frame);
        }
    }

    impl NicDevice for MockNic {
        fn send_frame(&self, bytes: &[u8]) {
            self.outbound.lock().push(bytes.to_vec());
        }

        fn poll_receive(&self, on_frame: &mut dyn FnMut(&[u8])) {
            let frames: Vec<Vec<u8>> = self.inbound.lock().drain(..).collect();
            for frame in frames {
                on_frame(&frame);
            }
        }

        fn mac_address(&self) -> MacAddr {
            self.mac
        }
    }
}
