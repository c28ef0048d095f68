//! Ethernet II link layer (C11). Grounded on `drivers/network/ethernet.c`.
//! Frames below the minimum header length are dropped; unrecognized
//! ethertypes are silently dropped, matching the original's behavior of
//! simply not dispatching anything for them.

use super::device;
use super::{MacAddr, ETH_TYPE_ARP, ETH_TYPE_IPV4};
use spin::Mutex;

pub const HEADER_LEN: usize = 14;

pub type ReceiveCallback = fn(&[u8]);

static LOCAL_MAC: Mutex<MacAddr> = Mutex::new([0; 6]);
static ARP_CALLBACK: Mutex<Option<ReceiveCallback>> = Mutex::new(None);
static IPV4_CALLBACK: Mutex<Option<ReceiveCallback>> = Mutex::new(None);

pub fn init(mac: MacAddr) {
    *LOCAL_MAC.lock() = mac;
}

pub fn local_mac() -> MacAddr {
    *LOCAL_MAC.lock()
}

pub fn set_arp_callback(callback: ReceiveCallback) {
    *ARP_CALLBACK.lock() = Some(callback);
}

pub fn set_ipv4_callback(callback: ReceiveCallback) {
    *IPV4_CALLBACK.lock() = Some(callback);
}

/// Builds an Ethernet II frame (dst MAC, src MAC, big-endian ethertype,
/// payload, no trailer) and hands it to the registered NIC.
pub fn send(dst_mac: MacAddr, ethertype: u16, payload: &[u8]) {
    let mut frame = alloc::vec::Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&dst_mac);
    frame.extend_from_slice(&local_mac());
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    device::send_frame(&frame);
}

/// Dispatches one received frame by ethertype. Called once per complete
/// frame from the NIC's receive poll.
pub fn receive(frame: &[u8]) {
    if frame.len() < HEADER_LEN {
        return;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let payload = &frame[HEADER_LEN..];
    match ethertype {
        ETH_TYPE_ARP => {
            if let Some(callback) = *ARP_CALLBACK.lock() {
                callback(payload);
            }
        }
        ETH_TYPE_IPV4 => {
            if let Some(callback) = *IPV4_CALLBACK.lock() {
                callback(payload);
            }
        }
        _ => {}
    }
}

/// Drains the NIC's receive ring, dispatching each frame through
/// [`receive`]. Called from the bootstrap idle loop and from every coarse
/// wait operation (ICMP echo wait, TCP connect/recv) that needs to service
/// incoming frames while polling a condition.
pub fn poll_receive() {
    device::poll_receive(&mut receive);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::device::test_support::MockNic;

    #[test]
    fn short_frames_are_dropped() {
        init([1, 2, 3, 4, 5, 6]);
        set_arp_callback(|_payload| panic!("should not dispatch a short frame"));
        receive(&[0u8; HEADER_LEN - 1]);
    }

    #[test]
    fn dispatches_by_ethertype() {
        init([1, 2, 3, 4, 5, 6]);
        static mut SEEN: bool = false;
        set_ipv4_callback(|_payload| unsafe { SEEN = true });
        let mut frame = alloc::vec::Vec::new();
        frame.extend_from_slice(&[0xFF; 6]);
        frame.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        frame.extend_from_slice(&ETH_TYPE_IPV4.to_be_bytes());
        frame.extend_from_slice(&[0xAB, 0xCD]);
        receive(&frame);
        assert!(unsafe { SEEN });
    }

    #[test]
    fn send_prefixes_header_and_forwards_to_device() {
        init([1, 2, 3, 4, 5, 6]);
        // `register` needs a `'static` reference; leaking is the
        // straightforward way to get one in a test binary.
        let nic: &'static MockNic = alloc::boxed::Box::leak(alloc::boxed::Box::new(
            MockNic::new([1, 2, 3, 4, 5, 6]),
        ));
        device::register(nic);
        send([9, 9, 9, 9, 9, 9], ETH_TYPE_ARP, &[0xAA, 0xBB]);
        let sent = nic.outbound.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][0..6], &[9, 9, 9, 9, 9, 9]);
        assert_eq!(&sent[0][12..14], &ETH_TYPE_ARP.to_be_bytes());
    }
}
