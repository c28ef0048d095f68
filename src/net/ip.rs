//! IPv4 (C11), RFC 791 with no options (IHL fixed at 5). Grounded on
//! `drivers/network/ip.c`.

use super::{arp, internet_checksum, link, Ipv4Addr, IP_PROTO_ICMP, IP_PROTO_TCP};
use crate::arch::x86::cpu::without_interrupts;
use spin::Mutex;

pub const HEADER_LEN: usize = 20;
const VERSION_IHL: u8 = (4 << 4) | 5;
const DEFAULT_TTL: u8 = 64;

pub type ProtocolCallback = fn(&[u8], Ipv4Addr);

struct Config {
    local_ip: Ipv4Addr,
    netmask: Ipv4Addr,
    gateway: Ipv4Addr,
    next_id: u16,
}

static CONFIG: Mutex<Config> =
    Mutex::new(Config { local_ip: [0; 4], netmask: [0; 4], gateway: [0; 4], next_id: 0 });
static ICMP_CALLBACK: Mutex<Option<ProtocolCallback>> = Mutex::new(None);
static TCP_CALLBACK: Mutex<Option<ProtocolCallback>> = Mutex::new(None);

pub fn init(local_ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) {
    let mut config = CONFIG.lock();
    config.local_ip = local_ip;
    config.netmask = netmask;
    config.gateway = gateway;
    config.next_id = 0;
}

pub fn local_ip() -> Ipv4Addr {
    CONFIG.lock().local_ip
}

pub fn set_icmp_callback(callback: ProtocolCallback) {
    *ICMP_CALLBACK.lock() = Some(callback);
}

pub fn set_tcp_callback(callback: ProtocolCallback) {
    *TCP_CALLBACK.lock() = Some(callback);
}

fn same_subnet(a: Ipv4Addr, b: Ipv4Addr, netmask: Ipv4Addr) -> bool {
    (0..4).all(|i| a[i] & netmask[i] == b[i] & netmask[i])
}

fn next_id() -> u16 {
    without_interrupts(|| {
        let mut config = CONFIG.lock();
        let id = config.next_id;
        config.next_id = config.next_id.wrapping_add(1);
        id
    })
}

/// Builds an IPv4 header + payload, resolves the next hop's MAC via ARP,
/// and hands the packet to the link layer. On an ARP miss the payload is
/// dropped and a resolution request is issued instead — no queueing
/// (section 4.10's documented limitation).
pub fn send(dst: Ipv4Addr, protocol: u8, payload: &[u8]) {
    let (local, netmask, gateway) = {
        let config = CONFIG.lock();
        (config.local_ip, config.netmask, config.gateway)
    };

    let mut packet = alloc::vec::Vec::with_capacity(HEADER_LEN + payload.len());
    let total_length = (HEADER_LEN + payload.len()) as u16;
    let id = next_id();

    packet.push(VERSION_IHL);
    packet.push(0); // TOS
    packet.extend_from_slice(&total_length.to_be_bytes());
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes()); // flags/fragment offset
    packet.push(DEFAULT_TTL);
    packet.push(protocol);
    packet.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    packet.extend_from_slice(&local);
    packet.extend_from_slice(&dst);

    let checksum = internet_checksum(&packet[..HEADER_LEN]);
    packet[10..12].copy_from_slice(&checksum.to_be_bytes());
    packet.extend_from_slice(payload);

    let next_hop = if same_subnet(dst, local, netmask) { dst } else { gateway };

    match arp::lookup(next_hop) {
        Some(mac) => link::send(mac, super::ETH_TYPE_IPV4, &packet),
        None => arp::request(next_hop),
    }
}

/// Discards packets not addressed to the local IP (no multicast/broadcast
/// in this spec) and dispatches the remainder by protocol field.
pub fn receive(packet: &[u8]) {
    if packet.len() < HEADER_LEN {
        return;
    }
    let dst_ip: Ipv4Addr = packet[16..20].try_into().unwrap();
    if dst_ip != local_ip() {
        return;
    }
    let src_ip: Ipv4Addr = packet[12..16].try_into().unwrap();
    let total_length = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    let protocol = packet[9];
    let payload_end = total_length.min(packet.len());
    let payload = &packet[HEADER_LEN..payload_end.max(HEADER_LEN)];

    match protocol {
        IP_PROTO_ICMP => {
            if let Some(callback) = *ICMP_CALLBACK.lock() {
                callback(payload, src_ip);
            }
        }
        IP_PROTO_TCP => {
            if let Some(callback) = *TCP_CALLBACK.lock() {
                callback(payload, src_ip);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_checksum_validates_over_the_full_header() {
        init([10, 0, 2, 15], [255, 255, 255, 0], [10, 0, 2, 2]);
        let mut packet = alloc::vec::Vec::new();
        packet.push(VERSION_IHL);
        packet.push(0);
        packet.extend_from_slice(&(HEADER_LEN as u16).to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.push(DEFAULT_TTL);
        packet.push(IP_PROTO_ICMP);
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&[10, 0, 2, 15]);
        packet.extend_from_slice(&[10, 0, 2, 2]);
        let checksum = internet_checksum(&packet);
        packet[10..12].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(internet_checksum(&packet), 0);
    }

    #[test]
    fn same_subnet_destination_is_its_own_next_hop() {
        let netmask = [255, 255, 255, 0];
        assert!(same_subnet([10, 0, 2, 2], [10, 0, 2, 15], netmask));
        assert!(!same_subnet([10, 0, 3, 2], [10, 0, 2, 15], netmask));
    }

    #[test]
    fn packets_not_addressed_to_local_ip_are_dropped() {
        init([10, 0, 2, 15], [255, 255, 255, 0], [10, 0, 2, 2]);
        static mut CALLED: bool = false;
        set_icmp_callback(|_p, _s| unsafe { CALLED = true });
        let mut packet = alloc::vec![0u8; HEADER_LEN];
        packet[9] = IP_PROTO_ICMP;
        packet[16..20].copy_from_slice(&[10, 0, 2, 99]);
        receive(&packet);
        assert!(!unsafe { CALLED });
    }
}
