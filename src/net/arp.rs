//! ARP (C11), RFC 826 with hardware type 1 / protocol type 0x0800.
//! Grounded on `drivers/network/arp.c`. Cache replacement policy:
//! first-empty-slot on insert; a full cache silently drops new mappings
//! (documented limitation, section 3).

use super::{link, Ipv4Addr, MacAddr, BROADCAST_MAC, ETH_TYPE_ARP};
use crate::arch::x86::cpu::without_interrupts;
use spin::Mutex;

pub const CACHE_SIZE: usize = 8;
const PACKET_LEN: usize = 28;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const OP_REQUEST: u16 = 1;
const OP_REPLY: u16 = 2;

#[derive(Clone, Copy)]
struct Entry {
    ip: Ipv4Addr,
    mac: MacAddr,
    valid: bool,
}

impl Entry {
    const fn empty() -> Self {
        Entry { ip: [0; 4], mac: [0; 6], valid: false }
    }
}

struct Cache {
    entries: [Entry; CACHE_SIZE],
    local_ip: Ipv4Addr,
}

static CACHE: Mutex<Cache> =
    Mutex::new(Cache { entries: [Entry::empty(); CACHE_SIZE], local_ip: [0; 4] });

pub fn init(local_ip: Ipv4Addr) {
    let mut cache = CACHE.lock();
    cache.local_ip = local_ip;
    cache.entries = [Entry::empty(); CACHE_SIZE];
}

fn encode(op: u16, sender_ip: Ipv4Addr, sender_mac: MacAddr, target_ip: Ipv4Addr, target_mac: MacAddr) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
    packet[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
    packet[4] = 6;
    packet[5] = 4;
    packet[6..8].copy_from_slice(&op.to_be_bytes());
    packet[8..14].copy_from_slice(&sender_mac);
    packet[14..18].copy_from_slice(&sender_ip);
    packet[18..24].copy_from_slice(&target_mac);
    packet[24..28].copy_from_slice(&target_ip);
    packet
}

/// Broadcasts an ARP-who-has for `ip`.
pub fn request(ip: Ipv4Addr) {
    let local_ip = CACHE.lock().local_ip;
    let local_mac = link::local_mac();
    let packet = encode(OP_REQUEST, local_ip, local_mac, ip, [0; 6]);
    link::send(BROADCAST_MAC, ETH_TYPE_ARP, &packet);
}

/// Returns the cached MAC for `ip`, if any.
pub fn lookup(ip: Ipv4Addr) -> Option<MacAddr> {
    without_interrupts(|| {
        CACHE.lock().entries.iter().find(|e| e.valid && e.ip == ip).map(|e| e.mac)
    })
}

fn insert(ip: Ipv4Addr, mac: MacAddr) {
    let mut cache = CACHE.lock();
    if cache.entries.iter().any(|e| e.valid && e.ip == ip) {
        return;
    }
    if let Some(slot) = cache.entries.iter_mut().find(|e| !e.valid) {
        *slot = Entry { ip, mac, valid: true };
    }
    // Full cache: silently drops the new mapping (documented limitation).
}

/// Handles an inbound ARP packet: inserts the sender into the cache (P8)
/// and, for a request targeting the local IP, emits a reply.
pub fn receive(packet: &[u8]) {
    if packet.len() < PACKET_LEN {
        return;
    }
    let op = u16::from_be_bytes([packet[6], packet[7]]);
    let sender_mac: MacAddr = packet[8..14].try_into().unwrap();
    let sender_ip: Ipv4Addr = packet[14..18].try_into().unwrap();
    let target_ip: Ipv4Addr = packet[24..28].try_into().unwrap();

    let local_ip = CACHE.lock().local_ip;
    if target_ip != local_ip {
        return;
    }

    insert(sender_ip, sender_mac);

    if op == OP_REQUEST {
        let local_mac = link::local_mac();
        let reply = encode(OP_REPLY, local_ip, local_mac, sender_ip, sender_mac);
        link::send(sender_mac, ETH_TYPE_ARP, &reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_to_local_ip_is_cached_and_answered() {
        init([10, 0, 2, 15]);
        link::init([0xAA; 6]);
        let packet = encode(OP_REQUEST, [10, 0, 2, 2], [0xBB; 6], [10, 0, 2, 15], [0; 6]);
        receive(&packet);
        assert_eq!(lookup([10, 0, 2, 2]), Some([0xBB; 6]));
    }

    #[test]
    fn reply_not_targeting_local_ip_is_ignored() {
        init([10, 0, 2, 15]);
        let packet = encode(OP_REPLY, [10, 0, 2, 2], [0xCC; 6], [10, 0, 2, 99], [0xAA; 6]);
        receive(&packet);
        assert_eq!(lookup([10, 0, 2, 2]), None);
    }

    #[test]
    fn full_cache_silently_drops_new_mappings() {
        init([10, 0, 2, 15]);
        for i in 0..CACHE_SIZE as u8 {
            insert([10, 0, 2, i], [i; 6]);
        }
        insert([10, 0, 2, 200], [0xEE; 6]);
        assert_eq!(lookup([10, 0, 2, 200]), None);
        // Existing entries survive the dropped insert.
        assert_eq!(lookup([10, 0, 2, 0]), Some([0; 6]));
    }

    #[test]
    fn second_sighting_of_a_known_ip_does_not_duplicate_or_evict() {
        init([10, 0, 2, 15]);
        insert([10, 0, 2, 5], [1; 6]);
        insert([10, 0, 2, 5], [2; 6]);
        assert_eq!(lookup([10, 0, 2, 5]), Some([1; 6]), "P8: existing mapping is not overwritten");
    }
}
