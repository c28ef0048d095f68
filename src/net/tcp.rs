//! TCP client, at most one active connection (C11), RFC 793 limited to
//! the subset in section 4.10. Grounded on `drivers/network/tcp.c` and
//! `include/tcp.h`. No retransmission, no real window management beyond
//! advertising a fixed 8192, sequence arithmetic is modular `u32`.

use super::{internet_checksum, ip, Ipv4Addr};
use crate::lib::error::KernelError;
use crate::time;
use alloc::vec::Vec;
use spin::Mutex;

pub const HEADER_LEN: usize = 20;
pub const RECV_BUFFER_LEN: usize = 2048;
const WINDOW: u16 = 8192;
const EPHEMERAL_PORT_BASE: u16 = 49152;
const HANDSHAKE_TIMEOUT_TICKS: u64 = 300; // 3s at 100Hz
const TEST_CONNECTION_PORT: u16 = 80;

const FLAG_FIN: u8 = 0x01;
const FLAG_SYN: u8 = 0x02;
const FLAG_PSH: u8 = 0x08;
const FLAG_ACK: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    SynSent,
    Established,
    FinWait,
    CloseWait,
}

struct Connection {
    remote_ip: Ipv4Addr,
    local_port: u16,
    remote_port: u16,
    seq_num: u32,
    ack_num: u32,
    state: State,
    recv_buffer: [u8; RECV_BUFFER_LEN],
    recv_len: usize,
    data_ready: bool,
}

impl Connection {
    const fn closed() -> Self {
        Connection {
            remote_ip: [0; 4],
            local_port: 0,
            remote_port: 0,
            seq_num: 0,
            ack_num: 0,
            state: State::Closed,
            recv_buffer: [0; RECV_BUFFER_LEN],
            recv_len: 0,
            data_ready: false,
        }
    }
}

struct Tcp {
    conn: Connection,
    next_local_port: u16,
}

static TCP: Mutex<Tcp> = Mutex::new(Tcp { conn: Connection::closed(), next_local_port: EPHEMERAL_PORT_BASE });

pub fn init() {
    let mut tcp = TCP.lock();
    tcp.conn = Connection::closed();
    tcp.next_local_port = EPHEMERAL_PORT_BASE;
}

pub fn state() -> State {
    TCP.lock().conn.state
}

fn pseudo_header_checksum(local_ip: Ipv4Addr, remote_ip: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(12 + segment.len());
    buf.extend_from_slice(&local_ip);
    buf.extend_from_slice(&remote_ip);
    buf.push(0);
    buf.push(super::IP_PROTO_TCP);
    buf.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    buf.extend_from_slice(segment);
    internet_checksum(&buf)
}

fn build_segment(conn: &Connection, flags: u8, data: &[u8]) -> Vec<u8> {
    let mut segment = Vec::with_capacity(HEADER_LEN + data.len());
    segment.extend_from_slice(&conn.local_port.to_be_bytes());
    segment.extend_from_slice(&conn.remote_port.to_be_bytes());
    segment.extend_from_slice(&conn.seq_num.to_be_bytes());
    segment.extend_from_slice(&conn.ack_num.to_be_bytes());
    segment.push(5 << 4);
    segment.push(flags);
    segment.extend_from_slice(&WINDOW.to_be_bytes());
    segment.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    segment.extend_from_slice(&0u16.to_be_bytes()); // urgent pointer
    segment.extend_from_slice(data);

    let checksum = pseudo_header_checksum(ip::local_ip(), conn.remote_ip, &segment);
    segment[16..18].copy_from_slice(&checksum.to_be_bytes());
    segment
}

fn send_segment(conn: &Connection, flags: u8, data: &[u8]) {
    let segment = build_segment(conn, flags, data);
    ip::send(conn.remote_ip, super::IP_PROTO_TCP, &segment);
}

/// Derives an initial sequence number from the tick counter (C10); true
/// randomness is not required by section 4.10.
fn initial_sequence_number() -> u32 {
    (time::ticks().wrapping_mul(12345)) as u32
}

/// `connect`: sends SYN, then polls NIC receive until the state reaches
/// `established` or the handshake timeout elapses.
pub fn connect(ip: Ipv4Addr, port: u16) -> Result<(), KernelError> {
    {
        let mut tcp = TCP.lock();
        let local_port = tcp.next_local_port;
        tcp.next_local_port = tcp.next_local_port.wrapping_add(1);
        tcp.conn = Connection {
            remote_ip: ip,
            local_port,
            remote_port: port,
            seq_num: initial_sequence_number(),
            ack_num: 0,
            state: State::SynSent,
            recv_buffer: [0; RECV_BUFFER_LEN],
            recv_len: 0,
            data_ready: false,
        };
        send_segment(&tcp.conn, FLAG_SYN, &[]);
        tcp.conn.seq_num = tcp.conn.seq_num.wrapping_add(1);
    }

    let deadline = time::ticks() + HANDSHAKE_TIMEOUT_TICKS;
    loop {
        super::link::poll_receive();
        if state() == State::Established {
            return Ok(());
        }
        if time::ticks() >= deadline {
            TCP.lock().conn.state = State::Closed;
            return Err(KernelError::TimedOut);
        }
        crate::arch::x86::cpu::halt();
    }
}

/// `send`: emits one PSH|ACK segment and advances the local sequence
/// number by the payload length.
pub fn send(data: &[u8]) -> Result<usize, KernelError> {
    let mut tcp = TCP.lock();
    if tcp.conn.state != State::Established {
        return Err(KernelError::WrongConnectionState);
    }
    send_segment(&tcp.conn, FLAG_PSH | FLAG_ACK, data);
    tcp.conn.seq_num = tcp.conn.seq_num.wrapping_add(data.len() as u32);
    Ok(data.len())
}

/// `recv`: polls the NIC once, then drains whatever is in the receive
/// buffer non-blockingly.
pub fn recv(buffer: &mut [u8]) -> usize {
    super::link::poll_receive();
    let mut tcp = TCP.lock();
    if !tcp.conn.data_ready || tcp.conn.recv_len == 0 {
        return 0;
    }
    let copy_len = tcp.conn.recv_len.min(buffer.len());
    buffer[..copy_len].copy_from_slice(&tcp.conn.recv_buffer[..copy_len]);
    tcp.conn.recv_len = 0;
    tcp.conn.data_ready = false;
    copy_len
}

/// `close`: emits FIN|ACK and marks the connection closed.
pub fn close() {
    let mut tcp = TCP.lock();
    if tcp.conn.state == State::Closed {
        return;
    }
    send_segment(&tcp.conn, FLAG_FIN | FLAG_ACK, &[]);
    tcp.conn.state = State::Closed;
}

/// Dispatched from the IP layer for inbound TCP segments. Segments not
/// matching the active connection's four-tuple are dropped.
pub fn receive(packet: &[u8], src_ip: Ipv4Addr) {
    if packet.len() < HEADER_LEN {
        return;
    }
    let mut tcp = TCP.lock();
    if tcp.conn.state == State::Closed {
        return;
    }

    let src_port = u16::from_be_bytes([packet[0], packet[1]]);
    let dst_port = u16::from_be_bytes([packet[2], packet[3]]);
    if src_ip != tcp.conn.remote_ip || src_port != tcp.conn.remote_port || dst_port != tcp.conn.local_port {
        return;
    }

    let seq = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
    let flags = packet[13];
    let header_len = ((packet[12] >> 4) as usize) * 4;
    let data = if packet.len() > header_len { &packet[header_len..] } else { &[][..] };

    match tcp.conn.state {
        State::SynSent => {
            if flags & FLAG_SYN != 0 && flags & FLAG_ACK != 0 {
                tcp.conn.ack_num = seq.wrapping_add(1);
                tcp.conn.state = State::Established;
                send_segment(&tcp.conn, FLAG_ACK, &[]);
            }
        }
        State::Established => {
            if !data.is_empty() {
                let copy_len = data.len().min(RECV_BUFFER_LEN);
                tcp.conn.recv_buffer[..copy_len].copy_from_slice(&data[..copy_len]);
                tcp.conn.recv_len = copy_len;
                tcp.conn.data_ready = true;
                tcp.conn.ack_num = seq.wrapping_add(data.len() as u32);
                send_segment(&tcp.conn, FLAG_ACK, &[]);
            }
            if flags & FLAG_FIN != 0 {
                tcp.conn.ack_num = seq.wrapping_add(1);
                send_segment(&tcp.conn, FLAG_ACK, &[]);
                tcp.conn.state = State::Closed;
            }
        }
        _ => {}
    }
}

/// Convenience operation: connects to port 80, emits a fixed minimal
/// HTTP/1.0 GET, and waits up to 3 seconds for any inbound data.
/// Returns `Ok(true)` on data, `Ok(false)` on timeout-with-connect, `Err`
/// on connect failure.
pub fn test_connection(ip: Ipv4Addr) -> Result<bool, KernelError> {
    connect(ip, TEST_CONNECTION_PORT)?;
    let _ = send(b"GET / HTTP/1.0\r\n\r\n");

    let deadline = time::ticks() + HANDSHAKE_TIMEOUT_TICKS;
    let mut buffer = [0u8; 512];
    loop {
        if recv(&mut buffer) > 0 {
            close();
            return Ok(true);
        }
        if time::ticks() >= deadline {
            close();
            return Ok(false);
        }
        crate::arch::x86::cpu::halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        init();
        ip::init([10, 0, 2, 15], [255, 255, 255, 0], [10, 0, 2, 2]);
        super::super::link::init([1, 2, 3, 4, 5, 6]);
    }

    fn syn_ack_from_peer(local_port: u16, peer_seq: u32) -> Vec<u8> {
        let mut segment = Vec::new();
        segment.extend_from_slice(&TEST_CONNECTION_PORT.to_be_bytes());
        segment.extend_from_slice(&local_port.to_be_bytes());
        segment.extend_from_slice(&peer_seq.to_be_bytes());
        segment.extend_from_slice(&0u32.to_be_bytes());
        segment.push(5 << 4);
        segment.push(FLAG_SYN | FLAG_ACK);
        segment.extend_from_slice(&WINDOW.to_be_bytes());
        segment.extend_from_slice(&0u16.to_be_bytes());
        segment.extend_from_slice(&0u16.to_be_bytes());
        segment
    }

    #[test]
    fn syn_ack_transitions_syn_sent_to_established() {
        setup();
        {
            let mut tcp = TCP.lock();
            tcp.conn.state = State::SynSent;
            tcp.conn.remote_ip = [10, 0, 2, 2];
            tcp.conn.remote_port = TEST_CONNECTION_PORT;
            tcp.conn.local_port = 49200;
        }
        let segment = syn_ack_from_peer(49200, 555);
        receive(&segment, [10, 0, 2, 2]);
        let tcp = TCP.lock();
        assert_eq!(tcp.conn.state, State::Established);
        assert_eq!(tcp.conn.ack_num, 556);
    }

    #[test]
    fn unrelated_segment_is_dropped() {
        setup();
        {
            let mut tcp = TCP.lock();
            tcp.conn.state = State::Established;
            tcp.conn.remote_ip = [10, 0, 2, 2];
            tcp.conn.remote_port = TEST_CONNECTION_PORT;
            tcp.conn.local_port = 49200;
        }
        let mut unrelated = syn_ack_from_peer(1234, 1);
        unrelated[1..3].copy_from_slice(&9999u16.to_be_bytes());
        receive(&unrelated, [10, 0, 2, 9]);
        let tcp = TCP.lock();
        assert_eq!(tcp.conn.state, State::Established, "unrelated four-tuple must not perturb state");
    }

    #[test]
    fn send_before_established_is_rejected() {
        setup();
        assert_eq!(send(b"hi"), Err(KernelError::WrongConnectionState));
    }

    #[test]
    fn established_data_segment_is_buffered_and_acked() {
        setup();
        {
            let mut tcp = TCP.lock();
            tcp.conn.state = State::Established;
            tcp.conn.remote_ip = [10, 0, 2, 2];
            tcp.conn.remote_port = TEST_CONNECTION_PORT;
            tcp.conn.local_port = 49200;
            tcp.conn.ack_num = 1000;
        }
        let mut segment = Vec::new();
        segment.extend_from_slice(&TEST_CONNECTION_PORT.to_be_bytes());
        segment.extend_from_slice(&49200u16.to_be_bytes());
        segment.extend_from_slice(&1000u32.to_be_bytes());
        segment.extend_from_slice(&0u32.to_be_bytes());
        segment.push(5 << 4);
        segment.push(FLAG_PSH | FLAG_ACK);
        segment.extend_from_slice(&WINDOW.to_be_bytes());
        segment.extend_from_slice(&0u16.to_be_bytes());
        segment.extend_from_slice(&0u16.to_be_bytes());
        segment.extend_from_slice(b"payload");
        receive(&segment, [10, 0, 2, 2]);

        let mut out = [0u8; 16];
        let n = recv(&mut out);
        assert_eq!(&out[..n], b"payload");
    }
}
