//! Compiled-in network configuration (DHCP is out of scope, section 1).
//! The `qemu` feature selects the address triple the test harness and the
//! scenario in section 8 item 5/6 expect; a non-`qemu` build leaves the
//! stack configured to all-zeros, which resolves no routes and simply
//! drops everything it tries to send — acceptable since this kernel has
//! no other address source.

use super::Ipv4Addr;

#[cfg(feature = "qemu")]
pub const LOCAL_IP: Ipv4Addr = [10, 0, 2, 15];
#[cfg(feature = "qemu")]
pub const NETMASK: Ipv4Addr = [255, 255, 255, 0];
#[cfg(feature = "qemu")]
pub const GATEWAY: Ipv4Addr = [10, 0, 2, 2];

#[cfg(not(feature = "qemu"))]
pub const LOCAL_IP: Ipv4Addr = [0, 0, 0, 0];
#[cfg(not(feature = "qemu"))]
pub const NETMASK: Ipv4Addr = [0, 0, 0, 0];
#[cfg(not(feature = "qemu"))]
pub const GATEWAY: Ipv4Addr = [0, 0, 0, 0];
