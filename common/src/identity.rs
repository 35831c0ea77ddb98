//! Socket identity model
//!
//! A [`SocketIdentifier`] names a local address/port tuple as it appears in
//! the kernel socket tables. Tuples are reused: a listener closed and bound
//! again keeps its identifier but gets a new inode. Overlaying the inode
//! yields a [`SocketInstanceId`] that names one lifetime of the socket.

use core::fmt;
use core::net::SocketAddr;

/// FNV-1a offset basis (64-bit)
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a prime (64-bit)
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Identifier of a local address/port tuple
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SocketIdentifier(pub u64);

impl SocketIdentifier {
    /// Identifier for an IPv4 tuple
    ///
    /// The address occupies the upper 32 bits and the port bits 16..32, so
    /// distinct tuples never collide.
    pub const fn from_ipv4(octets: [u8; 4], port: u16) -> Self {
        let address = u32::from_be_bytes(octets) as u64;
        Self((address << 32) | ((port as u64) << 16))
    }

    /// Identifier for an IPv6 tuple
    ///
    /// 144 bits do not fit, so the address and port are folded with FNV-1a.
    /// The fold is stable across runs.
    pub fn from_ipv6(octets: [u8; 16], port: u16) -> Self {
        let mut hash = FNV_OFFSET;
        for byte in octets.iter().chain(port.to_be_bytes().iter()) {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        Self(hash)
    }

    /// Identifier for a socket address
    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::from_ipv4(v4.ip().octets(), v4.port()),
            SocketAddr::V6(v6) => Self::from_ipv6(v6.ip().octets(), v6.port()),
        }
    }

    /// Combine with a kernel inode into an instance identifier
    #[inline]
    pub const fn overlay_inode(self, inode: u64) -> SocketInstanceId {
        SocketInstanceId::new(self, inode)
    }
}

/// Identifier of one socket instance
///
/// The transport identifier fills the upper 64 bits and the inode the lower
/// 64 bits. Both inputs are kept whole, so two instances are equal only if
/// both their tuple and their inode are equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SocketInstanceId(pub u128);

impl SocketInstanceId {
    /// Overlay an inode onto a transport identifier
    #[inline]
    pub const fn new(transport: SocketIdentifier, inode: u64) -> Self {
        Self(((transport.0 as u128) << 64) | inode as u128)
    }

    /// Transport identifier this instance was bound to
    #[inline]
    pub const fn transport(self) -> SocketIdentifier {
        SocketIdentifier((self.0 >> 64) as u64)
    }

    /// Kernel inode of this instance
    #[inline]
    pub const fn inode(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for SocketInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{}", self.transport().0, self.inode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

    #[test]
    fn test_overlay_is_injective_over_range() {
        // Transports and inodes drawn from disjoint ranges, including the
        // adjacent low bits that short-lived inode sequences produce.
        let transports = [
            SocketIdentifier::from_ipv4([127, 0, 0, 1], 8080),
            SocketIdentifier::from_ipv4([127, 0, 0, 1], 8081),
            SocketIdentifier::from_ipv4([10, 0, 0, 1], 8080),
            SocketIdentifier(1),
            SocketIdentifier(u64::MAX),
        ];
        let inodes = [0u64, 1, 2, 3, 16_107, 16_108, u32::MAX as u64, u64::MAX];

        for (t1, &transport_a) in transports.iter().enumerate() {
            for (i1, &inode_a) in inodes.iter().enumerate() {
                for (t2, &transport_b) in transports.iter().enumerate() {
                    for (i2, &inode_b) in inodes.iter().enumerate() {
                        let a = transport_a.overlay_inode(inode_a);
                        let b = transport_b.overlay_inode(inode_b);
                        assert_eq!(a == b, t1 == t2 && i1 == i2);
                    }
                }
            }
        }
    }

    #[test]
    fn test_overlay_roundtrips_components() {
        let transport = SocketIdentifier::from_ipv4([192, 168, 1, 20], 53);
        let instance = transport.overlay_inode(987_654);

        assert_eq!(instance.transport(), transport);
        assert_eq!(instance.inode(), 987_654);
    }

    #[test]
    fn test_reused_tuple_gets_new_instance() {
        let transport = SocketIdentifier::from_ipv4([0, 0, 0, 0], 9000);

        assert_ne!(transport.overlay_inode(41_000), transport.overlay_inode(41_001));
    }

    #[test]
    fn test_from_socket_addr() {
        let v4 = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 8080));
        assert_eq!(
            SocketIdentifier::from_socket_addr(&v4),
            SocketIdentifier(0x7f00_0001_1f90_0000)
        );

        let v6 = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 8080, 0, 0));
        assert_eq!(
            SocketIdentifier::from_socket_addr(&v6),
            SocketIdentifier::from_ipv6(Ipv6Addr::LOCALHOST.octets(), 8080)
        );
        assert_ne!(
            SocketIdentifier::from_ipv6(Ipv6Addr::LOCALHOST.octets(), 8080),
            SocketIdentifier::from_ipv6(Ipv6Addr::LOCALHOST.octets(), 8081)
        );
    }
}
