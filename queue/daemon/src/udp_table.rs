//! UDP socket table parsing
//!
//! Parses rows of `/proc/net/udp` and `/proc/net/udp6`:
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
//!    0: 0100007F:1F90 00000000:0000 07 00000000:00000000 00:00000000 00000000  1000        0 16107 2 ffff8a0c3e5e3000 0
//! ```
//!
//! Addresses and queues are hex, inode and drops are decimal. Column
//! positions come from a [`UdpTableLayout`] so an unexpected kernel format
//! is rejected instead of misread.

use crate::parse::{parse_decimal, parse_hex, Columns, RowError};
use anyhow::{ensure, Result};
use queue_probe_common::{
    constants::{
        MAX_COLUMNS, UDP_COLUMN_DROPS, UDP_COLUMN_INODE, UDP_COLUMN_LOCAL_ADDRESS,
        UDP_COLUMN_QUEUES, UDP_TABLE_COLUMNS,
    },
    SocketIdentifier, SocketInstanceId,
};
use serde::{Deserialize, Serialize};

/// Column positions of a socket table data row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpTableLayout {
    /// `local_address:port` column
    pub local_address: usize,
    /// `tx_queue:rx_queue` column
    pub queues: usize,
    /// Inode column
    pub inode: usize,
    /// Drop counter column
    pub drops: usize,
    /// Exact number of columns in a data row
    pub columns: usize,
}

impl Default for UdpTableLayout {
    fn default() -> Self {
        Self {
            local_address: UDP_COLUMN_LOCAL_ADDRESS,
            queues: UDP_COLUMN_QUEUES,
            inode: UDP_COLUMN_INODE,
            drops: UDP_COLUMN_DROPS,
            columns: UDP_TABLE_COLUMNS,
        }
    }
}

impl UdpTableLayout {
    /// Check that every column lies inside the row
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.columns <= MAX_COLUMNS,
            "socket table layout declares {} columns, at most {} are supported",
            self.columns,
            MAX_COLUMNS
        );
        for (name, column) in [
            ("local_address", self.local_address),
            ("queues", self.queues),
            ("inode", self.inode),
            ("drops", self.drops),
        ] {
            ensure!(
                column < self.columns,
                "socket table column {} = {} is outside a {}-column row",
                name,
                column,
                self.columns
            );
        }
        Ok(())
    }

    /// Whether `line` is a socket table header this layout can read
    ///
    /// The header must name the inode and drops columns; older kernels
    /// without per-socket drops are rejected.
    pub fn accepts_header(&self, line: &[u8]) -> bool {
        let columns = Columns::split(line);
        columns.get(0) == Some(&b"sl"[..])
            && columns.contains(b"inode")
            && columns.contains(b"drops")
    }

    /// Populate `entry` from one data row
    ///
    /// `entry` is reset first, so a failed parse leaves it zeroed.
    pub fn parse_row(&self, line: &[u8], entry: &mut BufferStatsEntry) -> Result<(), RowError> {
        entry.reset();

        let columns = Columns::split(line);
        if columns.len() != self.columns {
            return Err(RowError::ColumnCount {
                found: columns.len(),
                expected: self.columns,
            });
        }

        let field = |column: usize| columns.get(column).ok_or(RowError::InvalidField { column });
        let invalid = |column: usize| RowError::InvalidField { column };

        let socket_identifier = parse_local_address(field(self.local_address)?)
            .ok_or_else(|| invalid(self.local_address))?;
        let receive_queue_depth = field(self.queues)?
            .split(|&b| b == b':')
            .nth(1)
            .and_then(parse_hex)
            .ok_or_else(|| invalid(self.queues))?;
        let inode = parse_decimal(field(self.inode)?).ok_or_else(|| invalid(self.inode))?;
        let drops = parse_decimal(field(self.drops)?).ok_or_else(|| invalid(self.drops))?;

        entry.socket_identifier = socket_identifier;
        entry.inode = inode;
        entry.receive_queue_depth = receive_queue_depth;
        entry.drops = drops;
        Ok(())
    }
}

/// Decode a `local_address:port` column into a transport identifier
///
/// The kernel prints each 32-bit address word as a host-order integer, so
/// the bytes are recovered in native order.
pub fn parse_local_address(field: &[u8]) -> Option<SocketIdentifier> {
    let colon = field.iter().rposition(|&b| b == b':')?;
    let (address, port) = (&field[..colon], &field[colon + 1..]);
    let port = u16::try_from(parse_hex(port)?).ok()?;

    match address.len() {
        8 => {
            let word = u32::try_from(parse_hex(address)?).ok()?;
            Some(SocketIdentifier::from_ipv4(word.to_ne_bytes(), port))
        }
        32 => {
            let mut octets = [0u8; 16];
            for (chunk, out) in address.chunks(8).zip(octets.chunks_mut(4)) {
                let word = u32::try_from(parse_hex(chunk)?).ok()?;
                out.copy_from_slice(&word.to_ne_bytes());
            }
            Some(SocketIdentifier::from_ipv6(octets, port))
        }
        _ => None,
    }
}

/// One socket table row
///
/// A monitor keeps a single entry and repopulates it for every row; copy the
/// values out before parsing the next row.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatsEntry {
    socket_identifier: SocketIdentifier,
    inode: u64,
    receive_queue_depth: u64,
    drops: u64,
}

impl BufferStatsEntry {
    pub fn socket_identifier(&self) -> SocketIdentifier {
        self.socket_identifier
    }

    pub fn socket_instance_identifier(&self) -> SocketInstanceId {
        self.socket_identifier.overlay_inode(self.inode)
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn receive_queue_depth(&self) -> u64 {
        self.receive_queue_depth
    }

    pub fn drops(&self) -> u64 {
        self.drops
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Socket table rows for tests across the crate
#[cfg(test)]
pub(crate) mod fixture {
    pub const HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops";

    /// Data row with the local address given as the kernel's hex word
    pub fn row(slot: usize, local: &str, rx_queue: u64, inode: u64, drops: u64) -> String {
        format!(
            "{:>5}: {} 00000000:0000 07 00000000:{:08X} 00:00000000 00000000  1000        0 {} 2 ffff8a0c3e5e3000 {}",
            slot, local, rx_queue, inode, drops
        )
    }

    pub fn table(rows: &[String]) -> String {
        let mut table = String::from(HEADER);
        table.push('\n');
        for row in rows {
            table.push_str(row);
            table.push('\n');
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;
    use std::net::{Ipv6Addr, SocketAddr};

    fn localhost_hex() -> String {
        format!("{:08X}", u32::from_ne_bytes([127, 0, 0, 1]))
    }

    #[test]
    fn test_parse_row() {
        let layout = UdpTableLayout::default();
        let line = row(0, &format!("{}:1F90", localhost_hex()), 0x300, 16_107, 42);

        let mut entry = BufferStatsEntry::default();
        layout.parse_row(line.as_bytes(), &mut entry).unwrap();

        let expected: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(entry.socket_identifier(), SocketIdentifier::from_socket_addr(&expected));
        assert_eq!(entry.inode(), 16_107);
        assert_eq!(entry.receive_queue_depth(), 0x300);
        assert_eq!(entry.drops(), 42);
        assert_eq!(
            entry.socket_instance_identifier(),
            SocketIdentifier::from_socket_addr(&expected).overlay_inode(16_107)
        );
    }

    #[test]
    fn test_parse_row_missing_drops_column() {
        let layout = UdpTableLayout::default();
        let line = row(1, "00000000:0044", 0, 9, 0);
        let truncated = line.rsplit_once(' ').unwrap().0;

        let mut entry = BufferStatsEntry::default();
        let err = layout.parse_row(truncated.as_bytes(), &mut entry).unwrap_err();

        assert_eq!(err, RowError::ColumnCount { found: 12, expected: 13 });
        assert_eq!(entry, BufferStatsEntry::default());
    }

    #[test]
    fn test_parse_row_non_numeric_inode() {
        let layout = UdpTableLayout::default();
        let line = row(2, "00000000:0044", 0, 9, 0).replace(" 9 2 ", " nine 2 ");

        let mut entry = BufferStatsEntry::default();
        let err = layout.parse_row(line.as_bytes(), &mut entry).unwrap_err();

        assert_eq!(err, RowError::InvalidField { column: 9 });
    }

    #[test]
    fn test_parse_ipv6_local_address() {
        // ::1 prints as three zero words and a host-order 1 in the last byte
        let last = format!("{:08X}", u32::from_ne_bytes([0, 0, 0, 1]));
        let field = format!("{}{}:1F90", "0".repeat(24), last);

        assert_eq!(
            parse_local_address(field.as_bytes()),
            Some(SocketIdentifier::from_ipv6(Ipv6Addr::LOCALHOST.octets(), 8080))
        );
    }

    #[test]
    fn test_parse_local_address_rejects_garbage() {
        assert_eq!(parse_local_address(b"0100007F"), None);
        assert_eq!(parse_local_address(b"0100007F:XYZ0"), None);
        assert_eq!(parse_local_address(b"00007F:1F90"), None);
        assert_eq!(parse_local_address(b"0100007F:10000"), None);
    }

    #[test]
    fn test_header_detection() {
        let layout = UdpTableLayout::default();

        assert!(layout.accepts_header(HEADER.as_bytes()));
        assert!(!layout.accepts_header(b"  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode"));
        assert!(!layout.accepts_header(row(0, "00000000:0044", 0, 1, 0).as_bytes()));
    }

    #[test]
    fn test_layout_validation() {
        assert!(UdpTableLayout::default().validate().is_ok());

        let layout = UdpTableLayout {
            drops: 13,
            ..UdpTableLayout::default()
        };
        assert!(layout.validate().is_err());
    }
}
