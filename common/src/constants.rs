//! Shared constants for the kernel monitors
//!
//! Pseudo-file locations are relative to the proc root so monitors can be
//! pointed at fixture trees.

// ============================================================================
// Pseudo-file Paths (relative to the proc root)
// ============================================================================

/// Default proc filesystem mount point
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Descriptor directory of the calling process
pub const SELF_FD_DIR: &str = "self/fd";

/// IPv4 UDP socket table
pub const UDP_TABLE: &str = "net/udp";

/// IPv6 UDP socket table
pub const UDP6_TABLE: &str = "net/udp6";

/// Per-CPU softnet statistics
pub const SOFTNET_STAT: &str = "net/softnet_stat";

// ============================================================================
// Descriptor Link Naming
// ============================================================================

/// Prefix of a descriptor link target that names a socket
pub const SOCKET_LINK_PREFIX: &[u8] = b"socket:[";

/// Terminator of a socket link target
pub const SOCKET_LINK_SUFFIX: u8 = b']';

// ============================================================================
// Socket Table Layout (Linux /proc/net/udp)
// ============================================================================

/// Column holding `local_address:port`
pub const UDP_COLUMN_LOCAL_ADDRESS: usize = 1;

/// Column holding `tx_queue:rx_queue`
pub const UDP_COLUMN_QUEUES: usize = 4;

/// Column holding the socket inode
pub const UDP_COLUMN_INODE: usize = 9;

/// Column holding the drop counter
pub const UDP_COLUMN_DROPS: usize = 12;

/// Number of whitespace-separated columns in a data row
pub const UDP_TABLE_COLUMNS: usize = 13;

// ============================================================================
// Softnet Layout (Linux /proc/net/softnet_stat)
// ============================================================================

/// Column holding the time-squeeze counter
pub const SOFTNET_COLUMN_TIME_SQUEEZE: usize = 2;

/// Fewest columns any supported kernel prints per CPU row
pub const SOFTNET_MIN_COLUMNS: usize = 9;

// ============================================================================
// Buffers
// ============================================================================

/// Initial read buffer for socket tables
pub const SOCKET_TABLE_BUFFER: usize = 64 * 1024;

/// Initial read buffer for softnet statistics
pub const SOFTNET_BUFFER: usize = 4 * 1024;

/// Upper bound on columns inspected per row
pub const MAX_COLUMNS: usize = 32;

// ============================================================================
// Workload
// ============================================================================

/// Sequence number plus send timestamp
pub const MESSAGE_HEADER_LEN: usize = 16;
