//! Kernel receive-buffer depth monitor
//!
//! Each tick refreshes the set of socket inodes this process owns, then reads
//! the UDP socket table and reports receive-queue depth and drops for every
//! row whose inode is owned. The two reads are not atomic: a socket closed in
//! between is missing from that tick's reports.
//!
//! Reports are staged for the whole tick and reach the sink only once every
//! table has been read, so a failed tick reports nothing.

use crate::{
    ownership::{refresh_owned_inodes, DescriptorDirectory, FdDirectory},
    pseudo_file::{LineSplitter, PseudoFileReader},
    report::{BufferDepthSink, KernelMonitor},
    udp_table::{BufferStatsEntry, UdpTableLayout},
};
use anyhow::{bail, Context, Result};
use log::warn;
use queue_probe_common::{
    constants::{SELF_FD_DIR, SOCKET_TABLE_BUFFER, UDP6_TABLE, UDP_TABLE},
    BufferDepthReport, SocketIdentifier,
};
use std::{
    collections::HashSet,
    net::SocketAddr,
    path::{Path, PathBuf},
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Header {
    Pending,
    Accepted,
    Rejected,
}

/// Reports buffer depth of sockets owned by this process
pub struct KernelBufferDepthMonitor<S, D = FdDirectory> {
    proc_root: PathBuf,
    tables: Vec<PseudoFileReader>,
    layout: UdpTableLayout,
    descriptors: D,
    owned: HashSet<u64>,
    entry: BufferStatsEntry,
    line: Vec<u8>,
    target: Option<SocketIdentifier>,
    pending: Vec<BufferDepthReport>,
    sink: S,
    skipped_rows: u64,
}

impl<S: BufferDepthSink> KernelBufferDepthMonitor<S, FdDirectory> {
    /// Monitor the IPv4 table under `proc_root`, resolving ownership from
    /// `<proc_root>/self/fd`
    pub fn new(proc_root: &Path, layout: UdpTableLayout, sink: S) -> Self {
        let descriptors = FdDirectory::new(proc_root.join(SELF_FD_DIR));
        Self::with_descriptors(proc_root, layout, descriptors, sink)
    }
}

impl<S: BufferDepthSink, D: DescriptorDirectory> KernelBufferDepthMonitor<S, D> {
    /// Monitor the IPv4 table, resolving ownership from `descriptors`
    pub fn with_descriptors(proc_root: &Path, layout: UdpTableLayout, descriptors: D, sink: S) -> Self {
        Self {
            proc_root: proc_root.to_path_buf(),
            tables: vec![table_reader(proc_root, UDP_TABLE)],
            layout,
            descriptors,
            owned: HashSet::new(),
            entry: BufferStatsEntry::default(),
            line: Vec::with_capacity(256),
            target: None,
            pending: Vec::new(),
            sink,
            skipped_rows: 0,
        }
    }

    /// Report only sockets bound to `addr`
    ///
    /// Selects the table matching the address family.
    pub fn with_target(mut self, addr: SocketAddr) -> Self {
        let table = match addr {
            SocketAddr::V4(_) => UDP_TABLE,
            SocketAddr::V6(_) => UDP6_TABLE,
        };
        self.tables = vec![table_reader(&self.proc_root, table)];
        self.target = Some(SocketIdentifier::from_socket_addr(&addr));
        self
    }

    /// Also read the IPv6 table
    pub fn with_ipv6_table(mut self) -> Self {
        if !self.tables.iter().any(|t| t.path().ends_with(UDP6_TABLE)) {
            self.tables.push(table_reader(&self.proc_root, UDP6_TABLE));
        }
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Rows skipped as malformed since creation
    pub fn skipped_rows(&self) -> u64 {
        self.skipped_rows
    }

    /// Refresh ownership, then scan every table and report owned sockets
    pub fn report(&mut self) -> Result<()> {
        let Self {
            tables,
            layout,
            descriptors,
            owned,
            entry,
            line,
            target,
            pending,
            sink,
            skipped_rows,
            ..
        } = self;

        pending.clear();
        refresh_owned_inodes(descriptors, owned)
            .context("Failed to scan descriptors for owned sockets")?;

        for reader in tables.iter_mut() {
            let mut header = Header::Pending;
            let outcome = {
                let mut splitter = LineSplitter::new(line, |row: &[u8]| match header {
                    Header::Pending => {
                        header = if layout.accepts_header(row) {
                            Header::Accepted
                        } else {
                            Header::Rejected
                        };
                    }
                    Header::Rejected => {}
                    Header::Accepted => {
                        if row.iter().all(u8::is_ascii_whitespace) {
                            return;
                        }
                        if let Err(e) = layout.parse_row(row, entry) {
                            *skipped_rows += 1;
                            warn!("Skipping socket table row {:?}: {}", String::from_utf8_lossy(row), e);
                            return;
                        }
                        if !owned.contains(&entry.inode()) {
                            return;
                        }
                        if target.is_some_and(|t| t != entry.socket_identifier()) {
                            return;
                        }
                        pending.push(BufferDepthReport {
                            instance: entry.socket_instance_identifier(),
                            receive_queue_depth: entry.receive_queue_depth(),
                            drops: entry.drops(),
                        });
                    }
                });
                reader.run(&mut splitter)
            };

            outcome.with_context(|| format!("Failed to read socket table {:?}", reader.path()))?;
            match header {
                Header::Accepted => {}
                Header::Pending => bail!("Socket table {:?} is empty", reader.path()),
                Header::Rejected => bail!(
                    "Socket table {:?} has an unrecognised header, expected inode and drops columns",
                    reader.path()
                ),
            }
        }

        for report in pending.iter() {
            sink.on_buffer_depth(report);
        }
        Ok(())
    }
}

impl<S, D> KernelMonitor for KernelBufferDepthMonitor<S, D>
where
    S: BufferDepthSink,
    D: DescriptorDirectory,
{
    fn name(&self) -> &'static str {
        "buffer-depth"
    }

    fn report(&mut self) -> Result<()> {
        KernelBufferDepthMonitor::report(self)
    }
}

fn table_reader(proc_root: &Path, table: &str) -> PseudoFileReader {
    PseudoFileReader::new(proc_root.join(table), SOCKET_TABLE_BUFFER)
}
