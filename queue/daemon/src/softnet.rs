//! Soft-IRQ time-squeeze monitor
//!
//! `/proc/net/softnet_stat` has one row of hex counters per CPU. The third
//! column counts how often the receive softirq ran out of budget before the
//! backlog was drained:
//!
//! ```text
//! 00015c73 00020e76 f0000769 00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000
//! ```
//!
//! Rows are reported by position. Newer kernels append the CPU id, but the
//! row index is used throughout so older kernels report the same way.
//! Rows reach the sink only after the whole file has been read.

use crate::{
    parse::{parse_hex, Columns, RowError},
    pseudo_file::{LineSplitter, PseudoFileReader},
    report::{KernelMonitor, TimeSqueezeSink},
};
use anyhow::{ensure, Context, Result};
use log::warn;
use queue_probe_common::{
    constants::{MAX_COLUMNS, SOFTNET_BUFFER, SOFTNET_COLUMN_TIME_SQUEEZE, SOFTNET_MIN_COLUMNS, SOFTNET_STAT},
    TimeSqueezeReport,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column positions of a softnet row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftnetLayout {
    /// Time-squeeze column
    pub time_squeeze: usize,
    /// Rows with fewer columns are skipped
    pub min_columns: usize,
}

impl Default for SoftnetLayout {
    fn default() -> Self {
        Self {
            time_squeeze: SOFTNET_COLUMN_TIME_SQUEEZE,
            min_columns: SOFTNET_MIN_COLUMNS,
        }
    }
}

impl SoftnetLayout {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.time_squeeze < self.min_columns,
            "softnet time_squeeze column {} is outside a {}-column row",
            self.time_squeeze,
            self.min_columns
        );
        ensure!(
            self.time_squeeze < MAX_COLUMNS,
            "softnet time_squeeze column {} exceeds the {} supported columns",
            self.time_squeeze,
            MAX_COLUMNS
        );
        Ok(())
    }

    /// Time-squeeze counter of one row
    pub fn parse_row(&self, line: &[u8]) -> Result<u64, RowError> {
        let columns = Columns::split(line);
        if columns.len() < self.min_columns {
            return Err(RowError::ColumnCount {
                found: columns.len(),
                expected: self.min_columns,
            });
        }
        columns
            .get(self.time_squeeze)
            .and_then(parse_hex)
            .ok_or(RowError::InvalidField {
                column: self.time_squeeze,
            })
    }
}

/// Reports the time-squeeze counter of every CPU
pub struct SoftIrqTimeSqueezeMonitor<S> {
    reader: PseudoFileReader,
    layout: SoftnetLayout,
    line: Vec<u8>,
    pending: Vec<TimeSqueezeReport>,
    sink: S,
    skipped_rows: u64,
}

impl<S: TimeSqueezeSink> SoftIrqTimeSqueezeMonitor<S> {
    pub fn new(proc_root: &Path, layout: SoftnetLayout, sink: S) -> Self {
        Self {
            reader: PseudoFileReader::new(proc_root.join(SOFTNET_STAT), SOFTNET_BUFFER),
            layout,
            line: Vec::with_capacity(256),
            pending: Vec::new(),
            sink,
            skipped_rows: 0,
        }
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

    /// Read the table and report each CPU in row order
    pub fn report(&mut self) -> Result<()> {
        let Self {
            reader,
            layout,
            line,
            pending,
            sink,
            skipped_rows,
        } = self;

        pending.clear();
        let mut cpu = 0u32;
        let outcome = {
            let mut splitter = LineSplitter::new(line, |row: &[u8]| {
                if row.iter().all(u8::is_ascii_whitespace) {
                    return;
                }
                match layout.parse_row(row) {
                    Ok(time_squeeze) => pending.push(TimeSqueezeReport { cpu, time_squeeze }),
                    Err(e) => {
                        *skipped_rows += 1;
                        warn!("Skipping softnet row {} {:?}: {}", cpu, String::from_utf8_lossy(row), e);
                    }
                }
                cpu += 1;
            });
            reader.run(&mut splitter)
        };

        outcome.with_context(|| format!("Failed to read softnet statistics {:?}", reader.path()))?;
        for report in pending.iter() {
            sink.on_time_squeeze(report);
        }
        Ok(())
    }
}

impl<S: TimeSqueezeSink> KernelMonitor for SoftIrqTimeSqueezeMonitor<S> {
    fn name(&self) -> &'static str {
        "time-squeeze"
    }

    fn report(&mut self) -> Result<()> {
        SoftIrqTimeSqueezeMonitor::report(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn softnet_row(time_squeeze: u32) -> String {
        format!(
            "00015c73 00000002 {:08x} 00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000\n",
            time_squeeze
        )
    }

    fn proc_root(softnet: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("net")).unwrap();
        fs::write(dir.path().join(SOFTNET_STAT), softnet).unwrap();
        dir
    }

    fn reported(monitor: &SoftIrqTimeSqueezeMonitor<Vec<TimeSqueezeReport>>) -> Vec<(u32, u64)> {
        monitor.sink().iter().map(|r| (r.cpu, r.time_squeeze)).collect()
    }

    #[test]
    fn test_reports_each_cpu_in_order() {
        let softnet: String = [0, 3, 3, 7].iter().map(|&v| softnet_row(v)).collect();
        let root = proc_root(&softnet);
        let mut monitor = SoftIrqTimeSqueezeMonitor::new(root.path(), SoftnetLayout::default(), Vec::<TimeSqueezeReport>::new());

        monitor.report().unwrap();

        assert_eq!(reported(&monitor), vec![(0, 0), (1, 3), (2, 3), (3, 7)]);
    }

    #[test]
    fn test_short_row_is_skipped() {
        let softnet = format!(
            "{}{}{}",
            softnet_row(1),
            "00015c73 00020e76 f0000769 00000000\n",
            softnet_row(4)
        );
        let root = proc_root(&softnet);
        let mut monitor = SoftIrqTimeSqueezeMonitor::new(root.path(), SoftnetLayout::default(), Vec::<TimeSqueezeReport>::new());

        monitor.report().unwrap();

        assert_eq!(reported(&monitor), vec![(0, 1), (2, 4)]);
        assert_eq!(monitor.skipped_rows(), 1);
    }

    #[test]
    fn test_report_is_idempotent() {
        let softnet: String = [5, 0x10].iter().map(|&v| softnet_row(v)).collect();
        let root = proc_root(&softnet);
        let mut monitor = SoftIrqTimeSqueezeMonitor::new(root.path(), SoftnetLayout::default(), Vec::<TimeSqueezeReport>::new());

        monitor.report().unwrap();
        let first = reported(&monitor);
        monitor.sink_mut().clear();
        monitor.report().unwrap();

        assert_eq!(first, vec![(0, 5), (1, 0x10)]);
        assert_eq!(first, reported(&monitor));
    }

    #[test]
    fn test_large_counter() {
        let layout = SoftnetLayout::default();
        let row = "00015c73 00020e76 F0000769 00000000 00000000 00000000 00000000 00000000 00000000 00000000 00000000";

        assert_eq!(layout.parse_row(row.as_bytes()), Ok(0xf000_0769));
    }

    #[test]
    fn test_missing_file_fails_tick() {
        let root = tempfile::tempdir().unwrap();
        let mut monitor = SoftIrqTimeSqueezeMonitor::new(root.path(), SoftnetLayout::default(), Vec::<TimeSqueezeReport>::new());

        assert!(monitor.report().is_err());
        assert!(monitor.sink().is_empty());
    }

    #[test]
    fn test_unreadable_path_discards_rows() {
        // A directory opens but fails on read
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(SOFTNET_STAT)).unwrap();
        let mut monitor = SoftIrqTimeSqueezeMonitor::new(root.path(), SoftnetLayout::default(), Vec::<TimeSqueezeReport>::new());

        assert!(monitor.report().is_err());
        assert!(monitor.sink().is_empty());

        fs::remove_dir(root.path().join(SOFTNET_STAT)).unwrap();
        fs::write(root.path().join(SOFTNET_STAT), softnet_row(4)).unwrap();
        monitor.report().unwrap();
        assert_eq!(reported(&monitor), vec![(0, 4)]);
    }

    #[test]
    fn test_layout_validation() {
        assert!(SoftnetLayout::default().validate().is_ok());
        assert!(SoftnetLayout {
            time_squeeze: 9,
            min_columns: 9
        }
        .validate()
        .is_err());
    }
}
