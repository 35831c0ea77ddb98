//! Column helpers for kernel text tables
//!
//! All helpers work on borrowed byte slices; nothing here allocates.

use queue_probe_common::constants::MAX_COLUMNS;
use std::fmt;

/// Why a table row was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowError {
    /// The row does not have the column count the layout expects
    ColumnCount { found: usize, expected: usize },
    /// A column could not be decoded
    InvalidField { column: usize },
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::ColumnCount { found, expected } => {
                write!(f, "{} columns found, {} expected", found, expected)
            }
            RowError::InvalidField { column } => write!(f, "column {} is not numeric", column),
        }
    }
}

impl std::error::Error for RowError {}

/// Fixed-capacity view of a row's whitespace-separated columns
pub struct Columns<'a> {
    fields: [&'a [u8]; MAX_COLUMNS],
    count: usize,
}

impl<'a> Columns<'a> {
    /// Split `line` on ASCII whitespace
    ///
    /// Columns past [`MAX_COLUMNS`] are counted but not kept.
    pub fn split(line: &'a [u8]) -> Self {
        let mut fields: [&'a [u8]; MAX_COLUMNS] = [b"".as_slice(); MAX_COLUMNS];
        let mut count = 0;
        for field in line
            .split(|b| b.is_ascii_whitespace())
            .filter(|field| !field.is_empty())
        {
            if count < MAX_COLUMNS {
                fields[count] = field;
            }
            count += 1;
        }
        Self { fields, count }
    }

    /// Total number of columns in the row
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Column `index`, if present and kept
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        if index < self.count.min(MAX_COLUMNS) {
            Some(self.fields[index])
        } else {
            None
        }
    }

    /// Whether any column equals `name`
    pub fn contains(&self, name: &[u8]) -> bool {
        self.fields[..self.count.min(MAX_COLUMNS)]
            .iter()
            .any(|field| *field == name)
    }
}

/// Parse an unsigned hexadecimal field
pub fn parse_hex(field: &[u8]) -> Option<u64> {
    parse_radix(field, 16)
}

/// Parse an unsigned decimal field
pub fn parse_decimal(field: &[u8]) -> Option<u64> {
    parse_radix(field, 10)
}

fn parse_radix(field: &[u8], radix: u32) -> Option<u64> {
    if field.is_empty() || field[0] == b'+' {
        return None;
    }
    let text = std::str::from_utf8(field).ok()?;
    u64::from_str_radix(text, radix).ok()
}
