//! Per-driver diagnostic trace.
//!
//! A [`TraceLog`] collects one tab separated line per step from a driver's
//! [`dump_row`](crate::Driver::dump_row). The driver's preamble (if any)
//! and header line are written before the first row. Numbers use
//! seventeen significant digits in scientific notation so the log can be
//! read back without loss.

use std::fmt::Write as _;
use std::io;

use crate::driver::Driver;

/// Tab separated trace of one driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceLog {
    text: String,
    header_written: bool,
    rows: usize,
}

impl TraceLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the driver's row for `time`.
    pub fn record(&mut self, driver: &dyn Driver, time: f64) {
        if !self.header_written {
            if let Some(preamble) = driver.dump_preamble() {
                self.text.push_str(&preamble);
                if !preamble.ends_with('\n') {
                    self.text.push('\n');
                }
            }
            self.text.push_str(&driver.dump_header().join("\t"));
            self.text.push('\n');
            self.header_written = true;
        }
        for (i, value) in driver.dump_row(time).iter().enumerate() {
            if i > 0 {
                self.text.push('\t');
            }
            let _ = write!(self.text, "{value:.17e}");
        }
        self.text.push('\n');
        self.rows += 1;
    }

    /// Rows recorded so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The log text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Write the log text to `out`.
    pub fn write_to<W: io::Write>(&self, mut out: W) -> io::Result<()> {
        out.write_all(self.text.as_bytes())
    }
}
