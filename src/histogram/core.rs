//! Process-scoped k-mer frequency histogram: reduced from the per-thread
//! tallies after each partition's weighted sort, written to the `.K`
//! file at the end, optionally pretty-printed to stdout.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::config::HIST_SIZE;
use crate::error::{Error, Result};

pub struct Histogram {
    counts: Vec<i64>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Histogram {
            counts: vec![0i64; HIST_SIZE],
        }
    }

    /// Single-threaded reduction of one worker's tallies.
    pub fn absorb(&mut self, thread_counts: &[i64]) {
        debug_assert_eq!(thread_counts.len(), HIST_SIZE);
        for (g, t) in self.counts.iter_mut().zip(thread_counts) {
            *g += t;
        }
    }

    pub fn counts(&self) -> &[i64] {
        &self.counts
    }

    /// Total distinct canonical k-mers seen.
    pub fn distinct(&self) -> i64 {
        self.counts.iter().sum()
    }

    /// `(K: i32 LE, counts: [i64 LE; 0x8000])`.
    pub fn write_file(&self, path: &Path, k: usize) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);
        let put = |out: &mut BufWriter<File>, bytes: &[u8]| -> Result<()> {
            out.write_all(bytes).map_err(|e| Error::io(path, e))
        };
        put(&mut out, &(k as i32).to_le_bytes())?;
        for &c in &self.counts {
            put(&mut out, &c.to_le_bytes())?;
        }
        out.flush().map_err(|e| Error::io(path, e))
    }

    /// Print bins `[low, high]` highest first, folding everything above
    /// `high` into a single `>=` row. The top bin is itself a `>=`
    /// accumulator when occupied.
    pub fn display(&self, k: usize, low: usize, high: usize, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "\nHistogram of {k}-mers:")?;
        let mut oob = 0i64;
        let mut i = HIST_SIZE - 1;
        while i > high {
            oob += self.counts[i];
            i -= 1;
        }
        if i == HIST_SIZE - 1 {
            if self.counts[i] == 0 {
                writeln!(out, "    {:5}: {:12}", i, self.counts[i])?;
            } else {
                writeln!(out, " >= {:5}: {:12}", i, self.counts[i])?;
            }
            i -= 1;
        } else if oob > 0 {
            writeln!(out, " >= {:5}: {:12}", i + 1, oob)?;
        }
        while i >= low {
            writeln!(out, "    {:5}: {:12}", i, self.counts[i])?;
            i -= 1;
        }
        Ok(())
    }
}

/// Thousands-grouped rendering for the verbose accounting table.
pub fn fmt_grouped(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut out = String::new();
    if n < 0 {
        out.push('-');
    }
    let lead = digits.len() % 3;
    if lead > 0 {
        out.push_str(&digits[..lead]);
    }
    for (i, chunk) in digits[lead..].as_bytes().chunks(3).enumerate() {
        if lead > 0 || i > 0 {
            out.push(',');
        }
        out.push_str(std::str::from_utf8(chunk).unwrap());
    }
    out
}
