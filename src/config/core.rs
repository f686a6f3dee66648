use std::path::PathBuf;

use crate::error::{Error, Result};

/// Protocol constants shared with the upstream splitter. A super-mer
/// holds at most `MAX_SUPER` k-mers; a length field of `MAX_SUPER` or
/// more in the stream is a continuation marker.
pub const MAX_SUPER: usize = 1000;

/// Width of the length field in the bit stream.
pub const SLEN_BITS: u32 = 10;

/// Bytes of the length field inside a super-mer record.
pub const SLEN_BYTES: usize = 2;

/// Bytes of the length prefix in front of each encoded profile fragment.
pub const PLEN_BYTES: usize = 2;

/// Histogram size: counts are tracked up to `0x7FFF`, with the last bin
/// absorbing everything at or above it.
pub const HIST_SIZE: usize = 0x8000;

/// Run configuration, built once from the CLI and borrowed everywhere.
#[derive(Debug, Clone)]
pub struct Config {
    /// k-mer length (4..=255).
    pub k: usize,
    /// Worker thread count; also the number of input files per partition.
    pub nthreads: usize,
    /// Number of input partitions to process.
    pub nparts: usize,
    /// Panels per thread for profile output.
    pub npanels: usize,
    /// Emit the k-mer/count table, keeping counts >= the threshold.
    pub do_table: Option<u32>,
    /// Run the profile pipeline (S6-S10).
    pub do_profile: bool,
    /// Histogram display range, `(low, high)`; `None` disables display.
    pub hist: Option<(usize, usize)>,
    /// Progress reporting on stderr.
    pub verbose: bool,
    /// Scratch directory holding the input partitions and the table and
    /// profile outputs.
    pub sort_path: PathBuf,
    /// Directory receiving the final `.K<k>` histogram file.
    pub out_dir: PathBuf,
    /// Database root name; all file names derive from it.
    pub root: String,
}

impl Config {
    /// Reject out-of-range settings before any phase runs.
    pub fn validate(&self) -> Result<()> {
        if self.k < 4 || self.k > 255 {
            return Err(Error::Config(format!(
                "k-mer length {} out of range [4,255]",
                self.k
            )));
        }
        if self.nthreads < 1 {
            return Err(Error::Config("thread count must be at least 1".into()));
        }
        if self.nparts < 1 {
            return Err(Error::Config("partition count must be at least 1".into()));
        }
        if self.npanels < 1 {
            return Err(Error::Config("panel count must be at least 1".into()));
        }
        if let Some(t) = self.do_table {
            if t < 1 {
                return Err(Error::Config("table threshold must be at least 1".into()));
            }
        }
        if let Some((low, high)) = self.hist {
            if low < 1 || low > high || high >= HIST_SIZE {
                return Err(Error::Config(format!(
                    "histogram range [{low},{high}] out of bounds"
                )));
            }
        }
        Ok(())
    }
}

/// Smallest byte width that holds `max_value`.
pub fn bytes_for(max_value: u64) -> usize {
    let mut b = 1;
    while b < 8 && (max_value >> (8 * b)) != 0 {
        b += 1;
    }
    b
}

/// Record geometry for one partition. Every array stride and field
/// offset in the pipeline comes from here.
///
/// Record shapes (byte 0 of super-mer and k-mer records is the reserved
/// first-byte key slot; the leading four symbols live in the bucket
/// index):
///
/// ```text
/// super-mer: [0][seq ..smer_bytes)[len: SLEN_BYTES][run id: run_bytes]
/// k-mer:     [0][seq ..kmer_bytes)[weight: 2 LE][ordinal: kmax_bytes BE]
/// cmer:      [weight: 2 LE][ordinal bytes MSB..byte1 BE]
/// link:      [profile offset<<1 | joined: 8 LE][run id: run_bytes BE]
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub k: usize,
    /// Packed bytes of a k-mer, including the byte-0 slot.
    pub kmer_bytes: usize,
    /// Packed bytes of a maximal super-mer, including the byte-0 slot.
    pub smer_bytes: usize,
    /// Bytes of an ordinal k-mer index.
    pub kmax_bytes: usize,
    /// Bytes of a run id; the top bit of its leading byte is the
    /// "joined" continuation flag.
    pub run_bytes: usize,
    pub smer_word: usize,
    pub kmer_word: usize,
    /// Count/ordinal record for the inverse sort.
    pub cmer_word: usize,
    /// Profile link record: 8-byte header plus the run id.
    pub prof_bytes: usize,
    pub profiling: bool,
    /// Mask for the final k-mer byte (`KCLIP[k % 4]`).
    pub kclip: u8,
}

impl Layout {
    /// Derive the geometry for one partition from its header totals:
    /// `kmers` bounds the ordinal index space, `total_runs` (the sum of
    /// the per-thread super-mer totals) bounds the run ids.
    pub fn new(cfg: &Config, kmers: u64, total_runs: u64) -> Result<Layout> {
        let k = cfg.k;
        let kmer_bytes = (k + 3) / 4;
        let smer_bytes = (MAX_SUPER - 1 + k + 3) / 4;

        // In-place profile encoding needs at least 4 bytes consumed per
        // count read back (see profile::encode), hence the floor of 3.
        let kmax_bytes = bytes_for(kmers.saturating_sub(1)).max(3);

        // Run ids keep their top bit free for the joined flag.
        let max_run = total_runs.saturating_sub(1);
        let mut run_bytes = bytes_for(max_run);
        if max_run >> (8 * run_bytes - 1) != 0 {
            run_bytes += 1;
        }
        if run_bytes > 8 {
            return Err(Error::Structural(format!(
                "{total_runs} super-mers exceed the run-id space"
            )));
        }

        let profiling = cfg.do_profile;
        let smer_word = smer_bytes + SLEN_BYTES + if profiling { run_bytes } else { 0 };
        let kmer_word = kmer_bytes + 2 + if profiling { kmax_bytes } else { 0 };

        Ok(Layout {
            k,
            kmer_bytes,
            smer_bytes,
            kmax_bytes,
            run_bytes,
            smer_word,
            kmer_word,
            cmer_word: kmax_bytes + 1,
            prof_bytes: run_bytes + 8,
            profiling,
            kclip: crate::bitio::KCLIP[k & 3],
        })
    }

    /// Byte length of the sort key shared by duplicate super-mers
    /// (sequence plus length, excluding the run id).
    #[inline]
    pub fn smer_key(&self) -> usize {
        self.smer_bytes + SLEN_BYTES
    }
}
