//! S5: stream the sorted, merged k-mer runs that meet the count
//! threshold out as `(bucket byte || k-mer tail || weight)` entries.
//!
//! Each worker covers a fixed range of first-byte buckets — frozen at
//! partition 0 so the per-thread files split at the same byte
//! boundaries in every partition — and writes one `L` file through a
//! 64 KiB buffer.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::bitio::load_le_u16;
use crate::common::io::WRITE_BUF_SIZE;
use crate::config::Layout;
use crate::error::{Error, Result};
use crate::radix::NBUCKETS;

/// Walk buckets `[beg, end)` of the sorted k-mer array starting at byte
/// offset `off` and write qualifying entries to `path`. The merged
/// weight lives in every record of a run, so only the first record of
/// each run is consulted and emitted. Returns the entry count.
pub fn write_table_span(
    k_sort: &[u8],
    parts: &[usize; NBUCKETS],
    beg: usize,
    end: usize,
    off: usize,
    lay: &Layout,
    threshold: u32,
    path: &Path,
) -> Result<u64> {
    let word = lay.kmer_word;
    let keyb = lay.kmer_bytes;
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::with_capacity(WRITE_BUF_SIZE, file);

    let mut written = 0u64;
    let mut at = off;
    for x in beg..end {
        let bucket_end = at + parts[x];
        while at < bucket_end {
            let ct = load_le_u16(&k_sort[at + keyb..]);
            if ct as u32 >= threshold {
                out.write_all(&[x as u8])
                    .and_then(|_| out.write_all(&k_sort[at + 1..at + keyb + 2]))
                    .map_err(|e| Error::io(path, e))?;
                written += 1;
            }
            // skip the rest of the run (equal keys, equal merged weight)
            let run_key = at;
            at += word;
            while at < bucket_end && k_sort[at..at + keyb] == k_sort[run_key..run_key + keyb] {
                at += word;
            }
        }
    }
    out.flush().map_err(|e| Error::io(path, e))?;
    Ok(written)
}
