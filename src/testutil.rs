//! Test-side producer for the super-mer stream format: splits logical
//! super-mers into physical pieces, emits continuation markers, and
//! writes the header + bit-packed payload the unpacker consumes.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::bitio::{BitWriter, pack_bases};
use crate::config::{MAX_SUPER, SLEN_BITS};

/// A physical piece of a logical super-mer: its ASCII symbols and
/// whether it continues the previous piece.
struct Piece {
    seq: Vec<u8>,
    continues: bool,
}

fn split_logical(k: usize, seq: &[u8]) -> Vec<Piece> {
    assert!(seq.len() >= k, "super-mer shorter than k");
    let total = seq.len() - k + 1;
    let mut pieces = Vec::new();
    let mut a = 0usize;
    while a < total {
        let m = (total - a).min(MAX_SUPER);
        pieces.push(Piece {
            seq: seq[a..a + m + k - 1].to_vec(),
            continues: a > 0,
        });
        a += m;
    }
    pieces
}

/// Write one thread's input file for a partition. `logical` lists the
/// thread's super-mers in input order; physical pieces are numbered
/// `ordinal_base..` and `nbase_total` goes in the header's whole-run
/// total slot. Returns `(kmers, nmers)` as written to the header.
pub fn write_thread_file(
    path: &Path,
    k: usize,
    profiling: bool,
    logical: &[Vec<u8>],
    ordinal_base: u64,
    nbase_total: i64,
) -> std::io::Result<(i64, i64)> {
    let pieces: Vec<Piece> = logical.iter().flat_map(|s| split_logical(k, s)).collect();

    let mut khist = [0i64; 256];
    let mut kmers = 0i64;
    for p in &pieces {
        khist[pack_bases(&p.seq[..4])[0] as usize] += 1;
        kmers += (p.seq.len() - k + 1) as i64;
    }
    let nmers = pieces.len() as i64;

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&kmers.to_le_bytes())?;
    out.write_all(&nmers.to_le_bytes())?;
    out.write_all(&nbase_total.to_le_bytes())?;
    for c in khist {
        out.write_all(&c.to_le_bytes())?;
    }

    let marker = (1u64 << SLEN_BITS) - 1;
    let mut bits = BitWriter::new(out);
    let mut rbits: u32 = 17;
    let mut rlim: u64 = 1 << 16;
    for (i, p) in pieces.iter().enumerate() {
        if p.continues {
            bits.write_bits(marker, SLEN_BITS)?;
        }
        let n = (p.seq.len() - k) as u64;
        bits.write_bits(n, SLEN_BITS)?;
        bits.write_bits(pack_bases(&p.seq[..4])[0] as u64, 8)?;
        bits.write_bases(&p.seq, 4)?;
        if profiling {
            let r = ordinal_base + i as u64;
            while r >= rlim {
                bits.write_bits(rlim, rbits)?;
                rbits += 1;
                rlim <<= 1;
            }
            bits.write_bits(r, rbits)?;
        }
    }
    bits.write_bits(0, SLEN_BITS)?;
    bits.finish()?.flush()?;
    Ok((kmers, nmers))
}

/// Count the physical pieces `write_thread_file` will emit.
pub fn piece_count(k: usize, logical: &[Vec<u8>]) -> u64 {
    logical
        .iter()
        .map(|s| split_logical(k, s).len() as u64)
        .sum()
}
