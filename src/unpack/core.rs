//! S1: decode bit-packed super-mers into the shared, first-byte-bucketed
//! sort array.
//!
//! Each worker owns one input file and 256 write cursors into the shared
//! array, precomputed from the union of the per-thread header histograms
//! so no two workers ever touch the same slot. A record is `[0][packed
//! sequence][length BE]` plus, when profiling, a big-endian run id whose
//! leading bit is reserved for the "joined" continuation flag.
use std::io::Read;

use crate::bitio::{BitReader, store_be};
use crate::common::scatter::ScatterBuf;
use crate::config::{Layout, MAX_SUPER, SLEN_BITS, SLEN_BYTES};
use crate::error::{Error, Result};
use crate::radix::NBUCKETS;

/// Per-thread input file header: totals plus the first-byte histogram
/// that sizes this thread's bucket regions. `nbase` is the thread's
/// whole-run super-mer total; starting ordinals are derived by prefix
/// sum across threads.
#[derive(Debug, Clone)]
pub struct SmerHeader {
    pub kmers: i64,
    pub nmers: i64,
    pub nbase: i64,
    pub khist: [i64; NBUCKETS],
}

pub const HEADER_BYTES: usize = 8 * (3 + NBUCKETS);

impl SmerHeader {
    pub fn read(src: &mut impl Read, path: &std::path::Path) -> Result<SmerHeader> {
        let mut raw = [0u8; HEADER_BYTES];
        src.read_exact(&mut raw).map_err(|e| Error::io(path, e))?;
        let field = |i: usize| i64::from_le_bytes(raw[8 * i..8 * i + 8].try_into().unwrap());

        let hdr = SmerHeader {
            kmers: field(0),
            nmers: field(1),
            nbase: field(2),
            khist: std::array::from_fn(|j| field(3 + j)),
        };
        if hdr.kmers < 0 || hdr.nmers < 0 || hdr.nbase < 0 {
            return Err(Error::Structural(format!(
                "{}: negative totals in header",
                path.display()
            )));
        }
        let hsum: i64 = hdr.khist.iter().sum();
        if hdr.khist.iter().any(|&c| c < 0) || hsum != hdr.nmers {
            return Err(Error::Structural(format!(
                "{}: first-byte histogram sums to {} but header claims {} super-mers",
                path.display(),
                hsum,
                hdr.nmers
            )));
        }
        Ok(hdr)
    }
}

/// One worker's bucket cursors: current and end byte offsets into the
/// shared array. Hitting `end` early — or finishing short of it — means
/// the stream disagrees with the header histogram.
#[derive(Clone)]
pub struct BucketCursors {
    pub cur: [usize; NBUCKETS],
    pub end: [usize; NBUCKETS],
}

/// Decode `nmers` super-mers from `reader` into the shared array.
/// `base` is this thread's starting run ordinal (profiling only).
pub fn unpack_stream<R: Read>(
    reader: &mut BitReader<R>,
    nmers: u64,
    base: u64,
    cursors: &mut BucketCursors,
    out: &ScatterBuf,
    lay: &Layout,
) -> Result<()> {
    let mut rec = vec![0u8; lay.smer_word];
    let run_at = lay.smer_key();
    let run_cap: u64 = 1u64 << (8 * lay.run_bytes - 1);

    // Progressively widening run-index code: a value with its top bit
    // set is an escape that bumps the width by one.
    let mut rbits: u32 = 17;
    let mut rlim: u64 = 1 << 16;

    // Offset of the previous record's run id, the landing spot for a
    // continuation marker's joined flag.
    let mut prev_run: Option<usize> = None;

    for _ in 0..nmers {
        let mut n = reader.read_bits(SLEN_BITS)?;
        while n as usize >= MAX_SUPER {
            mark_joined(prev_run, out, lay, reader)?;
            n = reader.read_bits(SLEN_BITS)?;
        }
        let nsym = n as usize + lay.k;

        let f = reader.read_bits(8)? as usize;
        let slot = cursors.cur[f];
        if slot + lay.smer_word > cursors.end[f] {
            return Err(Error::Structural(format!(
                "{}: bucket 0x{f:02x} overflows its header histogram",
                reader.path().display()
            )));
        }
        cursors.cur[f] = slot + lay.smer_word;

        rec[0] = 0;
        let nb = reader.read_packed(nsym - 4, &mut rec[1..])?;
        for b in rec.iter_mut().take(lay.smer_bytes).skip(1 + nb) {
            *b = 0;
        }
        store_be(&mut rec[lay.smer_bytes..lay.smer_bytes + SLEN_BYTES], n);

        if lay.profiling {
            let r = loop {
                let v = reader.read_bits(rbits)?;
                if v < rlim {
                    break v;
                }
                rbits += 1;
                rlim <<= 1;
                if rbits > 63 {
                    return Err(Error::Structural(format!(
                        "{}: run-index code widened past 63 bits",
                        reader.path().display()
                    )));
                }
            };
            let rid = r + base;
            if rid >= run_cap {
                return Err(Error::Structural(format!(
                    "{}: run id {rid} exceeds the {}-byte id space",
                    reader.path().display(),
                    lay.run_bytes
                )));
            }
            store_be(&mut rec[run_at..lay.smer_word], rid);
            prev_run = Some(slot + run_at);
        }

        // SAFETY: the (bucket, worker) cursor regions partition the
        // array; the bounds check above keeps us inside ours.
        unsafe { out.write(slot, &rec[..lay.smer_word]) };
    }

    // The stream closes with one more length field; a continuation
    // marker there joins the final record to the next thread's stream.
    match reader.read_bits(SLEN_BITS) {
        Ok(n) if n as usize >= MAX_SUPER => mark_joined(prev_run, out, lay, reader)?,
        Ok(_) => {}
        Err(Error::Truncated { .. }) => {}
        Err(e) => return Err(e),
    }

    for f in 0..NBUCKETS {
        if cursors.cur[f] != cursors.end[f] {
            return Err(Error::Structural(format!(
                "{}: bucket 0x{f:02x} decoded {} records short of its histogram",
                reader.path().display(),
                (cursors.end[f] - cursors.cur[f]) / lay.smer_word
            )));
        }
    }
    Ok(())
}

fn mark_joined<R: Read>(
    prev_run: Option<usize>,
    out: &ScatterBuf,
    lay: &Layout,
    reader: &BitReader<R>,
) -> Result<()> {
    if !lay.profiling {
        // The flag lives in the run id, which only exists when
        // profiling; without it a continuation needs no bookkeeping.
        return Ok(());
    }
    match prev_run {
        Some(off) => {
            // SAFETY: `off` points into a record this worker wrote.
            unsafe { out.or_byte(off, 0x80) };
            Ok(())
        }
        None => Err(Error::Structural(format!(
            "{}: continuation marker before any super-mer",
            reader.path().display()
        ))),
    }
}
