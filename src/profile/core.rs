//! The profile pipeline: strip sorted k-mers to count/ordinal records
//! (S6), re-encode each super-mer's count sequence as delta/run-length
//! bytes while building the link array (S8), and stream the fragments
//! out panel by panel in source order (S10). The two inverse sorts in
//! between are `radix::lsd_sort` calls.
//!
//! Fragment byte code (`p` = previous count, `c` = next, `d = c - p`):
//!
//! ```text
//! 00xxxxxx            run of x copies of the previous count (1..=63)
//! 01sxxxxx            small delta, 6-bit two's complement (|d| < 32)
//! 1xxxxxxx yyyyyyyy   large delta, 15-bit signed, sign bit replicated
//! ```
//!
//! A fragment is framed as the absolute first count (u16 LE), the code
//! bytes, and — whenever any code bytes exist — the absolute last count
//! (u16 LE). The stored length prefix covers the first two parts only.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::bitio::{load_be, load_le_u16, load_le_u64, store_be, store_le_u64};
use crate::common::io::WRITE_BUF_SIZE;
use crate::common::scatter::ScatterBuf;
use crate::config::{Layout, PLEN_BYTES, SLEN_BYTES};
use crate::error::{Error, Result};
use crate::kmers::run_len;
use crate::radix::{NBUCKETS, Span};

/// S6: reduce each sorted k-mer record to `(weight, ordinal)` —
/// dropping the sequence — bucketed on the ordinal's low byte, which
/// stands in for the first LSD pass of the inverse sort.
pub fn project_span(
    k_sort: &[u8],
    parts: &[usize; NBUCKETS],
    span: Span,
    lay: &Layout,
    out: &ScatterBuf,
    cursors: &mut [usize; NBUCKETS],
) {
    let word = lay.kmer_word;
    let mut at = span.off;
    for x in span.beg..span.end {
        let bucket_end = at + parts[x];
        while at < bucket_end {
            let d = k_sort[at + word - 1] as usize;
            let off = cursors[d];
            cursors[d] = off + lay.cmer_word;
            // SAFETY: (low-byte, worker) cursor regions are disjoint,
            // sized by the tallies from the weighted merge pass.
            unsafe { out.write(off, &k_sort[at + lay.kmer_bytes..at + word - 1]) };
            at += word;
        }
    }
}

/// Delta/run-length encoder for one super-mer's count sequence.
pub struct ProfileCoder {
    buf: Vec<u8>,
    prev: u16,
    run: u32,
}

impl Default for ProfileCoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileCoder {
    pub fn new() -> Self {
        ProfileCoder {
            buf: Vec::with_capacity(256),
            prev: 0,
            run: 0,
        }
    }

    /// Start a fragment with its absolute first count.
    pub fn begin(&mut self, first: u16) {
        self.buf.clear();
        self.buf.extend_from_slice(&first.to_le_bytes());
        self.prev = first;
        self.run = 0;
    }

    pub fn push(&mut self, c: u16) {
        if c == self.prev {
            if self.run > 0 {
                if self.run >= 63 {
                    self.buf.push(self.run as u8);
                    self.run = 1;
                } else {
                    self.run += 1;
                }
            } else {
                self.run = 1;
            }
        } else {
            if self.run > 0 {
                self.buf.push(self.run as u8);
                self.run = 0;
            }
            let d = c as i32 - self.prev as i32;
            if d.abs() < 32 {
                self.buf.push(0x40 | (d & 0x3f) as u8);
            } else {
                self.buf.push(((d as u16) >> 8) as u8 | 0x80);
                self.buf.push(d as u8);
            }
            self.prev = c;
        }
    }

    /// Flush any pending run and append the trailing absolute count
    /// when the body grew past the leading one. Returns the body length
    /// (the stored length prefix), which excludes that trailer.
    pub fn end(&mut self) -> usize {
        if self.run > 0 {
            self.buf.push(self.run as u8);
            self.run = 0;
        }
        let body = self.buf.len();
        if body > 2 {
            self.buf.extend_from_slice(&self.prev.to_le_bytes());
        }
        body
    }

    /// Everything to append after the length prefix.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// S8 for one worker: walk its sorted super-mer range in step with its
/// slice of the inverse-sorted count buffer, encode each unique
/// super-mer's profile in place over the counts already consumed, and
/// emit one link per duplicate record.
///
/// `counts` is the worker's region of the shared buffer and
/// `region_base` its absolute byte offset (links carry absolute
/// fragment offsets). The write cursor can never overtake the read
/// cursor: a fragment takes at most `2*sln + 6` bytes against the
/// `(sln+1) * cmer_word >= 4*sln + 4` consumed.
pub fn encode_span(
    smer: &[u8],
    parts: &[usize; NBUCKETS],
    span: Span,
    lay: &Layout,
    counts: &mut [u8],
    region_base: usize,
    links: &mut [u8],
) {
    let word = lay.smer_word;
    let key = lay.smer_key();
    let cw = lay.cmer_word;
    let pb = lay.prof_bytes;
    let mut coder = ProfileCoder::new();

    let mut read = 0usize;
    let mut widx = 0usize;
    let mut lnk = 0usize;

    let mut at = span.off;
    for x in span.beg..span.end {
        let bucket_end = at + parts[x];
        while at < bucket_end {
            let sln =
                load_be(&smer[at + lay.smer_bytes..at + lay.smer_bytes + SLEN_BYTES]) as usize;
            let ct = run_len(smer, at, bucket_end, word, key);

            coder.begin(load_le_u16(&counts[read..]));
            read += cw;
            for _ in 0..sln {
                coder.push(load_le_u16(&counts[read..]));
                read += cw;
            }
            let body = coder.end();

            let frag = (region_base + widx) as u64;
            for r in 0..ct {
                let rec = at + r * word;
                let joined = (smer[rec + key] & 0x80) as u64;
                store_le_u64(&mut links[lnk..], (frag << 1) | (joined >> 7));
                links[lnk + 8] = smer[rec + key] & 0x7F;
                links[lnk + 9..lnk + pb].copy_from_slice(&smer[rec + key + 1..rec + word]);
                lnk += pb;
            }

            store_be(&mut counts[widx..widx + PLEN_BYTES], body as u64);
            widx += PLEN_BYTES;
            counts[widx..widx + coder.bytes().len()].copy_from_slice(coder.bytes());
            widx += coder.bytes().len();
            debug_assert!(widx <= read, "profile writer overtook its reader");

            at += ct * word;
        }
    }
}

/// Byte plan for the S7 inverse sort: ordinal bytes from least
/// significant remaining up to the most significant (the low byte was
/// consumed by S6's pre-bucketing).
pub fn cmer_sort_plan(lay: &Layout) -> Vec<usize> {
    (2..lay.cmer_word).rev().collect()
}

/// Byte plan for the S9 link sort: run-id bytes, low to high.
pub fn link_sort_plan(lay: &Layout) -> Vec<usize> {
    (8..lay.prof_bytes).rev().collect()
}

/// S10 for one worker: its link records `[beg, end)` are cut into
/// `npanels` equal panels, each streamed to its own file as
/// `run id (joined flag in the top bit) || fragment`.
pub fn write_panels(
    a_sort: &[u8],
    prol: &[u8],
    lay: &Layout,
    beg: usize,
    end: usize,
    npanels: usize,
    sort_path: &Path,
    root: &str,
    part: usize,
    thread: usize,
) -> Result<()> {
    let pb = lay.prof_bytes;
    let rng = end - beg;
    let mut cur = beg;
    for q in 0..npanels {
        let next = beg + rng * (q + 1) / npanels;
        let path = sort_path.join(format!("{root}.{part}.P{thread}.{q}"));
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        let mut out = BufWriter::with_capacity(WRITE_BUF_SIZE, file);
        while cur < next {
            let rec = &a_sort[cur * pb..(cur + 1) * pb];
            let head = load_le_u64(&rec[..8]);
            let pidx = (head >> 1) as usize;
            let first = rec[8] | if head & 1 != 0 { 0x80 } else { 0 };

            let body = load_be(&prol[pidx..pidx + PLEN_BYTES]) as usize;
            let stored = PLEN_BYTES + body + if body > 2 { 2 } else { 0 };

            out.write_all(&[first])
                .and_then(|_| out.write_all(&rec[9..pb]))
                .and_then(|_| out.write_all(&prol[pidx..pidx + stored]))
                .map_err(|e| Error::io(&path, e))?;
            cur += 1;
        }
        out.flush().map_err(|e| Error::io(&path, e))?;
    }
    Ok(())
}

/// Decode one length-prefixed fragment back to its counts. Returns the
/// counts and the stored byte length (prefix + body + trailer). The
/// post-hoc profile readers and the test suite share this.
pub fn decode_fragment(frag: &[u8]) -> (Vec<u16>, usize) {
    let body = load_be(&frag[..PLEN_BYTES]) as usize;
    let data = &frag[PLEN_BYTES..];
    let mut d = load_le_u16(&data[..2]);
    let mut out = vec![d];
    let mut p = 2usize;
    while p < body {
        let x = data[p];
        p += 1;
        if x & 0xC0 == 0 {
            for _ in 0..x {
                out.push(d);
            }
        } else if x & 0x80 != 0 {
            let hi = if x & 0x40 != 0 {
                (x as u16) << 8
            } else {
                ((x as u16) << 8) & 0x7FFF
            };
            d = d.wrapping_add(hi | data[p] as u16);
            p += 1;
            out.push(d);
        } else {
            let delta = if x & 0x20 != 0 {
                (x as u16 & 0x1F) | 0xFFE0
            } else {
                x as u16 & 0x1F
            };
            d = d.wrapping_add(delta);
            out.push(d);
        }
    }
    (out, PLEN_BYTES + body + if body > 2 { 2 } else { 0 })
}
