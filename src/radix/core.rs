//! Bucket-radix machinery shared by the four sort stages.
//!
//! Records arrive pre-partitioned into 256 buckets on their first byte;
//! each worker owns a contiguous range of buckets and finishes them with
//! an LSD byte radix. The inverse stages use a plain full-array LSD over
//! an explicit byte plan with two ping-pong buffers.
use rayon::prelude::*;

use crate::common::scatter::ScatterBuf;

pub const NBUCKETS: usize = 256;

/// A worker's assignment: buckets `[beg, end)` starting at byte
/// offset `off` of the shared array.
#[derive(Clone, Copy, Debug, Default)]
pub struct Span {
    pub beg: usize,
    pub end: usize,
    pub off: usize,
}

/// Hand out contiguous bucket ranges whose cumulative byte sizes best
/// balance the workers. Every bucket is covered exactly once; trailing
/// spans may be empty when there are more workers than data.
pub fn assign_spans(parts: &[usize; NBUCKETS], nthreads: usize) -> Vec<Span> {
    let total: usize = parts.iter().sum();
    let mut spans = Vec::with_capacity(nthreads);
    let mut bucket = 0usize;
    let mut cum = 0usize;
    for t in 0..nthreads {
        let beg = bucket;
        let off = cum;
        if t == nthreads - 1 {
            while bucket < NBUCKETS {
                cum += parts[bucket];
                bucket += 1;
            }
        } else {
            let target = (total as u128 * (t as u128 + 1) / nthreads as u128) as usize;
            while bucket < NBUCKETS && cum < target {
                cum += parts[bucket];
                bucket += 1;
            }
        }
        spans.push(Span {
            beg,
            end: bucket,
            off,
        });
    }
    spans
}

/// Byte length of a span's region.
pub fn span_bytes(parts: &[usize; NBUCKETS], span: &Span) -> usize {
    parts[span.beg..span.end].iter().sum()
}

/// Split the shared array into one contiguous mutable chunk per span.
pub fn span_chunks<'a>(
    buf: &'a mut [u8],
    parts: &[usize; NBUCKETS],
    spans: &[Span],
) -> Vec<&'a mut [u8]> {
    let mut rest = buf;
    let mut out = Vec::with_capacity(spans.len());
    for span in spans {
        let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(span_bytes(parts, span));
        out.push(chunk);
        rest = tail;
    }
    debug_assert!(rest.is_empty());
    out
}

/// One stable counting pass moving records from `src` to `dst` keyed on
/// byte `kb`. Returns false (and moves nothing) when every record holds
/// the same value there.
fn radix_pass(src: &[u8], dst: &mut [u8], rec: usize, kb: usize) -> bool {
    let n = src.len() / rec;
    let mut count = [0usize; NBUCKETS];
    for i in 0..n {
        count[src[i * rec + kb] as usize] += 1;
    }
    if count.iter().any(|&c| c == n) {
        return false;
    }
    let mut cur = [0usize; NBUCKETS];
    let mut sum = 0usize;
    for v in 0..NBUCKETS {
        cur[v] = sum;
        sum += count[v];
    }
    for i in 0..n {
        let v = src[i * rec + kb] as usize;
        let at = cur[v] * rec;
        cur[v] += 1;
        dst[at..at + rec].copy_from_slice(&src[i * rec..(i + 1) * rec]);
    }
    true
}

/// LSD sort of one bucket over key bytes `[key_lo, key_hi)`, ping-ponging
/// with `aux` and leaving the result in `data`.
fn sort_one_bucket(data: &mut [u8], aux: &mut [u8], rec: usize, key_lo: usize, key_hi: usize) {
    let mut in_data = true;
    for kb in (key_lo..key_hi).rev() {
        let moved = if in_data {
            radix_pass(data, aux, rec, kb)
        } else {
            radix_pass(aux, data, rec, kb)
        };
        if moved {
            in_data = !in_data;
        }
    }
    if !in_data {
        data.copy_from_slice(aux);
    }
}

/// S2/S4 bucket sort: workers sort their assigned bucket ranges in
/// parallel, each bucket independently, ordering records on the key
/// bytes `[key_lo, key_hi)`. Duplicates end up adjacent.
pub fn sort_buckets(
    buf: &mut [u8],
    parts: &[usize; NBUCKETS],
    spans: &[Span],
    rec: usize,
    key_lo: usize,
    key_hi: usize,
) {
    let chunks = span_chunks(buf, parts, spans);
    chunks
        .into_par_iter()
        .zip(spans.par_iter())
        .for_each(|(chunk, span)| {
            let largest = parts[span.beg..span.end].iter().max().copied().unwrap_or(0);
            if largest <= rec {
                return;
            }
            let mut aux = vec![0u8; largest];
            let mut at = 0usize;
            for x in span.beg..span.end {
                let blen = parts[x];
                if blen > rec {
                    sort_one_bucket(
                        &mut chunk[at..at + blen],
                        &mut aux[..blen],
                        rec,
                        key_lo,
                        key_hi,
                    );
                }
                at += blen;
            }
        });
}

/// One parallel LSD pass `src -> dst` on byte `kb`: per-worker
/// histograms, value-major/worker-minor cursor prefix, then a scatter
/// through disjoint cursors. Returns false when the pass would be the
/// identity permutation's histogram (single value) and was skipped.
fn lsd_pass(src: &[u8], dst: &mut [u8], rec: usize, kb: usize, nthreads: usize) -> bool {
    let n = src.len() / rec;
    let bounds: Vec<(usize, usize)> = (0..nthreads)
        .map(|w| (n * w / nthreads, n * (w + 1) / nthreads))
        .collect();

    let counts: Vec<[usize; NBUCKETS]> = bounds
        .par_iter()
        .map(|&(lo, hi)| {
            let mut c = [0usize; NBUCKETS];
            for i in lo..hi {
                c[src[i * rec + kb] as usize] += 1;
            }
            c
        })
        .collect();

    let mut totals = [0usize; NBUCKETS];
    for c in &counts {
        for v in 0..NBUCKETS {
            totals[v] += c[v];
        }
    }
    if totals.iter().any(|&c| c == n) {
        return false;
    }

    let mut cursors: Vec<[usize; NBUCKETS]> = vec![[0usize; NBUCKETS]; nthreads];
    let mut sum = 0usize;
    for v in 0..NBUCKETS {
        for w in 0..nthreads {
            cursors[w][v] = sum;
            sum += counts[w][v];
        }
    }

    let out = ScatterBuf::new(dst);
    bounds
        .par_iter()
        .zip(cursors.into_par_iter())
        .for_each(|(&(lo, hi), mut cur)| {
            for i in lo..hi {
                let v = src[i * rec + kb] as usize;
                let at = cur[v] * rec;
                cur[v] += 1;
                // SAFETY: the (worker, value) cursor ranges partition
                // `dst`; no two workers share a destination record.
                unsafe { out.write(at, &src[i * rec..(i + 1) * rec]) };
            }
        });
    true
}

/// S7/S9 inverse sort: full-array LSD over the byte positions in `plan`
/// (least significant first), ping-ponging between `a` and `b`.
/// Returns true when the sorted result ended up in `a`.
pub fn lsd_sort(a: &mut [u8], b: &mut [u8], rec: usize, plan: &[usize], nthreads: usize) -> bool {
    assert_eq!(a.len(), b.len());
    let n = a.len() / rec;
    let mut in_a = true;
    if n <= 1 {
        return true;
    }
    for &kb in plan {
        let moved = if in_a {
            lsd_pass(a, b, rec, kb, nthreads)
        } else {
            lsd_pass(b, a, rec, kb, nthreads)
        };
        if moved {
            in_a = !in_a;
        }
    }
    in_a
}
