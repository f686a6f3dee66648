//! Partition-by-partition phase sequencing. Each partition runs the
//! stages S1..S10 as parallel fan-outs with a join barrier in between;
//! all large arrays live exactly as long as their partition.
use std::path::PathBuf;

use rayon::prelude::*;

use crate::bitio::BitReader;
use crate::common::io::{open_sequential, remove_if_present};
use crate::common::scatter::ScatterBuf;
use crate::config::{Config, HIST_SIZE, Layout};
use crate::error::{Error, Result};
use crate::histogram::{Histogram, fmt_grouped};
use crate::kmers::{FillCtx, Scratch, expand_span, merge_weighted_runs};
use crate::profile::{cmer_sort_plan, encode_span, link_sort_plan, project_span, write_panels};
use crate::radix::{NBUCKETS, assign_spans, lsd_sort, sort_buckets, span_bytes, span_chunks};
use crate::table::write_table_span;
use crate::unpack::{BucketCursors, SmerHeader, unpack_stream};

/// Run the whole engine: every partition, then the histogram file and
/// the optional display and accounting.
pub fn run(cfg: &Config) -> Result<()> {
    cfg.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.nthreads)
        .build()
        .map_err(|e| Error::Config(format!("cannot build a {}-thread pool: {e}", cfg.nthreads)))?;
    pool.install(|| run_parts(cfg))
}

fn run_parts(cfg: &Config) -> Result<()> {
    let hist_path = cfg.out_dir.join(format!("{}.K{}", cfg.root, cfg.k));
    remove_if_present(&hist_path).map_err(|e| Error::io(&hist_path, e))?;

    if cfg.verbose {
        eprintln!(
            "\nSorting & counting {}-mers in {} partitions",
            cfg.k, cfg.nparts
        );
    }

    let mut histogram = Histogram::new();
    let mut table_split: Option<Vec<usize>> = None;
    let mut wkmers = vec![0i64; cfg.nparts];
    let mut ukmers = vec![0i64; cfg.nparts];

    for p in 0..cfg.nparts {
        let (w, u) = process_partition(cfg, p, &mut histogram, &mut table_split)?;
        wkmers[p] = w;
        ukmers[p] = u;
    }

    histogram.write_file(&hist_path, cfg.k)?;

    if let Some((low, high)) = cfg.hist {
        let stdout = std::io::stdout();
        histogram
            .display(cfg.k, low, high, &mut stdout.lock())
            .map_err(|e| Error::io(&hist_path, e))?;
    }

    if cfg.verbose {
        let wtot: i64 = wkmers.iter().sum();
        let utot: i64 = ukmers.iter().sum();
        eprintln!("\n  Part:  weighted k-mers  savings");
        for p in 0..cfg.nparts {
            eprintln!(
                "  {:4}:  {:>15}  {:7.1}",
                p,
                fmt_grouped(wkmers[p]),
                ukmers[p] as f64 / (wkmers[p].max(1)) as f64
            );
        }
        eprintln!(
            "   All:  {:>15}  {:7.1}",
            fmt_grouped(wtot),
            utot as f64 / wtot.max(1) as f64
        );
    }
    Ok(())
}

/// Process one partition end to end. Returns `(weighted, unweighted)`
/// k-mer totals for the accounting table.
fn process_partition(
    cfg: &Config,
    p: usize,
    histogram: &mut Histogram,
    table_split: &mut Option<Vec<usize>>,
) -> Result<(i64, i64)> {
    let nt = cfg.nthreads;

    // Open this partition's thread files and read their headers.
    let mut files = Vec::with_capacity(nt);
    let mut headers: Vec<SmerHeader> = Vec::with_capacity(nt);
    let mut paths: Vec<PathBuf> = Vec::with_capacity(nt);
    for t in 0..nt {
        let path = cfg.sort_path.join(format!("{}.{}.T{}", cfg.root, p, t));
        let mut file = open_sequential(&path).map_err(|e| Error::io(&path, e))?;
        headers.push(SmerHeader::read(&mut file, &path)?);
        files.push(file);
        paths.push(path);
    }
    let kmers: i64 = headers.iter().map(|h| h.kmers).sum();
    let nmers: i64 = headers.iter().map(|h| h.nmers).sum();
    let total_runs: i64 = headers.iter().map(|h| h.nbase).sum();
    let lay = Layout::new(cfg, kmers as u64, total_runs as u64)?;
    let smer_len = nmers as usize * lay.smer_word;

    if cfg.verbose {
        eprintln!("  Partition {p}: sorting super-mers");
    }

    // S1 cursors: bucket-major across threads, from the union of the
    // per-thread histograms.
    let mut cursors: Vec<BucketCursors> = vec![
        BucketCursors {
            cur: [0; NBUCKETS],
            end: [0; NBUCKETS],
        };
        nt
    ];
    let mut sparts = [0usize; NBUCKETS];
    let mut off = 0usize;
    for j in 0..NBUCKETS {
        for (t, hdr) in headers.iter().enumerate() {
            let bytes = hdr.khist[j] as usize * lay.smer_word;
            cursors[t].cur[j] = off;
            cursors[t].end[j] = off + bytes;
            sparts[j] += bytes;
            off += bytes;
        }
    }
    if off != smer_len {
        return Err(Error::Structural(format!(
            "partition {p}: histograms cover {off} bytes but headers claim {nmers} super-mers"
        )));
    }

    // Starting run ordinals: prefix sum of the whole-run totals.
    let mut bases = vec![0u64; nt];
    let mut o = 0u64;
    for (t, hdr) in headers.iter().enumerate() {
        bases[t] = o;
        o += hdr.nbase as u64;
    }

    // S1: decode all thread streams into the bucketed array.
    let mut s_sort = vec![0u8; smer_len + lay.smer_word];
    {
        let out = ScatterBuf::new(&mut s_sort[..smer_len]);
        let jobs: Vec<_> = files
            .into_iter()
            .zip(paths.iter())
            .zip(cursors.into_iter())
            .zip(bases.iter())
            .enumerate()
            .map(|(t, (((file, path), cur), &base))| {
                (file, path.clone(), headers[t].nmers as u64, base, cur)
            })
            .collect();
        jobs.into_par_iter()
            .map(|(file, path, n, base, mut cur)| {
                let mut reader = BitReader::new(file, &path);
                unpack_stream(&mut reader, n, base, &mut cur, &out, &lay)
            })
            .collect::<Result<Vec<()>>>()?;
    }

    // Inputs are consumed; unlink them.
    for path in &paths {
        remove_if_present(path).map_err(|e| Error::io(path, e))?;
    }

    // S2: sort super-mers on (sequence || length).
    let sspans = assign_spans(&sparts, nt);
    sort_buckets(
        &mut s_sort[..smer_len],
        &sparts,
        &sspans,
        lay.smer_word,
        1,
        lay.smer_key(),
    );

    // S3 counting pre-pass: canonical first-byte histogram per worker.
    let smer_view = &s_sort[..smer_len];
    let kf_hist: Vec<[u64; NBUCKETS]> = sspans
        .par_iter()
        .map(|span| {
            let mut scratch = Scratch::new(&lay);
            let mut counts = [0u64; NBUCKETS];
            expand_span(smer_view, &sparts, *span, &lay, &mut scratch, None, &mut counts);
            counts
        })
        .collect();
    let span_kmers: Vec<u64> = kf_hist.iter().map(|c| c.iter().sum()).collect();
    let skmers: u64 = span_kmers.iter().sum();

    if cfg.verbose {
        eprintln!("  Partition {p}: sorting weighted k-mers");
    }

    // Ordinal bases follow walk order; scatter cursors are bucket-major.
    let mut kidx = vec![0u64; nt];
    let mut o = 0u64;
    for t in 0..nt {
        kidx[t] = o;
        o += span_kmers[t];
    }
    let mut kparts = [0usize; NBUCKETS];
    let mut kcursors: Vec<[usize; NBUCKETS]> = vec![[0; NBUCKETS]; nt];
    let mut off = 0usize;
    for j in 0..NBUCKETS {
        for t in 0..nt {
            kcursors[t][j] = off;
            let bytes = kf_hist[t][j] as usize * lay.kmer_word;
            kparts[j] += bytes;
            off += bytes;
        }
    }

    // S3 fill pass.
    let mut k_sort = vec![0u8; skmers as usize * lay.kmer_word];
    {
        let out = ScatterBuf::new(&mut k_sort);
        sspans
            .par_iter()
            .zip(kcursors.into_par_iter())
            .zip(kidx.par_iter())
            .for_each(|((span, cursors), &base)| {
                let mut scratch = Scratch::new(&lay);
                let mut ctx = FillCtx {
                    out: &out,
                    cursors,
                    next_idx: base,
                };
                let mut unused = [0u64; NBUCKETS];
                expand_span(
                    smer_view,
                    &sparts,
                    *span,
                    &lay,
                    &mut scratch,
                    Some(&mut ctx),
                    &mut unused,
                );
            });
    }

    // S4: sort weighted k-mers, then merge runs — summed weights into
    // every record, histogram and index-LSB tallies per worker.
    let kspans = assign_spans(&kparts, nt);
    sort_buckets(&mut k_sort, &kparts, &kspans, lay.kmer_word, 1, lay.kmer_bytes);

    let merged: Vec<(Vec<i64>, [u64; NBUCKETS])> = span_chunks(&mut k_sort, &kparts, &kspans)
        .into_par_iter()
        .zip(kspans.par_iter())
        .map(|(chunk, span)| {
            let mut hist = vec![0i64; HIST_SIZE];
            let mut lsb = [0u64; NBUCKETS];
            merge_weighted_runs(chunk, &kparts, *span, &lay, &mut hist, &mut lsb);
            (hist, lsb)
        })
        .collect();
    for (h, _) in &merged {
        histogram.absorb(h);
    }

    // S5: threshold table, bucket split frozen at partition 0.
    if let Some(threshold) = cfg.do_table {
        let begs: Vec<usize> = match table_split.as_ref() {
            Some(v) => v.clone(),
            None => {
                let v: Vec<usize> = kspans.iter().map(|s| s.beg).collect();
                *table_split = Some(v.clone());
                v
            }
        };
        let k_view = &k_sort[..];
        (0..nt)
            .into_par_iter()
            .map(|t| {
                let beg = begs[t];
                let end = if t + 1 < nt { begs[t + 1] } else { NBUCKETS };
                let off: usize = kparts[..beg].iter().sum();
                let path = cfg
                    .sort_path
                    .join(format!("{}.{}.L{}", cfg.root, p, t));
                write_table_span(k_view, &kparts, beg, end, off, &lay, threshold, &path)
            })
            .collect::<Result<Vec<u64>>>()?;
    }

    if !cfg.do_profile {
        return Ok((skmers as i64, kmers));
    }

    if cfg.verbose {
        eprintln!("  Partition {p}: inverting for profiles");
    }

    // S6: count/ordinal records pre-bucketed on the ordinal low byte.
    let csize = skmers as usize * lay.cmer_word;
    let mut ccursors: Vec<[usize; NBUCKETS]> = vec![[0; NBUCKETS]; nt];
    let mut off = 0usize;
    for j in 0..NBUCKETS {
        for t in 0..nt {
            ccursors[t][j] = off;
            off += merged[t].1[j] as usize * lay.cmer_word;
        }
    }
    if off != csize {
        return Err(Error::Structural(format!(
            "partition {p}: index tallies cover {off} bytes but expansion made {skmers} k-mers"
        )));
    }

    let mut i_sort = vec![0u8; csize];
    {
        let out = ScatterBuf::new(&mut i_sort);
        let k_view = &k_sort[..];
        kspans
            .par_iter()
            .zip(ccursors.into_par_iter())
            .for_each(|(span, mut cursors)| {
                project_span(k_view, &kparts, *span, &lay, &out, &mut cursors);
            });
    }

    // S7: LSD back to ordinal order; the k-mer array is the ping-pong
    // partner, and whichever buffer lost the last pass is freed here.
    let plan = cmer_sort_plan(&lay);
    let in_i = lsd_sort(&mut i_sort, &mut k_sort[..csize], lay.cmer_word, &plan, nt);
    let mut counts_buf = if in_i {
        drop(k_sort);
        i_sort
    } else {
        drop(i_sort);
        k_sort.truncate(csize);
        k_sort
    };

    // S8: encode profiles in place over the consumed counts and build
    // one link per super-mer record.
    let links_len = nmers as usize * lay.prof_bytes;
    let mut p_sort = vec![0u8; 2 * links_len];
    {
        let (links_a, _) = p_sort.split_at_mut(links_len);
        let mut counts_rest: &mut [u8] = &mut counts_buf;
        let mut links_rest: &mut [u8] = links_a;
        let mut jobs = Vec::with_capacity(nt);
        for (t, span) in sspans.iter().enumerate() {
            let nrec = span_bytes(&sparts, span) / lay.smer_word;
            let (cchunk, crest) = std::mem::take(&mut counts_rest)
                .split_at_mut(span_kmers[t] as usize * lay.cmer_word);
            counts_rest = crest;
            let (lchunk, lrest) =
                std::mem::take(&mut links_rest).split_at_mut(nrec * lay.prof_bytes);
            links_rest = lrest;
            jobs.push((span, cchunk, kidx[t] as usize * lay.cmer_word, lchunk));
        }
        jobs.into_par_iter().for_each(|(span, cchunk, base, lchunk)| {
            encode_span(smer_view, &sparts, *span, &lay, cchunk, base, lchunk);
        });
    }

    // S9: links back to source order by run id.
    let (links_a, links_b) = p_sort.split_at_mut(links_len);
    let in_a = lsd_sort(links_a, links_b, lay.prof_bytes, &link_sort_plan(&lay), nt);
    let a_sort: &[u8] = if in_a { links_a } else { links_b };

    // S10: per-input-thread link ranges, panel files.
    let mut ranges = Vec::with_capacity(nt);
    let mut o = 0usize;
    for hdr in &headers {
        let beg = o;
        o += hdr.nmers as usize;
        ranges.push((beg, o));
    }
    let prol = &counts_buf[..];
    ranges
        .into_par_iter()
        .enumerate()
        .map(|(t, (beg, end))| {
            write_panels(
                a_sort,
                prol,
                &lay,
                beg,
                end,
                cfg.npanels,
                &cfg.sort_path,
                &cfg.root,
                p,
                t,
            )
        })
        .collect::<Result<Vec<()>>>()?;

    Ok((skmers as i64, kmers))
}
