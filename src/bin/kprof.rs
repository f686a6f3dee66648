use std::path::PathBuf;
use std::process;

use anyhow::{Context, bail};
use clap::Parser;

use kprof::config::Config;
use kprof::pipeline;

#[derive(Parser)]
#[command(
    name = "kprof",
    about = "Count and profile canonical k-mers from pre-split super-mer partitions"
)]
struct Cli {
    /// K-mer length
    #[arg(short = 'k', long = "kmer", value_name = "K", default_value_t = 40)]
    kmer: usize,

    /// Worker thread count (one input file per thread and partition)
    #[arg(short = 'T', long = "threads", value_name = "N", default_value_t = 4)]
    threads: usize,

    /// Number of input partitions produced by the splitter
    #[arg(short = 'P', long = "parts", value_name = "N")]
    parts: usize,

    /// Panels per thread for profile output files
    #[arg(long = "panels", value_name = "N", default_value_t = 4)]
    panels: usize,

    /// Emit the sorted k-mer table, keeping counts >= MIN
    #[arg(short = 't', long = "table", value_name = "MIN")]
    table: Option<u32>,

    /// Produce per-read count profiles
    #[arg(short = 'p', long = "profile")]
    profile: bool,

    /// Print the frequency histogram over LOW:HIGH after counting
    #[arg(long = "hist", value_name = "LOW:HIGH")]
    hist: Option<String>,

    /// Progress to stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Scratch directory holding the partition files (default: the
    /// database directory)
    #[arg(short = 'S', long = "sort-path", value_name = "DIR")]
    sort_path: Option<PathBuf>,

    /// Database root path; inputs are <sort-path>/<root>.<part>.T<thread>
    root: PathBuf,
}

fn parse_hist(spec: &str) -> anyhow::Result<(usize, usize)> {
    let (lo, hi) = spec
        .split_once(':')
        .with_context(|| format!("expected LOW:HIGH, got '{spec}'"))?;
    let low: usize = lo.parse().with_context(|| format!("bad LOW '{lo}'"))?;
    let high: usize = hi.parse().with_context(|| format!("bad HIGH '{hi}'"))?;
    if low < 1 || low > high {
        bail!("histogram range {low}:{high} is empty");
    }
    Ok((low, high))
}

fn main() {
    let cli = Cli::parse();

    let out_dir = cli
        .root
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let root = match cli.root.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            eprintln!("kprof: '{}' has no file name", cli.root.display());
            process::exit(2);
        }
    };

    let hist = match cli.hist.as_deref().map(parse_hist).transpose() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("kprof: {e:#}");
            process::exit(2);
        }
    };

    let config = Config {
        k: cli.kmer,
        nthreads: cli.threads,
        nparts: cli.parts,
        npanels: cli.panels,
        do_table: cli.table,
        do_profile: cli.profile,
        hist,
        verbose: cli.verbose,
        sort_path: cli.sort_path.unwrap_or_else(|| out_dir.clone()),
        out_dir,
        root,
    };

    if let Err(e) = pipeline::run(&config) {
        eprintln!("kprof: {e}");
        process::exit(1);
    }
}
