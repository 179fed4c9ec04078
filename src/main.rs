use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufWriter};

use multialign::config::AlignmentConfig;
use multialign::driver::align_runs;
use multialign::feature_io::{read_run_file, write_alignment, write_alignment_file};
use multialign::library::JoinLibraryBuilder;
use multialign::matching::MatchingStrategy;
use multialign::scoring::ScoringMode;

/// multialign - progressive alignment of LC-MS features across runs
///
/// Reads one tab-separated feature table per run (id, mass, rt, intensity
/// and optional comma-separated group ids) and writes one consensus row per
/// line with the feature id contributed by each run
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Run feature tables, one per LC-MS run
    #[clap(value_name = "RUN", required = true, num_args = 1..)]
    runs: Vec<String>,

    /// Output table (stdout if not specified)
    #[clap(short = 'o', long = "output")]
    output: Option<String>,

    /// Mass tolerance, in ppm unless --absolute-mass is given
    #[clap(short = 'm', long = "mass-tol", default_value = "10")]
    mass_tol: f64,

    /// Treat the mass tolerance as an absolute delta
    #[clap(long = "absolute-mass")]
    absolute_mass: bool,

    /// Retention time tolerance; -1 ignores retention time
    #[clap(short = 'r', long = "rt-tol", default_value = "30", allow_negative_numbers = true)]
    rt_tol: f64,

    /// Matching strategy: stable, optimal, greedy or social
    #[clap(short = 's', long = "strategy", default_value = "stable")]
    strategy: MatchingStrategy,

    /// Row scoring: unweighted (z-score distance) or weighted (pairwise library)
    #[clap(long = "scoring", default_value = "unweighted")]
    scoring: ScoringMode,

    /// Widen the RT window by this factor when building pairwise libraries
    #[clap(short = 'w', long = "rt-window-multiply", default_value = "1.0")]
    rt_window_multiply: f64,

    /// Acquaintances per row for social matching
    #[clap(long = "top-k-friends", default_value = "10")]
    top_k_friends: usize,

    /// Number of threads for pairwise library construction
    #[clap(short = 't', long = "threads", default_value = "8")]
    threads: usize,

    /// Print the guide tree to stderr
    #[clap(long = "print-tree")]
    print_tree: bool,

    /// Only report warnings and errors
    #[clap(short = 'q', long = "quiet", conflicts_with = "verbose")]
    quiet: bool,

    /// Report per-merge details
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Args {
    fn config(&self) -> AlignmentConfig {
        AlignmentConfig {
            mass_tolerance: self.mass_tol,
            rt_tolerance: self.rt_tol,
            use_ppm: !self.absolute_mass,
            strategy: self.strategy,
            rt_window_multiply: self.rt_window_multiply,
            scoring: self.scoring,
            top_k_friends: self.top_k_friends,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // -q/-v win over RUST_LOG; otherwise RUST_LOG, defaulting to info
    let level = if args.quiet {
        Some(log::LevelFilter::Warn)
    } else if args.verbose {
        Some(log::LevelFilter::Debug)
    } else if std::env::var_os(env_logger::DEFAULT_FILTER_ENV).is_none() {
        Some(log::LevelFilter::Info)
    } else {
        None
    };
    let mut logger = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        logger.filter_level(level);
    }
    logger.format_timestamp(None).format_target(false).init();

    // Set up rayon thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let config = args.config();
    config.validate()?;

    let files = args
        .runs
        .iter()
        .enumerate()
        .map(|(id, path)| read_run_file(id, path))
        .collect::<Result<Vec<_>>>()?;
    let total: usize = files.iter().map(|f| f.len()).sum();
    log::info!("loaded {} runs with {} features", files.len(), total);

    let outcome = align_runs(&files, &config, &JoinLibraryBuilder::default())
        .context("Alignment failed")?;
    if !outcome.library_failures.is_empty() {
        log::warn!(
            "{} pairwise libraries failed; their runs were aligned without them",
            outcome.library_failures.len()
        );
    }

    if args.print_tree {
        eprint!("{}", outcome.tree.render());
    }

    match &args.output {
        Some(path) => write_alignment_file(path, &outcome.alignment, &files)?,
        None => write_alignment(BufWriter::new(io::stdout().lock()), &outcome.alignment, &files)?,
    }
    Ok(())
}
