//! CLI entrypoint for the xisort external float sorter.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;

use xisort_core::{SortMode, TieBreak, XiRng, XiSort, XiSortConfig};

/// External sorter for large streams of doubles.
#[derive(Debug, Parser)]
#[command(name = "xisort")]
#[command(about = "External sorter for large streams of doubles")]
struct Cli {
    /// Run built-in sanity checks and exit.
    #[arg(long)]
    selftest: bool,

    /// Ordering regime (strict or curved).
    #[arg(long, default_value = "strict")]
    mode: SortMode,

    /// Perturbation strength for curved mode; pi * epsilon must be < 1.
    #[arg(long, default_value_t = 0.01)]
    epsilon: f64,

    /// Tie-breaking strategy (value, index, random, or shuffle).
    #[arg(long, default_value = "value")]
    tie_break: TieBreak,

    /// PRNG seed; omitted means auto-seed from OS entropy.
    #[arg(long)]
    seed: Option<u64>,

    /// Fail unless --seed is given.
    #[arg(long)]
    require_deterministic: bool,

    /// Shuffle NaNs and infinities inside the tail segment.
    #[arg(long)]
    nan_shuffle: bool,

    /// Scratch quota in gibibytes.
    #[arg(long, default_value_t = 1.0)]
    max_gb: f64,

    /// Directory to place scratch files under.
    #[arg(long)]
    tmpdir: Option<PathBuf>,

    /// Disable chunk BLAKE3 tag verification.
    #[arg(long = "no-integrity", action = clap::ArgAction::SetFalse, default_value_t = true)]
    integrity: bool,

    /// Warn instead of failing on tag mismatch.
    #[arg(long)]
    soft_verify: bool,

    /// How many random doubles to sort.
    #[arg(long, default_value_t = 1_000_000)]
    count: u64,

    /// Values per chunk.
    #[arg(long = "chunk-size", default_value_t = 262_144)]
    chunk_size: usize,

    /// Abort on the first out-of-order output value.
    #[arg(long)]
    verify_sorted: bool,

    /// Print progress every 5% (at most once per 5 seconds).
    #[arg(long)]
    progress: bool,

    /// Write a JSON run summary here on success.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    version: String,
    mode: String,
    tie_break: String,
    epsilon: f64,
    seed: Option<u64>,
    count: u64,
    output_count: u64,
    elapsed_secs: f64,
    first_values: Vec<f64>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("xisort: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.selftest {
        return selftest();
    }

    let sorter = XiSort::new(XiSortConfig {
        mode: cli.mode,
        epsilon: cli.epsilon,
        tie_break: cli.tie_break,
        seed: cli.seed,
        require_deterministic: cli.require_deterministic,
        nan_shuffle: cli.nan_shuffle,
        max_gb: cli.max_gb,
        tmpdir: cli.tmpdir.clone(),
        integrity: cli.integrity,
        soft_verify: cli.soft_verify,
        chunk_capacity: cli.chunk_size,
    })?;

    println!(
        "xisort {} sorting {} standard-normal values (mode {}, tie-break {})",
        env!("CARGO_PKG_VERSION"),
        cli.count,
        cli.mode.as_str(),
        cli.tie_break.as_str()
    );

    let started = Instant::now();
    let source = NormalSource::new(0).take(cli.count as usize);

    let milestone_step = (cli.count / 20).max(1);
    let mut next_milestone = milestone_step;
    let mut last_ping = Instant::now();
    let mut output_count: u64 = 0;
    let mut first_ten: Vec<f64> = Vec::with_capacity(10);
    let mut last_val = f64::NEG_INFINITY;

    for item in sorter.stream_sort(source)? {
        let val = item?;
        if first_ten.len() < 10 {
            first_ten.push(val);
        }
        if cli.verify_sorted && val < last_val {
            return Err(
                format!("out-of-order value at index {output_count}: {val} < {last_val}").into(),
            );
        }
        last_val = val;
        output_count += 1;

        if cli.progress && output_count >= next_milestone {
            let now = Instant::now();
            if now.duration_since(last_ping).as_secs() >= 5 {
                let pct = 100.0 * output_count as f64 / cli.count as f64;
                println!("{pct:5.1}%  ({output_count}/{})", cli.count);
                last_ping = now;
            }
            next_milestone += milestone_step;
        }
    }

    let elapsed = started.elapsed();
    println!("sorting complete: {output_count} values in {:.2}s", elapsed.as_secs_f64());
    if !first_ten.is_empty() {
        let formatted: Vec<String> = first_ten
            .iter()
            .map(|v| {
                if v.is_finite() {
                    format!("{v:.3}")
                } else {
                    v.to_string()
                }
            })
            .collect();
        println!("first 10 sorted values: [{}]", formatted.join(", "));
    }
    if cli.verify_sorted {
        println!("order verified: sequence is non-decreasing");
    }

    if let Some(path) = &cli.report {
        let report = RunReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: cli.mode.as_str().to_string(),
            tie_break: cli.tie_break.as_str().to_string(),
            epsilon: cli.epsilon,
            seed: cli.seed,
            count: cli.count,
            output_count,
            elapsed_secs: elapsed.as_secs_f64(),
            first_values: first_ten,
        };
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        eprintln!("wrote run report to {}", path.display());
    }
    Ok(())
}

/// Deterministic standard-normal stream (Box-Muller over the crate PRNG).
struct NormalSource {
    rng: XiRng,
    spare: Option<f64>,
}

impl NormalSource {
    fn new(seed: u64) -> Self {
        Self {
            rng: XiRng::new(seed),
            spare: None,
        }
    }
}

impl Iterator for NormalSource {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if let Some(z) = self.spare.take() {
            return Some(z);
        }
        let u1 = loop {
            let u = self.rng.uniform();
            if u > 0.0 {
                break u;
            }
        };
        let u2 = self.rng.uniform();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        self.spare = Some(r * theta.sin());
        Some(r * theta.cos())
    }
}

fn selftest() -> Result<(), Box<dyn std::error::Error>> {
    // Signed zeros: all -0.0 must come out ahead of all +0.0.
    let mut input = vec![0.0f64; 4096];
    input.extend(vec![-0.0f64; 4096]);
    let sorter = XiSort::new(XiSortConfig {
        seed: Some(1),
        require_deterministic: true,
        ..XiSortConfig::default()
    })?;
    let out = sorter
        .stream_sort(input)?
        .collect::<Result<Vec<f64>, _>>()?;
    let zeros_ok = out.len() == 8192
        && out[..4096].iter().all(|v| v.is_sign_negative())
        && out[4096..].iter().all(|v| !v.is_sign_negative());
    println!("signed-zero {}", if zeros_ok { "OK" } else { "FAIL" });

    // Chi-squared over 10 bins of one million uniforms.
    let mut rng = XiRng::new(1);
    let mut bins = [0u64; 10];
    let n = 1_000_000u64;
    for _ in 0..n {
        let b = ((rng.uniform() * 10.0) as usize).min(9);
        bins[b] += 1;
    }
    let expected = n as f64 / 10.0;
    let chi2: f64 = bins
        .iter()
        .map(|&c| {
            let d = c as f64 - expected;
            d * d / expected
        })
        .sum();
    let chi2_ok = chi2 < 20.0;
    println!("chi-squared = {chi2:.1} {}", if chi2_ok { "OK" } else { "FAIL" });

    Ok(())
}
