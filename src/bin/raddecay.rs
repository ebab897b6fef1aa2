use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use raddecay::output::{
    create_run_dir, load_series, write_ensemble_csv, write_json, write_series_csv, FIT_FILE,
    META_FILE, SERIES_FILE, TRAJECTORIES_FILE,
};
use raddecay::{
    add_poisson_background, fit_lambda_from_counts, mean_and_ci, mixture_series_analytical,
    simulate_chain_deterministic, simulate_chain_mc, simulate_isotope, time_grid, ChainParams,
    DecayFit, DecayRateInput, Isotope, Preset, RunConfig, TimeUnit,
};

const MEASURED_FILE: &str = "measured.csv";

#[derive(Debug, Parser)]
#[command(author, version, about = "Radioactive decay simulation and half-life estimation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Simulate one isotope, analytically or as a Monte Carlo ensemble
    Simulate(SimulateArgs),
    /// Simulate the two-stage chain A -> B -> stable
    Chain(ChainArgs),
    /// Evaluate the analytical population and activity of an isotope mixture
    Mixture(MixtureArgs),
    /// Fit the decay constant to a saved run
    Analyze(AnalyzeArgs),
    /// Add Poisson background counts to a saved run
    Background(BackgroundArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Deterministic,
    Mc,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// JSON run configuration; command-line values override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::Mc)]
    mode: Mode,

    /// Isotope preset (tc99m, i131, cs137, co60)
    #[arg(long)]
    isotope: Option<String>,

    #[arg(long)]
    half_life: Option<f64>,

    /// Unit of the half-life and of simulation time (s, min, h, d, y)
    #[arg(long)]
    unit: Option<String>,

    /// Decay constant per unit time; exclusive with --half-life, overrides the preset
    #[arg(long)]
    lambda: Option<f64>,

    #[arg(long)]
    n0: Option<u64>,

    #[arg(long)]
    tmax: Option<f64>,

    #[arg(long)]
    dt: Option<f64>,

    #[arg(long)]
    realizations: Option<usize>,

    /// Stochastic engine (binomial, per_nucleus)
    #[arg(long)]
    engine: Option<String>,

    #[arg(long)]
    seed: Option<u64>,

    /// Significance level of the confidence band
    #[arg(long)]
    alpha: Option<f64>,

    /// Output base directory
    #[arg(long, default_value = "output-raddecay")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct ChainArgs {
    #[arg(long, value_enum, default_value_t = Mode::Mc)]
    mode: Mode,

    #[arg(long, default_value_t = 5_000)]
    n0_a: u64,

    #[arg(long, default_value_t = 0.2)]
    lambda_a: f64,

    #[arg(long, default_value_t = 0.05)]
    lambda_b: f64,

    #[arg(long, default_value_t = 10.0)]
    tmax: f64,

    #[arg(long, default_value_t = 0.05)]
    dt: f64,

    #[arg(long, default_value_t = 120)]
    realizations: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value = "output-raddecay")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct MixtureArgs {
    /// Component as `name:n0:half_life`; repeat for each isotope
    #[arg(long = "component", required = true, value_parser = parse_component)]
    components: Vec<Isotope>,

    #[arg(long, default_value_t = 48.0)]
    tmax: f64,

    #[arg(long, default_value_t = 0.5)]
    dt: f64,

    #[arg(long, default_value = "output-raddecay")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Run directory printed by `simulate`, `chain` or `mixture`
    #[arg(long)]
    run_dir: PathBuf,
}

#[derive(Debug, Args)]
struct BackgroundArgs {
    #[arg(long)]
    run_dir: PathBuf,

    /// Mean background counts per time bin
    #[arg(long)]
    bg_rate: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Serialize)]
struct RunMeta<'a> {
    created_utc: String,
    command: &'static str,
    mode: &'static str,
    package_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    isotope: Option<&'a Isotope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a RunConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chain: Option<&'a ChainParams>,
    n_points: usize,
}

impl RunMeta<'_> {
    fn new(command: &'static str, mode: Mode, n_points: usize) -> Self {
        Self {
            created_utc: Utc::now().to_rfc3339(),
            command,
            mode: match mode {
                Mode::Deterministic => "deterministic",
                Mode::Mc => "mc",
            },
            package_version: env!("CARGO_PKG_VERSION"),
            isotope: None,
            config: None,
            chain: None,
            n_points,
        }
    }
}

#[derive(Debug, Serialize)]
struct FitReport {
    source: String,
    lambda: f64,
    n0: f64,
    half_life: Option<f64>,
    r_squared: f64,
    points_used: usize,
}

impl FitReport {
    fn new(source: &str, fit: &DecayFit) -> Self {
        Self {
            source: source.to_string(),
            lambda: fit.lambda,
            n0: fit.n0,
            half_life: fit.half_life(),
            r_squared: fit.r_squared,
            points_used: fit.points_used,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Simulate(args) => run_simulate(args),
        Command::Chain(args) => run_chain(args),
        Command::Mixture(args) => run_mixture(args),
        Command::Analyze(args) => run_analyze(args),
        Command::Background(args) => run_background(args),
    }
}

fn build_run_config(args: &SimulateArgs) -> anyhow::Result<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => RunConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RunConfig::default(),
    };

    if args.lambda.is_some() || args.half_life.is_some() || args.isotope.is_some() {
        cfg.rate = DecayRateInput {
            lambda: args.lambda,
            half_life: args.half_life,
            unit: cfg.rate.unit,
            preset: args.isotope.as_deref().map(str::parse::<Preset>).transpose()?,
        };
    }
    if let Some(unit) = &args.unit {
        cfg.rate.unit = Some(unit.parse::<TimeUnit>()?);
    }
    if let Some(name) = &args.isotope {
        cfg.name = name.clone();
    }
    if let Some(v) = args.n0 {
        cfg.n0 = v;
    }
    if let Some(v) = args.tmax {
        cfg.sim.t_max = v;
    }
    if let Some(v) = args.dt {
        cfg.sim.dt = v;
    }
    if let Some(v) = args.realizations {
        cfg.sim.n_realizations = v;
    }
    if let Some(engine) = &args.engine {
        cfg.sim.engine = engine.parse()?;
    }
    if let Some(v) = args.seed {
        cfg.seed = v;
    }
    if let Some(v) = args.alpha {
        cfg.alpha = v;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn run_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let cfg = build_run_config(&args)?;
    if args.mode == Mode::Mc {
        cfg.validate_for_ensemble()?;
    }
    let isotope = cfg.isotope()?;
    let run_dir = create_run_dir(&args.out)?;

    info!(
        "{}: n0={}, lambda={:.6}, half-life={:.4}",
        isotope.name(),
        isotope.n0(),
        isotope.lambda(),
        isotope.half_life()
    );

    let n_points = match args.mode {
        Mode::Deterministic => {
            let times = time_grid(cfg.sim.dt, cfg.sim.t_max)?;
            let counts = isotope.n_analytical_series(&times);
            let activity = isotope.activity_series(&times);
            write_series_csv(
                &run_dir.join(SERIES_FILE),
                &times,
                &[("n", &counts[..]), ("activity", &activity[..])],
            )?;
            times.len()
        }
        Mode::Mc => {
            let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
            let sim = simulate_isotope(&isotope, &cfg.sim, &mut rng)?;
            let band = mean_and_ci(&sim.ensemble, cfg.alpha)?;
            let analytic = isotope.n_analytical_series(&sim.times);
            let activity = isotope.activity_series(&sim.times);
            let (lower, upper) = (band.lower(), band.upper());

            write_series_csv(
                &run_dir.join(SERIES_FILE),
                &sim.times,
                &[
                    ("mean", &band.mean[..]),
                    ("lower", &lower[..]),
                    ("upper", &upper[..]),
                    ("analytic", &analytic[..]),
                    ("activity", &activity[..]),
                ],
            )?;
            write_ensemble_csv(&run_dir.join(TRAJECTORIES_FILE), &sim.ensemble)?;

            if let Some(k) = sim.nearest_index(isotope.half_life()) {
                info!(
                    "mean N at t={:.3}: {:.1} ({:.3} of n0)",
                    sim.times[k],
                    band.mean[k],
                    band.mean[k] / isotope.n0().max(1) as f64
                );
            }

            fit_and_report(&run_dir, "mean", &sim.times, &band.mean);
            sim.times.len()
        }
    };

    let mut meta = RunMeta::new("simulate", args.mode, n_points);
    meta.isotope = Some(&isotope);
    meta.config = Some(&cfg);
    write_json(&run_dir.join(META_FILE), &meta)?;

    println!("Run directory: {}", run_dir.display());
    Ok(())
}

fn run_chain(args: ChainArgs) -> anyhow::Result<()> {
    let params = ChainParams::new(args.n0_a, args.lambda_a, args.lambda_b)?;
    let exact = simulate_chain_deterministic(&params, args.dt, args.tmax)?;
    let run_dir = create_run_dir(&args.out)?;

    match args.mode {
        Mode::Deterministic => {
            write_series_csv(
                &run_dir.join(SERIES_FILE),
                &exact.times,
                &[
                    ("n_a", &exact.n_a[..]),
                    ("n_b", &exact.n_b[..]),
                    ("n_c", &exact.n_c[..]),
                ],
            )?;
        }
        Mode::Mc => {
            let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
            let ens = simulate_chain_mc(&params, args.dt, args.tmax, args.realizations, &mut rng)?;
            let (mean_a, mean_b, mean_c) = (ens.a.mean(), ens.b.mean(), ens.c.mean());

            info!(
                "relative RMSE vs closed form: A={:.4}, B={:.4}",
                relative_rmse(&mean_a, &exact.n_a),
                relative_rmse(&mean_b, &exact.n_b)
            );

            write_series_csv(
                &run_dir.join(SERIES_FILE),
                &ens.times,
                &[
                    ("mean_a", &mean_a[..]),
                    ("mean_b", &mean_b[..]),
                    ("mean_c", &mean_c[..]),
                    ("n_a", &exact.n_a[..]),
                    ("n_b", &exact.n_b[..]),
                ],
            )?;
            write_ensemble_csv(&run_dir.join("trajectories_a.csv"), &ens.a)?;
            write_ensemble_csv(&run_dir.join("trajectories_b.csv"), &ens.b)?;
        }
    }

    let mut meta = RunMeta::new("chain", args.mode, exact.times.len());
    meta.chain = Some(&params);
    write_json(&run_dir.join(META_FILE), &meta)?;

    println!("Run directory: {}", run_dir.display());
    Ok(())
}

fn run_mixture(args: MixtureArgs) -> anyhow::Result<()> {
    let times = time_grid(args.dt, args.tmax)?;
    let (counts, activity) = mixture_series_analytical(&args.components, &times);
    let run_dir = create_run_dir(&args.out)?;

    write_series_csv(
        &run_dir.join(SERIES_FILE),
        &times,
        &[("n", &counts[..]), ("activity", &activity[..])],
    )?;

    let meta = RunMeta::new("mixture", Mode::Deterministic, times.len());
    write_json(&run_dir.join(META_FILE), &meta)?;
    write_json(&run_dir.join("components.json"), &args.components)?;

    println!("Run directory: {}", run_dir.display());
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let series = load_series(&args.run_dir)
        .with_context(|| format!("loading run {}", args.run_dir.display()))?;
    let fit = fit_lambda_from_counts(&series.times, &series.values)?;
    let report = FitReport::new(&series.source, &fit);
    write_json(&args.run_dir.join(FIT_FILE), &report)?;

    println!("lambda_hat = {:.6}", fit.lambda);
    match fit.half_life() {
        Some(h) => println!("half-life estimate = {h:.4}"),
        None => println!("half-life estimate undefined (lambda_hat <= 0)"),
    }
    println!("points used = {}, R^2 = {:.5}", fit.points_used, fit.r_squared);
    Ok(())
}

fn run_background(args: BackgroundArgs) -> anyhow::Result<()> {
    let series = load_series(&args.run_dir)
        .with_context(|| format!("loading run {}", args.run_dir.display()))?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let measured = add_poisson_background(&series.values, args.bg_rate, &mut rng)?;

    let path = args.run_dir.join(MEASURED_FILE);
    write_series_csv(
        &path,
        &series.times,
        &[("clean", &series.values[..]), ("measured", &measured[..])],
    )?;

    println!("Measured series: {}", path.display());
    Ok(())
}

/// Fit failures on a fresh run are reported, not fatal; the run itself is
/// already on disk.
fn fit_and_report(run_dir: &Path, source: &str, times: &[f64], counts: &[f64]) {
    let result = fit_lambda_from_counts(times, counts)
        .map_err(anyhow::Error::from)
        .and_then(|fit| {
            write_json(&run_dir.join(FIT_FILE), &FitReport::new(source, &fit))?;
            Ok(fit)
        });

    match result {
        Ok(fit) => info!(
            "fit: lambda_hat={:.6}, half-life={:?}, R^2={:.5}",
            fit.lambda,
            fit.half_life(),
            fit.r_squared
        ),
        Err(e) => warn!("skipping fit: {e}"),
    }
}

fn relative_rmse(estimate: &[f64], exact: &[f64]) -> f64 {
    let sum_sq: f64 = estimate
        .iter()
        .zip(exact)
        .map(|(e, x)| ((e - x) / x.abs().max(1.0)).powi(2))
        .sum();
    (sum_sq / exact.len().max(1) as f64).sqrt()
}

fn parse_component(raw: &str) -> anyhow::Result<Isotope> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [name, n0, half_life] = parts.as_slice() else {
        bail!("expected name:n0:half_life, got '{raw}'");
    };
    let n0: u64 = n0.parse().with_context(|| format!("bad n0 in '{raw}'"))?;
    let half_life: f64 = half_life
        .parse()
        .with_context(|| format!("bad half-life in '{raw}'"))?;
    Ok(Isotope::from_half_life(*name, n0, half_life)?)
}
