//! vizdiff - visual regression diff CLI
//!
//! ## Commands
//!
//! - `run`: capture baseline and candidate, diff them, write the report
//! - `watch`: repeat `run` with a cooldown
//! - `prioritize`: re-rank a saved report against a usage inventory
//! - `compare-images`: pixel-diff two PNG files
//! - `regions`: list the validated region catalog of a config

mod persist;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use vizdiff_core::{
    prioritize, ComparisonRun, DiffIssue, FsImageStore, ImageStore, Inventory, MemoryImageStore,
    PixelComparator, PriorityEntry, Raster, RegionArea, Report, RgbaComparator, RunConfig, Severity,
    StaticInventory, Summary, Thresholds, METRICS,
};
use vizdiff_webdriver::{BrowserKind, WebDriverConfig, WebDriverRendererFactory};

use crate::persist::RunEnvelope;

#[derive(Parser)]
#[command(name = "vizdiff")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Visual regression diff between a baseline and a candidate page", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one comparison and write the report
    Run(RunArgs),

    /// Repeat comparisons with a cooldown between runs
    Watch {
        #[command(flatten)]
        run: RunArgs,

        /// Seconds to wait between runs
        #[arg(long, default_value_t = 300)]
        cooldown_secs: u64,

        /// Number of runs (0 = until interrupted)
        #[arg(long, default_value_t = 1)]
        iterations: u32,
    },

    /// Re-rank the issues of a saved report
    Prioritize {
        /// Path to report.json
        #[arg(short, long)]
        report: PathBuf,

        /// Block inventory JSON supplying usage weights
        #[arg(short, long)]
        inventory: Option<PathBuf>,
    },

    /// Pixel-diff two PNG files of equal size
    CompareImages {
        a: PathBuf,
        b: PathBuf,

        /// Run config whose thresholds classify the result
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Per-channel tolerance (0-255); defaults to the thresholds' tolerance
        #[arg(long)]
        tolerance: Option<u8>,
    },

    /// List the regions a config would capture
    Regions {
        /// Path to the run config (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Path to the run config (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory receiving run_<timestamp>_<id>/ folders
    #[arg(short, long, env = "VIZDIFF_OUT_DIR", default_value = "vizdiff-runs")]
    out_dir: PathBuf,

    /// WebDriver endpoint (chromedriver / geckodriver)
    #[arg(
        long,
        env = "VIZDIFF_WEBDRIVER_URL",
        default_value = "http://localhost:4444"
    )]
    webdriver_url: String,

    /// Block inventory JSON supplying usage weights
    #[arg(short, long)]
    inventory: Option<PathBuf>,

    /// Browser behind the WebDriver endpoint
    #[arg(long, default_value = "chrome")]
    browser: BrowserKind,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Exit non-zero when an issue at or above this severity is reported
    #[arg(long, value_enum, default_value_t = FailOn::Never)]
    fail_on: FailOn,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum FailOn {
    Never,
    Critical,
    Moderate,
    Minor,
    /// Also fail when a region could not be compared
    Incomplete,
}

impl FailOn {
    fn is_met(&self, summary: &Summary) -> bool {
        let incomplete = summary.unavailable_regions > 0 || summary.faults > 0;
        match self {
            FailOn::Never => false,
            FailOn::Critical => summary.critical > 0,
            FailOn::Moderate => summary.critical + summary.moderate > 0,
            FailOn::Minor => summary.total > 0,
            FailOn::Incomplete => summary.total > 0 || incomplete,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vizdiff_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args, cli.json).await.map(|_| ()),
        Commands::Watch {
            run,
            cooldown_secs,
            iterations,
        } => cmd_watch(&run, Duration::from_secs(cooldown_secs), iterations, cli.json).await,
        Commands::Prioritize { report, inventory } => {
            cmd_prioritize(&report, inventory.as_deref(), cli.json)
        }
        Commands::CompareImages {
            a,
            b,
            config,
            tolerance,
        } => {
            let thresholds = match config {
                Some(path) => load_config(&path)?.thresholds,
                None => Thresholds::default(),
            };
            cmd_compare_images(&a, &b, &thresholds, tolerance, cli.json)
        }
        Commands::Regions { config } => cmd_regions(&config, cli.json),
    }
}

/// Run one comparison and persist it. Returns the run directory.
async fn cmd_run(args: &RunArgs, json: bool) -> Result<PathBuf> {
    let config = load_config(&args.config)?;
    let inventory = args.inventory.as_deref().map(load_inventory).transpose()?;

    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    let dir = persist::run_dir(&args.out_dir, started_at, &run_id);
    let store: Arc<dyn ImageStore> = Arc::new(
        FsImageStore::new(dir.join(persist::IMAGES_DIR))
            .with_context(|| format!("Failed to create image store under {:?}", dir))?,
    );
    let comparator: Arc<dyn PixelComparator> = Arc::new(
        RgbaComparator::new(store.clone()).with_tolerance(config.thresholds.pixel_tolerance),
    );
    let factory = Arc::new(WebDriverRendererFactory::new(WebDriverConfig {
        webdriver_url: args.webdriver_url.clone(),
        browser: args.browser,
        headless: !args.headed,
    }));

    let mut run = ComparisonRun::new(config.clone(), factory, store, comparator)
        .context("Invalid run configuration")?;
    if let Some(inventory) = inventory {
        run = run.with_inventory(Arc::new(inventory));
    }

    let output = run.execute(&run_id).await;

    let envelope = RunEnvelope {
        run_id,
        generated_at: started_at,
        engine_version: vizdiff_core::VERSION.to_string(),
        baseline: config.baseline,
        candidate: config.candidate,
        viewport: config.viewport,
        duration_ms: output.duration_ms,
        report: output.report,
    };
    persist::write_envelope(&dir, &envelope)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        print_summary(&envelope.report);
        println!("Report: {}", dir.join(persist::REPORT_MD).display());
    }

    if args.fail_on.is_met(&envelope.report.summary) {
        anyhow::bail!(
            "Visual diff failed ({:?}): {} critical, {} moderate, {} minor, {} unavailable",
            args.fail_on,
            envelope.report.summary.critical,
            envelope.report.summary.moderate,
            envelope.report.summary.minor,
            envelope.report.summary.unavailable_regions,
        );
    }
    Ok(dir)
}

async fn cmd_watch(args: &RunArgs, cooldown: Duration, iterations: u32, json: bool) -> Result<()> {
    let mut completed = 0u32;
    loop {
        completed += 1;
        info!(iteration = completed, "watch.iteration");
        if let Err(e) = cmd_run(args, json).await {
            // A failing gate must not stop the watch loop.
            warn!(iteration = completed, error = %format!("{e:#}"), "watch.run_failed");
        }

        if iterations != 0 && completed >= iterations {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(cooldown) => {}
            _ = tokio::signal::ctrl_c() => {
                info!(completed, "watch.interrupted");
                break;
            }
        }
    }
    METRICS.flush();
    Ok(())
}

fn cmd_prioritize(report_path: &Path, inventory_path: Option<&Path>, json: bool) -> Result<()> {
    let report = persist::read_report(report_path)?;
    let inventory = inventory_path.map(load_inventory).transpose()?;
    let issues: Vec<DiffIssue> = report
        .issues
        .into_iter()
        .flat_map(|group| group.issues)
        .collect();
    let ranked = prioritize(&issues, inventory.as_ref().map(|i| i as &dyn Inventory));

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else {
        print_priorities(&ranked);
    }
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct ImageComparison {
    width: u32,
    height: u32,
    differing_pixels: u64,
    ratio: f64,
    severity: Option<Severity>,
}

fn cmd_compare_images(
    a: &Path,
    b: &Path,
    thresholds: &Thresholds,
    tolerance: Option<u8>,
    json: bool,
) -> Result<()> {
    let result = compare_image_files(a, b, thresholds, tolerance)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let severity = result.severity.map_or("none", |s| s.as_str());
        println!(
            "{}x{}: {} differing pixels ({:.4}%), severity {}",
            result.width,
            result.height,
            result.differing_pixels,
            result.ratio * 100.0,
            severity
        );
    }
    Ok(())
}

fn compare_image_files(
    a: &Path,
    b: &Path,
    thresholds: &Thresholds,
    tolerance: Option<u8>,
) -> Result<ImageComparison> {
    let store = Arc::new(MemoryImageStore::new());
    let baseline = store.put("baseline/image.png", &read_png(a)?)?;
    let candidate = store.put("candidate/image.png", &read_png(b)?)?;

    let comparator = RgbaComparator::new(store)
        .with_tolerance(tolerance.unwrap_or(thresholds.pixel_tolerance))
        .without_mask();
    let comparison = comparator
        .compare("image", &baseline, &candidate)
        .with_context(|| format!("Failed to compare {:?} and {:?}", a, b))?;

    let area = baseline.area();
    let ratio = if area == 0 {
        0.0
    } else {
        comparison.differing_pixels as f64 / area as f64
    };
    Ok(ImageComparison {
        width: baseline.width,
        height: baseline.height,
        differing_pixels: comparison.differing_pixels,
        ratio,
        severity: thresholds.classify_pixel_ratio(ratio),
    })
}

fn cmd_regions(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let catalog = config.catalog().context("Invalid region catalog")?;
    if json {
        println!("{}", serde_json::to_string_pretty(catalog.list_regions())?);
        return Ok(());
    }
    println!("Regions ({}x{}):", config.viewport.width, config.viewport.height);
    for region in catalog.list_regions() {
        let area = match &region.area {
            RegionArea::Clip { clip } => format!(
                "clip {}x{}+{}+{}",
                clip.width, clip.height, clip.x, clip.y
            ),
            RegionArea::Selector { selector } => format!("selector {selector}"),
        };
        let steps = if region.interaction.is_empty() {
            String::new()
        } else {
            let described: Vec<String> = region.interaction.iter().map(|s| s.describe()).collect();
            format!("  [{}]", described.join(" -> "))
        };
        println!("  {:<16} {}{}", region.name, area, steps);
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<RunConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    RunConfig::from_json(&raw).with_context(|| format!("Invalid config in {:?}", path))
}

fn load_inventory(path: &Path) -> Result<StaticInventory> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory file: {:?}", path))?;
    StaticInventory::from_inventory_json(&raw)
        .with_context(|| format!("Invalid inventory JSON in {:?}", path))
}

fn read_png(path: &Path) -> Result<Raster> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    Raster::from_png(bytes).with_context(|| format!("Not a PNG image: {:?}", path))
}

fn print_summary(report: &Report) {
    let s = &report.summary;
    println!(
        "Issues: {} critical, {} moderate, {} minor ({} total)",
        s.critical, s.moderate, s.minor, s.total
    );
    println!(
        "Regions: {} compared, {} unavailable, {} degraded, {} faults",
        s.compared_regions, s.unavailable_regions, s.degraded_regions, s.faults
    );
    if !report.priorities.is_empty() {
        println!();
        print_priorities(&report.priorities);
    }
}

fn print_priorities(ranked: &[PriorityEntry]) {
    if ranked.is_empty() {
        println!("Nothing to fix.");
        return;
    }
    println!(
        "{:>4}  {:<20} {:>6} {:>8} {:>8} {:>10}",
        "RANK", "REGION", "ISSUES", "SEVERITY", "USAGE", "IMPACT"
    );
    for entry in ranked {
        println!(
            "{:>4}  {:<20} {:>6} {:>8} {:>8.1} {:>10.1}",
            entry.rank,
            entry.region,
            entry.issue_count,
            entry.severity_weight,
            entry.usage_weight,
            entry.total_impact
        );
    }
}
