use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use profetch::runtime::config::{
    DEFAULT_BASE_URL, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES,
    DEFAULT_OUTPUT_DIR, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use profetch::runtime::telemetry;
use profetch::{
    DownloaderConfig, DriverReport, PersistenceMode, Runner, WaveObserver, WaveReport,
};

const DEFAULT_START_ID: u64 = 1;
const DEFAULT_END_ID: u64 = 1_000;
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_cli_tracing();

    let args = CliArgs::from_env()?;
    let config = args.to_config()?;

    let bar = build_progress_bar();
    let observer: Arc<dyn WaveObserver> = Arc::new(WaveProgress { bar: bar.clone() });
    let runner = Runner::with_observer(config, Some(observer))?;

    let pending = runner.pending_ids().await?;
    bar.set_length(pending);
    bar.println(format!(
        "Downloading profiles {}..={} ({pending} left) with {} concurrent requests",
        runner.config().start_id(),
        runner.config().end_id(),
        runner.config().concurrency()
    ));

    let started = Instant::now();
    let report = runner.run_until_ctrl_c().await;
    let elapsed = started.elapsed();

    match report {
        Ok(report) => {
            bar.finish_with_message(if report.interrupted {
                "interrupted"
            } else {
                "done"
            });
            print_summary(&runner, &report, elapsed);
            Ok(())
        }
        Err(err) => {
            bar.abandon_with_message("aborted");
            Err(err)
        }
    }
}

fn init_cli_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    profetch::init_tracing();
}

fn build_progress_bar() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stdout_with_hz(12));
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ids ({per_sec:.2} id/s) queue: {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

struct WaveProgress {
    bar: ProgressBar,
}

impl WaveObserver for WaveProgress {
    fn on_wave(&self, report: &WaveReport) {
        let resolved = report.succeeded + report.not_found + report.abandoned;
        self.bar.inc(resolved as u64);
        self.bar.set_message(report.remaining.to_string());
    }
}

fn print_summary(runner: &Runner, report: &DriverReport, elapsed: Duration) {
    let config = runner.config();
    println!("\n--- STATS ---");
    println!(
        "concurrency limit: {} (peak in flight: {})",
        config.concurrency(),
        runner.peak_in_flight()
    );
    println!(
        "range: {}..={} (resumed at {})",
        config.start_id(),
        report.end,
        report.resume_start
    );
    print!("{}", report.totals);
    println!(
        "batches: {} completed, {} publish failures",
        report.batches.iter().filter(|batch| !batch.summary.interrupted).count(),
        report.publish_failures
    );
    if let Some(checkpoint) = report.last_checkpoint {
        println!("checkpoint: {checkpoint}");
    }

    let metrics = runner.http_metrics();
    telemetry::log_http_metrics(&metrics, elapsed);
    println!(
        "requests: {} ({} errors, {} timeouts, avg {:.2} ms)",
        metrics.total_requests,
        metrics.total_errors,
        metrics.total_timeouts,
        metrics.average_latency_ms
    );

    let seconds = elapsed.as_secs_f64();
    println!(
        "\nElapsed: {seconds:.2} seconds ({:.2} minutes)",
        seconds / 60.0
    );
}

struct CliArgs {
    base_url: String,
    start_id: u64,
    end_id: u64,
    concurrency: usize,
    max_retries: u32,
    timeout_secs: u64,
    batch_size: u64,
    output_dir: PathBuf,
    chunk_size: Option<u64>,
    checkpoint: Option<PathBuf>,
    publish_repo: Option<PathBuf>,
}

impl CliArgs {
    fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: read_env_or_default("PROFETCH_BASE_URL", DEFAULT_BASE_URL),
            start_id: parse_env_with_default("PROFETCH_START_ID", DEFAULT_START_ID)?,
            end_id: parse_env_with_default("PROFETCH_END_ID", DEFAULT_END_ID)?,
            concurrency: parse_env_with_default("PROFETCH_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            max_retries: parse_env_with_default("PROFETCH_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            timeout_secs: parse_env_with_default(
                "PROFETCH_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            batch_size: parse_env_with_default("PROFETCH_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            output_dir: PathBuf::from(read_env_or_default(
                "PROFETCH_OUTPUT_DIR",
                DEFAULT_OUTPUT_DIR,
            )),
            chunk_size: parse_optional_env("PROFETCH_CHUNK_SIZE")?,
            checkpoint: read_optional_env("PROFETCH_CHECKPOINT").map(PathBuf::from),
            publish_repo: read_optional_env("PROFETCH_PUBLISH_REPO").map(PathBuf::from),
        })
    }

    fn to_config(&self) -> Result<DownloaderConfig> {
        let persistence = match self.chunk_size {
            Some(chunk_size) => PersistenceMode::ChunkedJson { chunk_size },
            None => PersistenceMode::Files,
        };

        let mut builder = DownloaderConfig::builder()
            .base_url(self.base_url.clone())
            .start_id(self.start_id)
            .end_id(self.end_id)
            .concurrency(self.concurrency)
            .max_retries(self.max_retries)
            .request_timeout(Duration::from_secs(self.timeout_secs))
            .batch_size(self.batch_size)
            .output_dir(self.output_dir.clone())
            .persistence(persistence);

        if let Some(path) = &self.checkpoint {
            builder = builder.checkpoint_path(path.clone());
        }
        if let Some(repo) = &self.publish_repo {
            builder = builder.publish_repo(repo.clone());
        }

        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    read_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn read_optional_env(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_optional_env(key)?.unwrap_or(default))
}

fn parse_optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match read_optional_env(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("failed to parse {key}='{value}'")),
        None => Ok(None),
    }
}
