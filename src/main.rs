use anyhow::{Context, Result};
use authload::client::{HttpApi, ReqwestApi};
use authload::config::LoadTestConfig;
use authload::constants::{
    DEFAULT_HOST, DEFAULT_MOCK_PORT, DEFAULT_REGISTER_PAUSE_MS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RUN_TIME_SECS, DEFAULT_SPAWN_RATE, DEFAULT_USERS,
};
use authload::loadtest::{run_scenario_with, LoadTest};
use authload::mock::{self, AccessMode};
use authload::report::{print_metrics_report, save_metrics_json, Verdict};
use authload::scenario::{ScenarioKind, WaitTime};
use authload::logging;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "authload")]
#[command(about = "Virtual-user load tests for an authentication and user-profile API")]
struct Cli {
    /// Emit JSON logs instead of console output
    #[arg(long, global = true, env = "AUTHLOAD_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run virtual users against a target API
    Run(RunArgs),
    /// Serve the in-memory mock API
    MockServer {
        #[arg(short, long, env = "AUTHLOAD_MOCK_PORT", default_value_t = DEFAULT_MOCK_PORT)]
        port: u16,

        /// Disable authorization checks on foreign profiles and the user list
        #[arg(long)]
        leaky: bool,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Base URL of the API under test
    #[arg(long, env = "AUTHLOAD_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// profile, auth or smoke
    #[arg(short, long, env = "AUTHLOAD_SCENARIO", default_value = "profile")]
    scenario: ScenarioKind,

    /// Number of concurrent virtual users
    #[arg(short, long, env = "AUTHLOAD_USERS", default_value_t = DEFAULT_USERS)]
    users: usize,

    /// Users started per second (0 = all at once)
    #[arg(short = 'r', long, env = "AUTHLOAD_SPAWN_RATE", default_value_t = DEFAULT_SPAWN_RATE)]
    spawn_rate: f64,

    /// Test duration in seconds
    #[arg(short = 't', long, env = "AUTHLOAD_RUN_TIME", default_value_t = DEFAULT_RUN_TIME_SECS)]
    run_time: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "AUTHLOAD_REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    /// Pause after a successful registration, in milliseconds
    #[arg(long, env = "AUTHLOAD_REGISTER_PAUSE_MS", default_value_t = DEFAULT_REGISTER_PAUSE_MS)]
    register_pause_ms: u64,

    /// Override the scenario's minimum think time (ms)
    #[arg(long, env = "AUTHLOAD_WAIT_MIN_MS", requires = "wait_max_ms")]
    wait_min_ms: Option<u64>,

    /// Override the scenario's maximum think time (ms)
    #[arg(long, env = "AUTHLOAD_WAIT_MAX_MS", requires = "wait_min_ms")]
    wait_max_ms: Option<u64>,

    /// Stop each user after this many tasks
    #[arg(long, env = "AUTHLOAD_MAX_ITERATIONS")]
    max_iterations: Option<u64>,

    /// Seed for task selection
    #[arg(long, env = "AUTHLOAD_SEED")]
    seed: Option<u64>,

    /// Send GET / before each registration
    #[arg(long)]
    probe_root: bool,

    /// Output file for results (JSON format)
    #[arg(short, long, env = "AUTHLOAD_OUTPUT")]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn to_config(&self) -> LoadTestConfig {
        let wait_time = match (self.wait_min_ms, self.wait_max_ms) {
            (Some(min), Some(max)) => Some(WaitTime::between_millis(min, max)),
            _ => None,
        };
        LoadTestConfig {
            host: self.host.clone(),
            scenario: self.scenario,
            users: self.users,
            spawn_rate: self.spawn_rate,
            run_time: Duration::from_secs(self.run_time),
            request_timeout: Duration::from_secs(self.request_timeout),
            register_pause: Duration::from_millis(self.register_pause_ms),
            wait_time,
            max_iterations: self.max_iterations,
            seed: self.seed,
            probe_root: self.probe_root,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.json_logs)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    match cli.command {
        Command::MockServer { port, leaky } => {
            let mode = if leaky {
                AccessMode::Leaky
            } else {
                AccessMode::Secure
            };
            mock::serve(Some(port), mode).await?;
            Ok(())
        }
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.to_config();
    config.validate()?;

    println!("🚀 authload");
    println!("===========\n");
    println!("Target: {}", config.host);
    println!("Scenario: {}", config.scenario);
    println!("Users: {} (spawn rate {}/s)", config.users, config.spawn_rate);
    println!("Duration: {}s\n", config.run_time.as_secs());

    let api: Arc<dyn HttpApi> = Arc::new(
        ReqwestApi::new(config.host.clone(), config.request_timeout)
            .context("building HTTP client")?,
    );

    let test = LoadTest::new(config);

    let shutdown = test.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping virtual users");
            shutdown.shutdown();
        }
    });

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")?);
    progress.enable_steady_tick(Duration::from_millis(200));
    let state = test.state();
    let ticker_bar = progress.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            interval.tick().await;
            ticker_bar.set_message(format!(
                "users {} | requests {} | failures {} | bypasses {}",
                state.users_spawned.load(Ordering::Relaxed),
                state.total_ops.load(Ordering::Relaxed),
                state.failed_ops.load(Ordering::Relaxed),
                state.bypasses.load(Ordering::Relaxed),
            ));
        }
    });

    let metrics = run_scenario_with(&test, api).await?;
    ticker.abort();
    progress.finish_and_clear();

    print_metrics_report(&metrics);

    if let Some(output_path) = &args.output {
        save_metrics_json(&metrics, output_path)?;
        println!("\n✅ Results saved to {}", output_path.display());
    }

    if Verdict::from_metrics(&metrics) == Verdict::BypassDetected {
        std::process::exit(1);
    }
    Ok(())
}
