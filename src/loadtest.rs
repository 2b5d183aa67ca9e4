/// Virtual user runner and metrics collection
use crate::actions::{ActionOutcome, ActionReport};
use crate::client::HttpApi;
use crate::config::LoadTestConfig;
use crate::constants::{FAR_FUTURE_SECS, SHUTDOWN_GRACE_SECS};
use crate::error::LoadError;
use crate::scenario::ScenarioUser;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Seam between user behaviour and scheduling.
///
/// The runner only calls these hooks; it knows nothing about HTTP.
#[async_trait::async_trait]
pub trait VirtualUser: Send {
    fn id(&self) -> usize;

    /// Runs once before the first task
    async fn on_start(&mut self) -> Vec<ActionReport>;

    /// Runs one weighted task
    async fn run_next(&mut self) -> Vec<ActionReport>;

    /// Think time before the next task
    fn wait_time(&mut self) -> Duration;

    async fn on_stop(&mut self);
}

/// Latency and outcome summary for one request name
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestStats {
    pub name: String,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub min_latency_ms: u64,
    pub avg_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl RequestStats {
    fn from_samples(name: &str, successes: u64, failures: u64, latencies: &mut [u64]) -> Self {
        let (min, max, avg, p50, p95, p99) = latency_summary(latencies);
        Self {
            name: name.to_string(),
            total: successes + failures,
            successes,
            failures,
            min_latency_ms: min,
            avg_latency_ms: avg,
            p50_latency_ms: p50,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
            max_latency_ms: max,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.failures as f64 / self.total as f64) * 100.0
        }
    }
}

/// (min, max, avg, p50, p95, p99) over latencies, sorted in place
fn latency_summary(latencies: &mut [u64]) -> (u64, u64, u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0, 0, 0);
    }
    latencies.sort_unstable();
    let len = latencies.len();
    let min = latencies[0];
    let max = latencies[len - 1];
    let avg = latencies.iter().sum::<u64>() / len as u64;
    let pick = |pct: usize| latencies.get((len * pct) / 100).copied().unwrap_or(max);
    (min, max, avg, pick(50), pick(95), pick(99))
}

/// Performance metrics collected during a load test
#[derive(Debug, Clone, Serialize)]
pub struct LoadTestMetrics {
    pub scenario: String,
    pub users_spawned: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub skipped_actions: u64,
    pub authorization_bypasses: u64,
    pub total_duration_ms: u64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub avg_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub throughput_ops_per_sec: f64,
    pub requests: Vec<RequestStats>,
    /// "<request>: <reason>" → occurrences
    pub errors_by_type: BTreeMap<String, u64>,
}

impl LoadTestMetrics {
    pub fn new() -> Self {
        Self {
            scenario: String::new(),
            users_spawned: 0,
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            skipped_actions: 0,
            authorization_bypasses: 0,
            total_duration_ms: 0,
            min_latency_ms: 0,
            max_latency_ms: 0,
            avg_latency_ms: 0,
            p50_latency_ms: 0,
            p95_latency_ms: 0,
            p99_latency_ms: 0,
            throughput_ops_per_sec: 0.0,
            requests: Vec::new(),
            errors_by_type: BTreeMap::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            (self.successful_operations as f64 / self.total_operations as f64) * 100.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            100.0 - self.success_rate()
        }
    }

    pub fn request(&self, name: &str) -> Option<&RequestStats> {
        self.requests.iter().find(|r| r.name == name)
    }
}

impl Default for LoadTestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct RequestRecord {
    successes: u64,
    failures: u64,
    latencies: Vec<u64>,
}

/// Shared collector every virtual user reports into
#[derive(Debug, Clone)]
pub struct LoadTestState {
    pub total_ops: Arc<AtomicU64>,
    pub successful_ops: Arc<AtomicU64>,
    pub failed_ops: Arc<AtomicU64>,
    pub skipped: Arc<AtomicU64>,
    pub bypasses: Arc<AtomicU64>,
    pub users_spawned: Arc<AtomicU64>,
    requests: Arc<parking_lot::Mutex<HashMap<&'static str, RequestRecord>>>,
    errors: Arc<parking_lot::Mutex<BTreeMap<String, u64>>>,
}

impl LoadTestState {
    pub fn new() -> Self {
        Self {
            total_ops: Arc::new(AtomicU64::new(0)),
            successful_ops: Arc::new(AtomicU64::new(0)),
            failed_ops: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
            bypasses: Arc::new(AtomicU64::new(0)),
            users_spawned: Arc::new(AtomicU64::new(0)),
            requests: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            errors: Arc::new(parking_lot::Mutex::new(BTreeMap::new())),
        }
    }
}

impl Default for LoadTestState {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadTestState {
    /// Record one action. Skipped actions sent nothing and only bump a counter.
    pub fn record(&self, user: usize, report: &ActionReport) {
        let latency_ms = report.elapsed.as_millis() as u64;
        crate::log_action!(user, report.request, report.outcome, latency_ms);

        if report.outcome.is_skipped() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.total_ops.fetch_add(1, Ordering::Relaxed);
        let success = report.outcome.is_success();
        if success {
            self.successful_ops.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_ops.fetch_add(1, Ordering::Relaxed);
        }

        match &report.outcome {
            ActionOutcome::AuthorizationBypass { path, .. } => {
                self.bypasses.fetch_add(1, Ordering::Relaxed);
                crate::log_bypass!(user, report.request, path);
            }
            ActionOutcome::Transport(err) => {
                crate::log_transport_error!(user, report.request, err);
            }
            _ => {}
        }

        if let Some(message) = report.outcome.failure_message() {
            *self
                .errors
                .lock()
                .entry(format!("{}: {}", report.request, message))
                .or_insert(0) += 1;
        }

        let mut requests = self.requests.lock();
        let record = requests.entry(report.request).or_default();
        if success {
            record.successes += 1;
        } else {
            record.failures += 1;
        }
        record.latencies.push(latency_ms);
    }

    pub fn get_metrics(&self, duration_ms: u64) -> LoadTestMetrics {
        let total = self.total_ops.load(Ordering::Relaxed);

        let mut all_latencies = Vec::new();
        let mut requests: Vec<RequestStats> = {
            let guard = self.requests.lock();
            guard
                .iter()
                .map(|(name, record)| {
                    all_latencies.extend_from_slice(&record.latencies);
                    let mut latencies = record.latencies.clone();
                    RequestStats::from_samples(
                        name,
                        record.successes,
                        record.failures,
                        &mut latencies,
                    )
                })
                .collect()
        };
        requests.sort_by(|a, b| a.name.cmp(&b.name));

        let (min, max, avg, p50, p95, p99) = latency_summary(&mut all_latencies);

        let throughput = if duration_ms > 0 {
            total as f64 / (duration_ms as f64 / 1000.0)
        } else {
            0.0
        };

        LoadTestMetrics {
            scenario: String::new(),
            users_spawned: self.users_spawned.load(Ordering::Relaxed),
            total_operations: total,
            successful_operations: self.successful_ops.load(Ordering::Relaxed),
            failed_operations: self.failed_ops.load(Ordering::Relaxed),
            skipped_actions: self.skipped.load(Ordering::Relaxed),
            authorization_bypasses: self.bypasses.load(Ordering::Relaxed),
            total_duration_ms: duration_ms,
            min_latency_ms: min,
            max_latency_ms: max,
            avg_latency_ms: avg,
            p50_latency_ms: p50,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
            throughput_ops_per_sec: throughput,
            requests,
            errors_by_type: self.errors.lock().clone(),
        }
    }
}

/// Stops every virtual user at its next task boundary
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One load test run: configuration, collector and stop signal
pub struct LoadTest {
    config: LoadTestConfig,
    state: LoadTestState,
    shutdown: ShutdownHandle,
}

impl LoadTest {
    pub fn new(config: LoadTestConfig) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            config,
            state: LoadTestState::new(),
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
        }
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Live view of the collector, e.g. for a progress display
    pub fn state(&self) -> LoadTestState {
        self.state.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Spawn `config.users` users at `config.spawn_rate` per second and run
    /// them until the run time elapses or shutdown is requested.
    pub async fn run<F, U>(&self, spawn_user: F) -> LoadTestMetrics
    where
        F: Fn(usize) -> U,
        U: VirtualUser + 'static,
    {
        let test_start = Instant::now();
        let deadline = instant_after(test_start, self.config.run_time);
        // A rate too slow to express leaves later users waiting out the run
        let spawn_interval = if self.config.spawn_rate > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.config.spawn_rate)
                .unwrap_or(self.config.run_time)
        } else {
            Duration::ZERO
        };

        tracing::info!(
            users = self.config.users,
            spawn_rate = self.config.spawn_rate,
            run_time_secs = self.config.run_time.as_secs(),
            "Load test started"
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.users);
        let mut spawn_shutdown = self.shutdown.tx.subscribe();

        for id in 0..self.config.users {
            if id > 0 && !spawn_interval.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(spawn_interval) => {}
                    _ = spawn_shutdown.changed() => {}
                }
            }
            if self.shutdown.is_shutdown() || Instant::now() >= deadline {
                break;
            }

            let user = spawn_user(id);
            let state = self.state.clone();
            let shutdown = self.shutdown.tx.subscribe();
            let max_iterations = self.config.max_iterations;

            self.state.users_spawned.fetch_add(1, Ordering::Relaxed);
            handles.push(tokio::spawn(drive_user(
                user,
                state,
                deadline,
                max_iterations,
                shutdown,
            )));
        }

        // In-flight requests may outlive the deadline by up to one timeout
        let grace = self
            .config
            .request_timeout
            .saturating_add(Duration::from_secs(SHUTDOWN_GRACE_SECS));
        let remaining = deadline.saturating_duration_since(Instant::now());
        futures::future::join_all(handles.into_iter().map(|mut handle| async move {
            if tokio::time::timeout(remaining.saturating_add(grace), &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Virtual user did not stop in time, aborting");
                handle.abort();
            }
        }))
        .await;

        let total_ms = test_start.elapsed().as_millis() as u64;
        let mut metrics = self.state.get_metrics(total_ms);
        metrics.scenario = self.config.scenario.to_string();

        tracing::info!(
            total = metrics.total_operations,
            failed = metrics.failed_operations,
            bypasses = metrics.authorization_bypasses,
            duration_ms = total_ms,
            "Load test finished"
        );
        metrics
    }
}

/// `start + offset`, clamped to a far-future instant instead of overflowing
fn instant_after(start: Instant, offset: Duration) -> Instant {
    start
        .checked_add(offset)
        .unwrap_or_else(|| start + Duration::from_secs(FAR_FUTURE_SECS))
}

async fn drive_user<U: VirtualUser>(
    mut user: U,
    state: LoadTestState,
    deadline: Instant,
    max_iterations: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = user.id();
    for report in user.on_start().await {
        state.record(id, &report);
    }

    let mut iterations: u64 = 0;
    loop {
        if *shutdown.borrow() || Instant::now() >= deadline {
            break;
        }
        if max_iterations.is_some_and(|max| iterations >= max) {
            break;
        }

        for report in user.run_next().await {
            state.record(id, &report);
        }
        iterations += 1;

        let wait = user.wait_time();
        if wait.is_zero() {
            // Let other users make progress between back-to-back tasks
            tokio::task::yield_now().await;
            continue;
        }
        let wake = std::cmp::min(instant_after(Instant::now(), wait), deadline);
        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    tokio::time::sleep_until(wake).await;
                }
            }
        }
    }

    user.on_stop().await;
}

/// Run a load test concurrently
pub async fn run_load_test<F, U>(spawn_user: F, config: LoadTestConfig) -> LoadTestMetrics
where
    F: Fn(usize) -> U,
    U: VirtualUser + 'static,
{
    LoadTest::new(config).run(spawn_user).await
}

/// Run the configured scenario against `api`
pub async fn run_scenario(
    config: LoadTestConfig,
    api: Arc<dyn HttpApi>,
) -> Result<LoadTestMetrics, LoadError> {
    let test = LoadTest::new(config);
    run_scenario_with(&test, api).await
}

/// Same as [`run_scenario`] on a prepared [`LoadTest`], so callers can hold
/// its shutdown handle and state
pub async fn run_scenario_with(
    test: &LoadTest,
    api: Arc<dyn HttpApi>,
) -> Result<LoadTestMetrics, LoadError> {
    test.config().validate()?;
    let scenario = Arc::new(test.config().build_scenario()?);
    let seed = test.config().seed;
    Ok(test
        .run(|id| ScenarioUser::new(id, Arc::clone(&scenario), Arc::clone(&api), seed))
        .await)
}
