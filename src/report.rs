/// Console summary and JSON export of load test results
use crate::error::LoadError;
use crate::loadtest::LoadTestMetrics;
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Pass/fail verdict of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every authorization probe was denied
    Secure,
    /// At least one probe got data back
    BypassDetected,
}

impl Verdict {
    pub fn from_metrics(metrics: &LoadTestMetrics) -> Self {
        if metrics.authorization_bypasses > 0 {
            Self::BypassDetected
        } else {
            Self::Secure
        }
    }
}

pub fn print_metrics_report(metrics: &LoadTestMetrics) {
    println!("📊 Test Results ({})", metrics.scenario);
    println!("===============");
    println!();
    println!("Users spawned: {}", metrics.users_spawned);
    println!("Operations:");
    println!("  Total: {}", metrics.total_operations);
    println!(
        "  Successful: {} ({:.2}%)",
        metrics.successful_operations,
        metrics.success_rate()
    );
    println!(
        "  Failed: {} ({:.2}%)",
        metrics.failed_operations,
        metrics.error_rate()
    );
    println!("  Skipped actions: {}", metrics.skipped_actions);
    println!();

    println!("Performance:");
    println!(
        "  Throughput: {:.2} req/sec",
        metrics.throughput_ops_per_sec
    );
    println!("  Duration: {}ms", metrics.total_duration_ms);
    println!(
        "  Latency min/avg/p50/p95/p99/max: {}/{}/{}/{}/{}/{} ms",
        metrics.min_latency_ms,
        metrics.avg_latency_ms,
        metrics.p50_latency_ms,
        metrics.p95_latency_ms,
        metrics.p99_latency_ms,
        metrics.max_latency_ms
    );
    println!();

    println!("Requests:");
    println!(
        "  {:<30} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7}",
        "Name", "Reqs", "Fails", "Avg ms", "P95 ms", "Max ms"
    );
    println!("  {}", "-".repeat(80));
    for r in &metrics.requests {
        println!(
            "  {:<30} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7}",
            r.name, r.total, r.failures, r.avg_latency_ms, r.p95_latency_ms, r.max_latency_ms
        );
    }
    println!();

    if !metrics.errors_by_type.is_empty() {
        println!("Failures:");
        for (error, count) in &metrics.errors_by_type {
            println!("  {:>6}x {}", count, error);
        }
        println!();
    }

    match Verdict::from_metrics(metrics) {
        Verdict::Secure => println!(
            "{}",
            "✅ Authorization boundaries held: no bypass detected".green()
        ),
        Verdict::BypassDetected => println!(
            "{}",
            format!(
                "❌ {} authorization bypass(es) detected",
                metrics.authorization_bypasses
            )
            .red()
            .bold()
        ),
    }
}

/// Write the metrics as pretty JSON, stamped with the current time
pub fn save_metrics_json(metrics: &LoadTestMetrics, path: &Path) -> Result<(), LoadError> {
    let json = serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "success_rate_percent": metrics.success_rate(),
        "error_rate_percent": metrics.error_rate(),
        "verdict": match Verdict::from_metrics(metrics) {
            Verdict::Secure => "secure",
            Verdict::BypassDetected => "bypass_detected",
        },
        "metrics": metrics,
    });

    let text = serde_json::to_string_pretty(&json)?;
    fs::write(path, text).map_err(|source| LoadError::ReportIo {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict() {
        let mut metrics = LoadTestMetrics::new();
        assert_eq!(Verdict::from_metrics(&metrics), Verdict::Secure);
        metrics.authorization_bypasses = 2;
        assert_eq!(Verdict::from_metrics(&metrics), Verdict::BypassDetected);
    }

    #[test]
    fn test_save_metrics_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut metrics = LoadTestMetrics::new();
        metrics.scenario = "profile".to_string();
        metrics.total_operations = 10;
        metrics.successful_operations = 9;
        metrics.failed_operations = 1;
        metrics
            .errors_by_type
            .insert("login: login failed: 401".to_string(), 1);

        save_metrics_json(&metrics, &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["verdict"], "secure");
        assert_eq!(written["metrics"]["scenario"], "profile");
        assert_eq!(written["metrics"]["total_operations"], 10);
        assert_eq!(written["metrics"]["errors_by_type"]["login: login failed: 401"], 1);
        assert!(written["timestamp"].is_string());
    }

    #[test]
    fn test_save_metrics_json_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");
        let err = save_metrics_json(&LoadTestMetrics::new(), &path).unwrap_err();
        assert!(matches!(err, LoadError::ReportIo { .. }));
    }
}
