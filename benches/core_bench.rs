use authload::actions::ActionReport;
use authload::loadtest::LoadTestState;
use authload::scenario::{Scenario, ScenarioKind};
use authload::session::generate_email;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::hint::black_box;
use std::time::Duration;

fn bench_task_selection(c: &mut Criterion) {
    let scenario = Scenario::new(ScenarioKind::Profile).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    c.bench_function("weighted task selection", |b| {
        b.iter(|| black_box(scenario.tasks.choose(&mut rng)))
    });
}

fn bench_email_generation(c: &mut Criterion) {
    c.bench_function("email generation", |b| {
        b.iter(|| black_box(generate_email("client")))
    });
}

fn bench_metrics_record(c: &mut Criterion) {
    let state = LoadTestState::new();
    let report = ActionReport {
        request: "01_client_view_my_profile",
        outcome: authload::actions::ActionOutcome::Success,
        elapsed: Duration::from_millis(12),
    };

    c.bench_function("metrics record", |b| b.iter(|| state.record(0, &report)));
}

criterion_group!(
    benches,
    bench_task_selection,
    bench_email_generation,
    bench_metrics_record
);
criterion_main!(benches);
