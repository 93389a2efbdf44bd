//! Benchmarks for budget selection and batch partitioning.

use std::path::PathBuf;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use testweaver::domain::models::{
    AiTask, Assessment, Config, Gap, GapReport, GapSummary, GapType, ReportTiming,
};
use testweaver::services::{partition, CostEstimator};

/// Synthetic report with varied complexity and cost
fn generate_report(count: usize) -> GapReport {
    let gaps: Vec<Gap> = (0..count)
        .map(|i| Gap {
            source_file: PathBuf::from(format!("src/pkg_{}/module_{i}.py", i % 17)),
            complexity_score: (i % 10) as f64 + 1.0,
            current_coverage: (i % 5) as f64 * 0.1,
            gap_type: match i % 3 {
                0 => GapType::Untested,
                1 => GapType::PartialCoverage,
                _ => GapType::HighComplexity,
            },
            estimated_tokens: 2_000 + (i as u64 % 7) * 500,
            estimated_cost: 0.01 + (i % 13) as f64 * 0.005,
        })
        .collect();

    GapReport {
        summary: GapSummary {
            total_files: count,
            files_needing_logical_tests: count,
            total_gaps: count,
            overall_assessment: Assessment::from_ratio(count, count),
        },
        estimated_cost: gaps.iter().map(|g| g.estimated_cost).sum(),
        timing: ReportTiming {
            started_at: Utc::now(),
            duration_ms: 0,
        },
        model: "claude-sonnet-4".to_string(),
        gaps,
    }
}

fn bench_optimize_for_budget(c: &mut Criterion) {
    let estimator = CostEstimator::from_config(&Config::default());
    let mut group = c.benchmark_group("optimize_for_budget");

    for size in [100, 1_000, 10_000] {
        let report = generate_report(size);
        let budget = report.estimated_cost / 2.0;
        group.bench_with_input(BenchmarkId::from_parameter(size), &report, |b, report| {
            b.iter(|| estimator.optimize_for_budget(black_box(report), black_box(budget)));
        });
    }

    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for batch_size in [1, 10, 100] {
        let report = generate_report(5_000);
        let tasks: Vec<AiTask> = report.gaps.iter().map(AiTask::from_gap).collect();
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &tasks, |b, tasks| {
            b.iter(|| partition(black_box(tasks.clone()), batch_size));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_optimize_for_budget, bench_partition);
criterion_main!(benches);
