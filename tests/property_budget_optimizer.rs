//! Property tests for budget selection and batch partitioning.

mod common;

use proptest::prelude::*;

use testweaver::domain::models::{AiTask, Config};
use testweaver::services::{partition, CostEstimator};

use common::report_with_costs;

proptest! {
    /// Property: the included tasks never cost more than the budget
    #[test]
    fn prop_budget_never_exceeded(
        costs in prop::collection::vec(0.0f64..5.0, 0..40),
        budget in 0.0f64..20.0,
    ) {
        let estimator = CostEstimator::from_config(&Config::default());
        let report = report_with_costs(&costs);
        let optimization = estimator.optimize_for_budget(&report, budget);

        let included: f64 = optimization.included().map(|a| a.estimated_cost).sum();
        prop_assert!(included <= budget + 1e-9);
        prop_assert!((optimization.total_estimated_cost - included).abs() < 1e-9);
        prop_assert_eq!(
            optimization.tasks_included + optimization.tasks_excluded,
            costs.len()
        );
        prop_assert_eq!(optimization.allocations.len(), costs.len());
    }

    /// Property: a larger budget never includes fewer tasks
    #[test]
    fn prop_budget_is_monotonic(
        costs in prop::collection::vec(0.01f64..3.0, 1..30),
        budget in 0.0f64..10.0,
        extra in 0.0f64..10.0,
    ) {
        let estimator = CostEstimator::from_config(&Config::default());
        let report = report_with_costs(&costs);
        let small = estimator.optimize_for_budget(&report, budget);
        let large = estimator.optimize_for_budget(&report, budget + extra);
        prop_assert!(large.tasks_included >= small.tasks_included);
    }

    /// Property: N tasks in batches of B yield ceil(N/B) batches, the last
    /// holding N mod B tasks (or B when evenly divisible)
    #[test]
    fn prop_partition_sizes(n in 0usize..300, batch_size in 1usize..=100) {
        let report = report_with_costs(&vec![0.05; n]);
        let tasks: Vec<AiTask> = report.gaps.iter().map(AiTask::from_gap).collect();
        let batches = partition(tasks, batch_size);

        prop_assert_eq!(batches.len(), n.div_ceil(batch_size));
        if let Some(last) = batches.last() {
            let expected = if n % batch_size == 0 { batch_size } else { n % batch_size };
            prop_assert_eq!(last.len(), expected);
        }
        for (i, batch) in batches.iter().enumerate() {
            prop_assert_eq!(batch.index, i);
        }
        prop_assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), n);
    }
}

#[test]
fn test_budget_example_from_priority_order() {
    // Equal priority, so cost ascending decides the order.
    let estimator = CostEstimator::from_config(&Config::default());
    let report = report_with_costs(&[0.50, 0.80, 0.30, 1.00]);
    let optimization = estimator.optimize_for_budget(&report, 2.00);

    assert_eq!(optimization.tasks_included, 3);
    assert_eq!(optimization.tasks_excluded, 1);
    assert!((optimization.total_estimated_cost - 1.60).abs() < 1e-9);
    let excluded: Vec<_> = optimization
        .allocations
        .iter()
        .filter(|a| !a.include_in_batch)
        .map(|a| a.estimated_cost)
        .collect();
    assert_eq!(excluded, vec![1.00]);
}
