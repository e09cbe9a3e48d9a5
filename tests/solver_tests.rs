//! Route solver tests
//!
//! Hard limits, soft-limit reporting, day cycling and unreachable customers.

mod fixtures;

use std::collections::HashSet;
use std::time::Duration;

use rstest::rstest;

use fixtures::{customers, depot, BlockedProvider};
use zone_planner::config::EngineConfig;
use zone_planner::distance::{Precision, TravelProvider};
use zone_planner::error::{EngineError, InputError};
use zone_planner::model::{ConstraintSet, Customer, RoutingResult, SolveStatus, ZoneAssignment};
use zone_planner::solver::{
    route_overlays, solve_assignment, solve_fixed_routes, solve_zone, SolveOptions,
};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Builder for solve options with sensible defaults and a short budget.
struct OptionsBuilder {
    options: SolveOptions,
}

impl OptionsBuilder {
    fn new() -> Self {
        Self {
            options: SolveOptions::default().with_time_budget(Duration::from_secs(2)),
        }
    }

    fn max_customers(mut self, max: usize) -> Self {
        self.options.constraints.max_customers_per_route = max;
        self
    }

    fn min_customers(mut self, min: usize) -> Self {
        self.options.constraints.min_customers_per_route = min;
        self
    }

    fn max_duration(mut self, minutes: f64) -> Self {
        self.options.constraints.max_route_duration_minutes = minutes;
        self
    }

    fn max_distance(mut self, km: f64) -> Self {
        self.options.constraints.max_distance_per_route_km = km;
        self
    }

    fn budget_secs(mut self, secs: u64) -> Self {
        self.options.constraints.time_budget_secs = secs;
        self
    }

    fn days(mut self, days: &[&str]) -> Self {
        self.options.working_days = days.iter().map(|day| day.to_string()).collect();
        self
    }

    fn build(self) -> SolveOptions {
        self.options
    }
}

fn solve(customers: &[Customer], options: &SolveOptions) -> RoutingResult {
    solve_zone("RIY001", &depot(), customers, &TravelProvider::estimated(40.0), options).unwrap()
}

/// Every routed customer appears exactly once across all plans.
fn assert_each_routed_once(result: &RoutingResult, expected: usize) {
    let mut seen = HashSet::new();
    for plan in &result.plans {
        for stop in &plan.stops {
            assert!(seen.insert(stop.customer_id.clone()), "{} routed twice", stop.customer_id);
        }
    }
    assert_eq!(seen.len(), expected);
    assert_eq!(result.routed_customers(), expected);
}

// ============================================================================
// Hard constraints
// ============================================================================

#[rstest]
#[case(5)]
#[case(8)]
#[case(25)]
fn test_capacity_is_never_exceeded(#[case] max: usize) {
    let customers = customers();
    let options = OptionsBuilder::new().max_customers(max).min_customers(0).build();

    let result = solve(&customers, &options);

    assert_each_routed_once(&result, customers.len());
    assert!(result.plans.iter().all(|plan| plan.customer_count <= max));
    assert!(result.plans.len() >= customers.len().div_ceil(max));
}

#[test]
fn test_duration_limit_splits_routes() {
    let customers = customers();
    let options = OptionsBuilder::new().max_duration(120.0).build();

    let result = solve(&customers, &options);

    assert_each_routed_once(&result, customers.len());
    for plan in &result.plans {
        if plan.customer_count > 1 {
            assert!(
                plan.total_duration_min <= 120.0 + 1e-6,
                "{} takes {}",
                plan.route_id,
                plan.total_duration_min
            );
            assert!(plan.violations.duration_min.is_none());
        }
    }
}

#[test]
fn test_lone_customer_beyond_duration_gets_flagged_route() {
    let far = Customer::new("far", 25.6, 46.6);
    let near = Customer::new("near", 24.72, 46.68);
    let options = OptionsBuilder::new().max_duration(60.0).min_customers(0).build();

    let result = solve(&[near, far], &options);

    assert_each_routed_once(&result, 2);
    let far_plan = result
        .plans
        .iter()
        .find(|plan| plan.stops.iter().any(|stop| stop.customer_id == "far"))
        .unwrap();
    assert_eq!(far_plan.customer_count, 1);
    assert!(far_plan.violations.duration_min.unwrap() > 0.0);
}

// ============================================================================
// Soft constraints and plan shape
// ============================================================================

#[test]
fn test_soft_limits_are_reported_not_rejected() {
    let customers = customers();
    let options = OptionsBuilder::new().max_distance(5.0).min_customers(30).build();

    let result = solve(&customers, &options);

    assert_each_routed_once(&result, customers.len());
    assert!(result.has_violations());
    for plan in &result.plans {
        assert_eq!(plan.violations.min_customers, Some(30 - plan.customer_count));
        if plan.total_distance_km > 5.0 {
            let excess = plan.violations.distance_km.unwrap();
            assert!((excess - (plan.total_distance_km - 5.0)).abs() < 1e-9);
        }
    }
}

#[test]
fn test_plans_are_sequenced_and_cycle_days() {
    let customers = customers();
    let options = OptionsBuilder::new().max_customers(3).days(&["SUN", "MON"]).build();

    let result = solve(&customers, &options);

    assert!(result.plans.len() >= 8);
    for (index, plan) in result.plans.iter().enumerate() {
        assert_eq!(plan.route_id, format!("RIY001_R{:02}", index + 1));
        assert_eq!(plan.day, if index % 2 == 0 { "SUN" } else { "MON" });
        assert_eq!(plan.zone_id, "RIY001");

        let sequences: Vec<usize> = plan.stops.iter().map(|stop| stop.sequence).collect();
        assert_eq!(sequences, (1..=plan.customer_count).collect::<Vec<_>>());

        let mut previous = 0.0;
        let mut legs = 0.0;
        for stop in &plan.stops {
            assert!(stop.arrival_min >= previous);
            previous = stop.arrival_min;
            legs += stop.distance_from_prev_km;
        }
        assert!(plan.total_distance_km >= legs);
        assert!(plan.total_duration_min >= previous);
    }
}

#[test]
fn test_zero_budget_returns_constructed_routes() {
    let customers = customers();
    let options = OptionsBuilder::new().budget_secs(0).build();

    let result = solve(&customers, &options);

    assert_eq!(result.status, SolveStatus::TimeLimit);
    assert_each_routed_once(&result, customers.len());
}

#[test]
fn test_generous_budget_converges() {
    let customers = customers();
    let options = OptionsBuilder::new().budget_secs(30).build();

    let result = solve(&customers[..8], &options);

    assert_eq!(result.status, SolveStatus::Converged);
    assert_eq!(result.precision, Some(Precision::Estimated));
}

#[test]
fn test_unbounded_budget_does_not_overflow() {
    let customers = customers();
    let options = OptionsBuilder::new().budget_secs(u64::MAX).build();

    let result = solve(&customers[..8], &options);

    assert_eq!(result.status, SolveStatus::Converged);
    assert_each_routed_once(&result, 8);
}

// ============================================================================
// Reachability and input handling
// ============================================================================

#[test]
fn test_unreachable_customers_are_reported() {
    let customers = customers();
    let island = customers[3].location();
    let provider = BlockedProvider::new(vec![island]);

    let options = OptionsBuilder::new().build();
    let result = solve_zone("RIY001", &depot(), &customers, &provider, &options).unwrap();

    assert_eq!(result.unreachable, vec![customers[3].id.clone()]);
    assert_each_routed_once(&result, customers.len() - 1);
}

#[test]
fn test_empty_zone_yields_no_plans() {
    let result = solve(&[], &OptionsBuilder::new().build());
    assert!(result.plans.is_empty());
    assert_eq!(result.status, SolveStatus::Converged);
    assert!(result.precision.is_none());
}

#[test]
fn test_empty_working_days_is_rejected() {
    let options = OptionsBuilder::new().days(&[]).build();
    let provider = TravelProvider::estimated(40.0);
    let err = solve_zone("Z", &depot(), &customers(), &provider, &options).unwrap_err();
    assert!(matches!(err, EngineError::Input(InputError::EmptyWorkingDays)));
}

#[test]
fn test_zero_capacity_is_rejected() {
    let mut options = OptionsBuilder::new().build();
    options.constraints = ConstraintSet {
        max_customers_per_route: 0,
        ..ConstraintSet::default()
    };
    let provider = TravelProvider::estimated(40.0);
    let err = solve_zone("Z", &depot(), &customers(), &provider, &options).unwrap_err();
    assert!(matches!(err, EngineError::Input(InputError::InvalidConstraints(_))));
}

// ============================================================================
// Fixed routes, whole assignments, overlays
// ============================================================================

#[test]
fn test_fixed_routes_keep_membership() {
    let customers = customers();
    let groups: Vec<Vec<Customer>> = customers.chunks(6).map(<[Customer]>::to_vec).collect();
    let options = OptionsBuilder::new().build();
    let provider = TravelProvider::estimated(40.0);

    let result = solve_fixed_routes("RIY001", &depot(), &groups, &provider, &options).unwrap();

    assert_eq!(result.plans.len(), groups.len());
    for (plan, group) in result.plans.iter().zip(&groups) {
        let planned: HashSet<&str> =
            plan.stops.iter().map(|stop| stop.customer_id.as_str()).collect();
        let expected: HashSet<&str> = group.iter().map(|customer| customer.id.as_str()).collect();
        assert_eq!(planned, expected);
    }
}

#[test]
fn test_solve_assignment_routes_each_zone() {
    let customers = customers();
    let mut assignment = ZoneAssignment::new();
    for (i, customer) in customers.iter().enumerate() {
        assignment.assign(customer.id.clone(), if i < 12 { "Z1" } else { "Z2" });
    }
    let config = EngineConfig {
        constraints: ConstraintSet {
            time_budget_secs: 2,
            ..ConstraintSet::default()
        },
        ..EngineConfig::default()
    };

    let provider = TravelProvider::estimated(40.0);
    let results =
        solve_assignment(&depot(), &customers, &assignment, &provider, &config).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].zone_id, "Z1");
    assert_eq!(results[1].zone_id, "Z2");
    assert_eq!(results.iter().map(RoutingResult::routed_customers).sum::<usize>(), customers.len());
}

#[test]
fn test_overlays_follow_plans() {
    let customers = customers();
    let provider = TravelProvider::estimated(40.0);
    let result = solve(&customers, &OptionsBuilder::new().max_customers(10).build());

    let overlays = route_overlays(&result.plans, &depot(), &customers, &provider).unwrap();

    assert_eq!(overlays.len(), result.plans.len());
    for (overlay, plan) in overlays.iter().zip(&result.plans) {
        assert_eq!(overlay.route_id, plan.route_id);
        assert_eq!(overlay.geometry.polyline.points().len(), plan.customer_count + 2);
        assert_eq!(overlay.geometry.precision, Precision::Estimated);
        assert!((overlay.geometry.distance_km - plan.total_distance_km).abs() < 1e-6);
    }
}
