//! Per-zone vehicle routing.
//!
//! Build matrix, construct routes with a nearest-arc greedy from the depot,
//! refine with local search until no move improves or the time budget runs
//! out, then extract day-assigned plans. Capacity and duration are hard;
//! route distance and minimum size are soft and reported per plan.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::distance::{RouteGeometry, TravelMatrix};
use crate::error::{EngineError, InputError};
use crate::model::{
    validate_customers, ConstraintSet, ConstraintViolations, Customer, CustomerId, Depot,
    RoutePlan, RoutingResult, SolveStatus, Stop, ZoneAssignment, ZoneId,
};
use crate::traits::DistanceProvider;

/// Matrix index of the depot.
const DEPOT: usize = 0;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub constraints: ConstraintSet,
    /// Day labels that routes are dealt over, round-robin.
    pub working_days: Vec<String>,
    /// Cost per kilometre above the soft distance limit.
    pub distance_penalty: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), None)
    }
}

impl SolveOptions {
    /// Options for `city`, with its constraint overrides applied.
    pub fn from_config(config: &EngineConfig, city: Option<&str>) -> Self {
        Self {
            constraints: config.constraints_for(city),
            working_days: config.working_days.clone(),
            distance_penalty: 10.0,
        }
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.constraints.time_budget_secs = budget.as_secs();
        self
    }

    fn validate(&self) -> Result<(), InputError> {
        self.constraints.validate()?;
        if self.working_days.is_empty() {
            return Err(InputError::EmptyWorkingDays);
        }
        Ok(())
    }
}

/// Polyline overlay for one plan: depot, stops in order, depot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOverlay {
    pub route_id: String,
    pub geometry: RouteGeometry,
}

/// Routes the customers of one zone.
pub fn solve_zone<P: DistanceProvider + ?Sized>(
    zone_id: &str,
    depot: &Depot,
    customers: &[Customer],
    provider: &P,
    options: &SolveOptions,
) -> Result<RoutingResult, EngineError> {
    depot.validate()?;
    options.validate()?;
    if customers.is_empty() {
        return Ok(empty_result(zone_id));
    }
    validate_customers(customers)?;

    let started = Instant::now();
    let deadline = deadline_after(started, options.constraints.time_budget_secs);

    let mut points = vec![depot.location()];
    points.extend(customers.iter().map(Customer::location));
    let matrix = provider.square(&points)?;
    info!(
        zone = zone_id,
        customers = customers.len(),
        precision = ?matrix.precision(),
        "travel matrix built"
    );

    let (reachable, unreachable) = split_reachable(&matrix, customers);
    if !unreachable.is_empty() {
        warn!(
            zone = zone_id,
            count = unreachable.len(),
            "customers unreachable from depot left unrouted"
        );
    }

    let search = LocalSearch {
        matrix: &matrix,
        constraints: &options.constraints,
        distance_penalty: options.distance_penalty,
        deadline,
    };
    let mut routes = search.construct(&reachable);
    debug!(zone = zone_id, routes = routes.len(), "initial routes constructed");

    let status = search.refine(&mut routes);
    match status {
        SolveStatus::Converged => info!(
            zone = zone_id,
            routes = routes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "local search converged"
        ),
        SolveStatus::TimeLimit => warn!(
            zone = zone_id,
            routes = routes.len(),
            "time budget exhausted; returning best routes found"
        ),
    }

    Ok(RoutingResult {
        zone_id: zone_id.to_string(),
        plans: extract_plans(zone_id, &routes, &matrix, customers, options),
        unreachable,
        status,
        precision: Some(matrix.precision()),
    })
}

/// Reorders stops inside routes whose membership is already decided.
///
/// Each inner slice is one route; membership is kept even when it breaks the
/// hard limits, which are then reported as violations.
pub fn solve_fixed_routes<P: DistanceProvider + ?Sized>(
    zone_id: &str,
    depot: &Depot,
    routes: &[Vec<Customer>],
    provider: &P,
    options: &SolveOptions,
) -> Result<RoutingResult, EngineError> {
    depot.validate()?;
    options.validate()?;
    let customers: Vec<Customer> = routes.iter().flatten().cloned().collect();
    if customers.is_empty() {
        return Ok(empty_result(zone_id));
    }
    validate_customers(&customers)?;

    let deadline = deadline_after(Instant::now(), options.constraints.time_budget_secs);
    let mut points = vec![depot.location()];
    points.extend(customers.iter().map(Customer::location));
    let matrix = provider.square(&points)?;

    let (reachable, unreachable) = split_reachable(&matrix, &customers);
    let search = LocalSearch {
        matrix: &matrix,
        constraints: &options.constraints,
        distance_penalty: options.distance_penalty,
        deadline,
    };

    let mut status = SolveStatus::Converged;
    let mut sequenced = Vec::with_capacity(routes.len());
    let mut offset = 0;
    for route in routes {
        let nodes: Vec<usize> = (offset + 1..=offset + route.len())
            .filter(|node| reachable.contains(node))
            .collect();
        offset += route.len();
        if nodes.is_empty() {
            continue;
        }
        let mut ordered = search.nearest_neighbour(&nodes);
        if search.sequence(&mut ordered) == SolveStatus::TimeLimit {
            status = SolveStatus::TimeLimit;
        }
        sequenced.push(ordered);
    }

    Ok(RoutingResult {
        zone_id: zone_id.to_string(),
        plans: extract_plans(zone_id, &sequenced, &matrix, &customers, options),
        unreachable,
        status,
        precision: Some(matrix.precision()),
    })
}

/// Routes every zone of an assignment, zones in parallel.
///
/// Constraints come from the city of each zone's first customer.
pub fn solve_assignment<P: DistanceProvider + Sync + ?Sized>(
    depot: &Depot,
    customers: &[Customer],
    assignment: &ZoneAssignment,
    provider: &P,
    config: &EngineConfig,
) -> Result<Vec<RoutingResult>, EngineError> {
    let zones: Vec<ZoneId> = assignment.counts().into_keys().collect();
    zones
        .par_iter()
        .map(|zone| {
            let members: Vec<Customer> = assignment
                .customers_in(zone, customers)
                .into_iter()
                .cloned()
                .collect();
            let city = members.first().and_then(|customer| customer.city.as_deref());
            let options = SolveOptions::from_config(config, city);
            solve_zone(zone, depot, &members, provider, &options)
        })
        .collect()
}

/// Road geometry for each plan.
pub fn route_overlays<P: DistanceProvider + ?Sized>(
    plans: &[RoutePlan],
    depot: &Depot,
    customers: &[Customer],
    provider: &P,
) -> Result<Vec<RouteOverlay>, EngineError> {
    let by_id: HashMap<&str, &Customer> = customers
        .iter()
        .map(|customer| (customer.id.as_str(), customer))
        .collect();
    let mut overlays = Vec::with_capacity(plans.len());
    for plan in plans {
        let mut points = vec![depot.location()];
        for stop in &plan.stops {
            match by_id.get(stop.customer_id.as_str()) {
                Some(customer) => points.push(customer.location()),
                None => warn!(
                    route = %plan.route_id,
                    customer = %stop.customer_id,
                    "stop without a known customer skipped"
                ),
            }
        }
        points.push(depot.location());
        overlays.push(RouteOverlay {
            route_id: plan.route_id.clone(),
            geometry: provider.route(&points)?,
        });
    }
    Ok(overlays)
}

fn empty_result(zone_id: &str) -> RoutingResult {
    RoutingResult {
        zone_id: zone_id.to_string(),
        plans: Vec::new(),
        unreachable: Vec::new(),
        status: SolveStatus::Converged,
        precision: None,
    }
}

/// Matrix nodes reachable both ways from the depot, and ids of the rest.
fn split_reachable(matrix: &TravelMatrix, customers: &[Customer]) -> (Vec<usize>, Vec<CustomerId>) {
    let mut reachable = Vec::with_capacity(customers.len());
    let mut unreachable = Vec::new();
    for (i, customer) in customers.iter().enumerate() {
        let node = i + 1;
        if matrix.is_reachable(DEPOT, node) && matrix.is_reachable(node, DEPOT) {
            reachable.push(node);
        } else {
            unreachable.push(customer.id.clone());
        }
    }
    (reachable, unreachable)
}

/// `None` when the budget reaches past what `Instant` can represent; the
/// search then runs until it converges.
fn deadline_after(start: Instant, budget_secs: u64) -> Option<Instant> {
    start.checked_add(Duration::from_secs(budget_secs))
}

struct LocalSearch<'a> {
    matrix: &'a TravelMatrix,
    constraints: &'a ConstraintSet,
    distance_penalty: f64,
    deadline: Option<Instant>,
}

impl LocalSearch<'_> {
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Distance and duration of depot → route → depot.
    fn totals(&self, route: &[usize]) -> (f64, f64) {
        let mut prev = DEPOT;
        let mut distance = 0.0;
        let mut duration = 0.0;
        for node in route {
            distance += self.matrix.distance_km(prev, *node);
            duration += self.matrix.duration_min(prev, *node);
            prev = *node;
        }
        if !route.is_empty() {
            distance += self.matrix.distance_km(prev, DEPOT);
            duration += self.matrix.duration_min(prev, DEPOT);
        }
        (distance, duration)
    }

    /// Hard limits hold; single-stop routes are always accepted.
    fn admissible(&self, route: &[usize]) -> bool {
        if route.len() <= 1 {
            return true;
        }
        route.len() <= self.constraints.max_customers_per_route
            && self.totals(route).1 <= self.constraints.max_route_duration_minutes + EPSILON
    }

    fn cost(&self, route: &[usize]) -> f64 {
        let (distance, _) = self.totals(route);
        let excess = (distance - self.constraints.max_distance_per_route_km).max(0.0);
        distance + self.distance_penalty * excess
    }

    /// Nearest-arc greedy: extend the open route with the closest customer
    /// that keeps it within capacity and duration, start a new route when
    /// none fits.
    fn construct(&self, nodes: &[usize]) -> Vec<Vec<usize>> {
        let mut pending: Vec<usize> = nodes.to_vec();
        let mut routes = Vec::new();

        while !pending.is_empty() {
            let mut route: Vec<usize> = Vec::new();
            let mut last = DEPOT;
            let mut duration = 0.0;

            loop {
                if route.len() >= self.constraints.max_customers_per_route {
                    break;
                }
                let mut best: Option<(usize, f64)> = None;
                for (position, node) in pending.iter().enumerate() {
                    let leg = self.matrix.duration_min(last, *node);
                    let closing = self.matrix.duration_min(*node, DEPOT);
                    let limit = self.constraints.max_route_duration_minutes + EPSILON;
                    if duration + leg + closing > limit {
                        continue;
                    }
                    let arc = self.matrix.distance_km(last, *node);
                    if best.is_none_or(|(_, best_arc)| arc < best_arc) {
                        best = Some((position, arc));
                    }
                }
                let Some((position, _)) = best else {
                    break;
                };
                let node = pending.remove(position);
                duration += self.matrix.duration_min(last, node);
                last = node;
                route.push(node);
            }

            if route.is_empty() {
                // Even a lone out-and-back breaks the duration limit.
                let node = pending.remove(0);
                warn!(node, "customer exceeds the duration limit on its own; routed alone");
                route.push(node);
            }
            routes.push(route);
        }
        routes
    }

    /// Plain nearest-neighbour order, used when membership is fixed.
    fn nearest_neighbour(&self, nodes: &[usize]) -> Vec<usize> {
        let mut pending = nodes.to_vec();
        let mut ordered = Vec::with_capacity(nodes.len());
        let mut last = DEPOT;
        while !pending.is_empty() {
            let mut best = 0;
            for (position, node) in pending.iter().enumerate() {
                let best_km = self.matrix.distance_km(last, pending[best]);
                if self.matrix.distance_km(last, *node) < best_km {
                    best = position;
                }
            }
            last = pending.remove(best);
            ordered.push(last);
        }
        ordered
    }

    /// Intra- and inter-route moves until nothing improves or time is up.
    fn refine(&self, routes: &mut Vec<Vec<usize>>) -> SolveStatus {
        loop {
            if self.expired() {
                return SolveStatus::TimeLimit;
            }
            let mut improved = false;
            for route in routes.iter_mut() {
                if self.two_opt_improve(route) || self.or_opt_improve(route) {
                    improved = true;
                }
            }
            if self.relocate_improve(routes) {
                improved = true;
            }
            if !improved {
                return if self.expired() {
                    SolveStatus::TimeLimit
                } else {
                    SolveStatus::Converged
                };
            }
        }
    }

    /// Intra-route moves only.
    fn sequence(&self, route: &mut Vec<usize>) -> SolveStatus {
        loop {
            if self.expired() {
                return SolveStatus::TimeLimit;
            }
            let improved =
                self.two_opt_improve_unchecked(route) || self.or_opt_improve_unchecked(route);
            if !improved {
                return if self.expired() {
                    SolveStatus::TimeLimit
                } else {
                    SolveStatus::Converged
                };
            }
        }
    }

    fn two_opt_improve(&self, route: &mut Vec<usize>) -> bool {
        self.two_opt(route, true)
    }

    fn two_opt_improve_unchecked(&self, route: &mut Vec<usize>) -> bool {
        self.two_opt(route, false)
    }

    fn or_opt_improve(&self, route: &mut Vec<usize>) -> bool {
        self.or_opt(route, true)
    }

    fn or_opt_improve_unchecked(&self, route: &mut Vec<usize>) -> bool {
        self.or_opt(route, false)
    }

    /// 2-opt: reverse a segment of the route.
    fn two_opt(&self, route: &mut Vec<usize>, check_limits: bool) -> bool {
        let n = route.len();
        if n < 2 {
            return false;
        }
        let current = self.cost(route);
        for i in 0..n - 1 {
            if self.expired() {
                return false;
            }
            for j in i + 1..n {
                let mut candidate = route.clone();
                candidate[i..=j].reverse();
                if check_limits && !self.admissible(&candidate) {
                    continue;
                }
                if self.cost(&candidate) < current - EPSILON {
                    *route = candidate;
                    return true;
                }
            }
        }
        false
    }

    /// Or-opt: move a run of up to three consecutive stops elsewhere in the route.
    fn or_opt(&self, route: &mut Vec<usize>, check_limits: bool) -> bool {
        let n = route.len();
        if n < 3 {
            return false;
        }
        let current = self.cost(route);
        for len in 1..=3.min(n - 1) {
            for start in 0..=n - len {
                if self.expired() {
                    return false;
                }
                let mut rest = route.clone();
                let segment: Vec<usize> = rest.drain(start..start + len).collect();
                for position in 0..=rest.len() {
                    if position == start {
                        continue;
                    }
                    let mut candidate = rest.clone();
                    candidate.splice(position..position, segment.iter().copied());
                    if check_limits && !self.admissible(&candidate) {
                        continue;
                    }
                    if self.cost(&candidate) < current - EPSILON {
                        *route = candidate;
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Relocate: move one stop into another route. Emptied routes are dropped.
    fn relocate_improve(&self, routes: &mut Vec<Vec<usize>>) -> bool {
        let costs: Vec<f64> = routes.iter().map(|route| self.cost(route)).collect();
        for from in 0..routes.len() {
            for index in 0..routes[from].len() {
                if self.expired() {
                    return false;
                }
                let mut source = routes[from].clone();
                let node = source.remove(index);
                if !self.admissible(&source) {
                    continue;
                }
                let source_cost = self.cost(&source);

                for to in 0..routes.len() {
                    if to == from {
                        continue;
                    }
                    for position in 0..=routes[to].len() {
                        let mut target = routes[to].clone();
                        target.insert(position, node);
                        if !self.admissible(&target) {
                            continue;
                        }
                        let delta = source_cost + self.cost(&target) - costs[from] - costs[to];
                        if delta < -EPSILON {
                            routes[from] = source;
                            routes[to] = target;
                            routes.retain(|route| !route.is_empty());
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

fn extract_plans(
    zone_id: &str,
    routes: &[Vec<usize>],
    matrix: &TravelMatrix,
    customers: &[Customer],
    options: &SolveOptions,
) -> Vec<RoutePlan> {
    let constraints = &options.constraints;
    routes
        .iter()
        .filter(|route| !route.is_empty())
        .enumerate()
        .map(|(index, route)| {
            let mut stops = Vec::with_capacity(route.len());
            let mut prev = DEPOT;
            let mut distance = 0.0;
            let mut duration = 0.0;
            for (position, node) in route.iter().enumerate() {
                let leg_km = matrix.distance_km(prev, *node);
                distance += leg_km;
                duration += matrix.duration_min(prev, *node);
                stops.push(Stop {
                    customer_id: customers[*node - 1].id.clone(),
                    sequence: position + 1,
                    arrival_min: duration,
                    distance_from_prev_km: leg_km,
                });
                prev = *node;
            }
            distance += matrix.distance_km(prev, DEPOT);
            duration += matrix.duration_min(prev, DEPOT);

            let violations = ConstraintViolations {
                distance_km: (distance > constraints.max_distance_per_route_km)
                    .then(|| distance - constraints.max_distance_per_route_km),
                duration_min: (duration > constraints.max_route_duration_minutes + EPSILON)
                    .then(|| duration - constraints.max_route_duration_minutes),
                min_customers: (route.len() < constraints.min_customers_per_route)
                    .then(|| constraints.min_customers_per_route - route.len()),
            };

            RoutePlan {
                zone_id: zone_id.to_string(),
                route_id: format!("{zone_id}_R{:02}", index + 1),
                day: options.working_days[index % options.working_days.len()].clone(),
                total_distance_km: distance,
                total_duration_min: duration,
                customer_count: route.len(),
                stops,
                violations,
            }
        })
        .collect()
}
