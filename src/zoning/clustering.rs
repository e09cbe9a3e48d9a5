//! Size-constrained k-means.
//!
//! Customers are projected onto a local kilometre plane around their mean,
//! clustered with Lloyd iterations from a deterministic seeding, then
//! repaired with [`adjust_step`] until every cluster fits the size bounds or
//! no repair applies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::InputError;
use crate::geometry;
use crate::model::{Customer, Depot, ZoneAssignment, ZoneId};

use super::{hull_boundaries, StrategyKind, StrategyReport, ZoningResult};

const KM_PER_DEGREE_LAT: f64 = 110.574;
const KM_PER_DEGREE_LNG: f64 = 111.320;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringParams {
    /// Requested number of zones; capped at the number of customers.
    pub zones: usize,
    pub max_customers_per_zone: Option<usize>,
    pub min_customers_per_zone: Option<usize>,
    pub seed: u64,
    pub max_iterations: usize,
}

impl ClusteringParams {
    pub fn new(zones: usize) -> Self {
        Self::from_config(zones, &EngineConfig::default())
    }

    pub fn from_config(zones: usize, config: &EngineConfig) -> Self {
        Self {
            zones,
            max_customers_per_zone: None,
            min_customers_per_zone: None,
            seed: config.clustering_seed,
            max_iterations: config.clustering_max_iterations,
        }
    }

    pub fn with_bounds(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_customers_per_zone = min;
        self.max_customers_per_zone = max;
        self
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn bounds(&self) -> SizeBounds {
        SizeBounds {
            min: self.min_customers_per_zone,
            max: self.max_customers_per_zone,
        }
    }

    fn validate(&self) -> Result<(), InputError> {
        if self.zones == 0 {
            return Err(InputError::InvalidClustering("zones must be >= 1".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(InputError::InvalidClustering("max_iterations must be >= 1".to_string()));
        }
        if self.max_customers_per_zone == Some(0) {
            return Err(InputError::InvalidClustering(
                "max_customers_per_zone must be >= 1".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (self.min_customers_per_zone, self.max_customers_per_zone) {
            if min > max {
                return Err(InputError::InvalidClustering(format!(
                    "min_customers_per_zone ({min}) exceeds max_customers_per_zone ({max})"
                )));
            }
        }
        Ok(())
    }
}

/// Inclusive cluster size bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeBounds {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl SizeBounds {
    fn oversize(&self, len: usize) -> bool {
        self.max.is_some_and(|max| len > max)
    }

    fn undersize(&self, len: usize) -> bool {
        self.min.is_some_and(|min| len < min)
    }

    fn fits(&self, len: usize) -> bool {
        self.max.is_none_or(|max| len <= max)
    }
}

/// One repair applied by [`adjust_step`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClusterAction {
    /// Cluster `cluster` was split; the second part was appended at the end.
    Split { cluster: usize, sizes: (usize, usize) },
    /// Cluster `from` was folded into another and removed; `into` indexes
    /// the surviving cluster after the removal.
    Merge { from: usize, into: usize },
}

/// Result of one repair step.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustStep {
    pub clusters: Vec<Vec<usize>>,
    pub still_violating: bool,
    /// `None` when no repair applied; further steps would change nothing.
    pub action: Option<ClusterAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringReport {
    /// Mean `(lat, lng)` of each final zone, in zone order.
    pub centers: Vec<(f64, f64)>,
    pub iterations: usize,
    pub converged: bool,
    pub actions: Vec<ClusterAction>,
    /// Zones still outside the size bounds after repair.
    pub residual_violations: Vec<ZoneId>,
}

pub fn zone_id(depot: &Depot, index: usize) -> String {
    format!("{}C{:02}", depot.zone_prefix(), index + 1)
}

pub(crate) fn generate(
    depot: &Depot,
    customers: &[Customer],
    params: &ClusteringParams,
) -> Result<ZoningResult, InputError> {
    params.validate()?;

    let points = project(customers);
    let k = params.zones.min(points.len());
    let indices: Vec<usize> = (0..points.len()).collect();
    let run = kmeans(&points, &indices, k, params.seed, params.max_iterations);
    debug!(k, iterations = run.iterations, converged = run.converged, "k-means finished");

    let mut clusters = group(&run.labels, k);
    clusters.retain(|members| !members.is_empty());

    let bounds = params.bounds();
    let mut actions = Vec::new();
    let cap = 2 * points.len() + 10;
    for _ in 0..cap {
        let step = adjust_step(clusters, &points, bounds, params.seed);
        clusters = step.clusters;
        match step.action {
            Some(action) => actions.push(action),
            None => break,
        }
        if !step.still_violating {
            break;
        }
    }

    let mut assignment = ZoneAssignment::new();
    let mut centers = Vec::with_capacity(clusters.len());
    let mut residual_violations = Vec::new();
    for (index, members) in clusters.iter().enumerate() {
        let zone = zone_id(depot, index);
        let locations: Vec<(f64, f64)> = members.iter().map(|i| customers[*i].location()).collect();
        centers.push(geometry::mean_point(&locations));
        if bounds.oversize(members.len()) || bounds.undersize(members.len()) {
            residual_violations.push(zone.clone());
        }
        for i in members {
            assignment.assign(customers[*i].id.clone(), zone.clone());
        }
    }
    if !residual_violations.is_empty() {
        warn!(zones = ?residual_violations, "clusters left outside size bounds");
    }

    let boundaries = hull_boundaries(&assignment, customers);
    Ok(ZoningResult::new(
        StrategyKind::Clustering,
        assignment,
        boundaries,
        StrategyReport::Clustering(ClusteringReport {
            centers,
            iterations: run.iterations,
            converged: run.converged,
            actions,
            residual_violations,
        }),
    ))
}

/// One repair step over `clusters` (member indices into `points`).
///
/// Splits the largest oversize cluster with a two-way k-means; once nothing is
/// oversize, merges the smallest undersize cluster into the nearest cluster
/// (by centroid) that can absorb it without exceeding the maximum.
pub fn adjust_step(
    mut clusters: Vec<Vec<usize>>,
    points: &[(f64, f64)],
    bounds: SizeBounds,
    seed: u64,
) -> AdjustStep {
    let action = split_largest(&mut clusters, points, bounds, seed)
        .or_else(|| merge_smallest(&mut clusters, points, bounds));
    let still_violating = clusters
        .iter()
        .any(|members| bounds.oversize(members.len()) || bounds.undersize(members.len()));
    AdjustStep {
        clusters,
        still_violating,
        action,
    }
}

fn split_largest(
    clusters: &mut Vec<Vec<usize>>,
    points: &[(f64, f64)],
    bounds: SizeBounds,
    seed: u64,
) -> Option<ClusterAction> {
    let target = clusters
        .iter()
        .enumerate()
        .filter(|(_, members)| bounds.oversize(members.len()) && members.len() >= 2)
        .max_by(|a, b| a.1.len().cmp(&b.1.len()).then(b.0.cmp(&a.0)))
        .map(|(index, _)| index)?;

    let members = std::mem::take(&mut clusters[target]);
    let run = kmeans(points, &members, 2, seed, 50);
    let (mut first, mut second): (Vec<usize>, Vec<usize>) = (Vec::new(), Vec::new());
    for (member, label) in members.iter().zip(&run.labels) {
        if *label == 0 {
            first.push(*member);
        } else {
            second.push(*member);
        }
    }
    if first.is_empty() || second.is_empty() {
        let half = members.len() / 2;
        first = members[..half].to_vec();
        second = members[half..].to_vec();
    }

    let sizes = (first.len(), second.len());
    clusters[target] = first;
    clusters.push(second);
    Some(ClusterAction::Split {
        cluster: target,
        sizes,
    })
}

fn merge_smallest(
    clusters: &mut Vec<Vec<usize>>,
    points: &[(f64, f64)],
    bounds: SizeBounds,
) -> Option<ClusterAction> {
    if clusters.len() < 2 {
        return None;
    }
    let centers: Vec<(f64, f64)> = clusters
        .iter()
        .map(|members| center_of(points, members))
        .collect();

    let mut undersize: Vec<usize> = (0..clusters.len())
        .filter(|i| bounds.undersize(clusters[*i].len()))
        .collect();
    undersize.sort_by_key(|i| (clusters[*i].len(), *i));

    for from in undersize {
        let into = (0..clusters.len())
            .filter(|j| *j != from && bounds.fits(clusters[*j].len() + clusters[from].len()))
            .min_by(|a, b| {
                squared(centers[from], centers[*a])
                    .total_cmp(&squared(centers[from], centers[*b]))
                    .then(a.cmp(b))
            });
        if let Some(into) = into {
            let moved = std::mem::take(&mut clusters[from]);
            clusters[into].extend(moved);
            clusters.remove(from);
            let into = if into > from { into - 1 } else { into };
            return Some(ClusterAction::Merge { from, into });
        }
    }
    None
}

/// Outcome of a Lloyd run over a subset of points.
struct KMeansRun {
    /// Label per entry of the subset, in subset order.
    labels: Vec<usize>,
    iterations: usize,
    converged: bool,
}

/// Lloyd iterations over `points[subset]` with farthest-first seeding.
///
/// The first centre is drawn from a generator seeded with `seed`; each further
/// centre is the first point farthest from all existing centres. Ties in
/// assignment go to the lowest centre index, and empty clusters keep their
/// centre.
fn kmeans(
    points: &[(f64, f64)],
    subset: &[usize],
    k: usize,
    seed: u64,
    max_iterations: usize,
) -> KMeansRun {
    let n = subset.len();
    if n == 0 || k == 0 {
        return KMeansRun {
            labels: vec![0; n],
            iterations: 0,
            converged: true,
        };
    }
    let k = k.min(n);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut chosen = vec![rng.gen_range(0..n)];
    while chosen.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..n {
            if chosen.contains(&i) {
                continue;
            }
            let d = chosen
                .iter()
                .map(|c| squared(points[subset[i]], points[subset[*c]]))
                .fold(f64::INFINITY, f64::min);
            if best.is_none_or(|(_, best_d)| d > best_d) {
                best = Some((i, d));
            }
        }
        match best {
            Some((i, _)) => chosen.push(i),
            None => break,
        }
    }
    let mut centers: Vec<(f64, f64)> = chosen.iter().map(|i| points[subset[*i]]).collect();

    let mut labels: Vec<usize> = Vec::new();
    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        iterations += 1;
        let next: Vec<usize> = subset.par_iter().map(|i| nearest(points[*i], &centers)).collect();
        if next == labels {
            converged = true;
            break;
        }
        labels = next;

        for (c, center) in centers.iter_mut().enumerate() {
            let members: Vec<usize> = subset
                .iter()
                .zip(&labels)
                .filter(|(_, label)| **label == c)
                .map(|(i, _)| *i)
                .collect();
            if !members.is_empty() {
                *center = center_of(points, &members);
            }
        }
    }

    KMeansRun {
        labels,
        iterations,
        converged,
    }
}

fn nearest(point: (f64, f64), centers: &[(f64, f64)]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let d = squared(point, *center);
        if d < best_d {
            best = c;
            best_d = d;
        }
    }
    best
}

fn group(labels: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut clusters = vec![Vec::new(); k];
    for (i, label) in labels.iter().enumerate() {
        clusters[*label].push(i);
    }
    clusters
}

fn center_of(points: &[(f64, f64)], members: &[usize]) -> (f64, f64) {
    let located: Vec<(f64, f64)> = members.iter().map(|i| points[*i]).collect();
    geometry::mean_point(&located)
}

fn squared(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}

/// Equirectangular projection to `(x_km, y_km)` about the mean location.
fn project(customers: &[Customer]) -> Vec<(f64, f64)> {
    let locations: Vec<(f64, f64)> = customers.iter().map(Customer::location).collect();
    let (lat0, lng0) = geometry::mean_point(&locations);
    let scale = lat0.to_radians().cos() * KM_PER_DEGREE_LNG;
    locations
        .iter()
        .map(|(lat, lng)| ((lng - lng0) * scale, (lat - lat0) * KM_PER_DEGREE_LAT))
        .collect()
}
