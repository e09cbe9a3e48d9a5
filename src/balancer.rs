//! Post-hoc redistribution of customers between zones.
//!
//! The most deviating zone is paired with its nearest partner on the other
//! side of the mean. Donor customers are ranked by travel distance to the
//! receiver's centroid and moved cheapest first until the pair is within
//! tolerance or moving more would overshoot. Every move spends one unit of an
//! explicit budget, so the pass always terminates.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, InputError};
use crate::geometry;
use crate::haversine::haversine_km;
use crate::model::{Customer, CustomerId, ZoneAssignment, ZoneId, ZonePolygon};
use crate::traits::DistanceProvider;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceOptions {
    /// Allowed deviation from the mean, as a fraction of the mean.
    pub tolerance: f64,
    /// Transfer budget; defaults to the number of assigned customers.
    pub max_iterations: Option<usize>,
}

impl BalanceOptions {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            max_iterations: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transfer {
    pub customer_id: CustomerId,
    pub from_zone: ZoneId,
    pub to_zone: ZoneId,
    /// Travel distance from the customer to the receiver's centroid.
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneImbalance {
    pub zone_id: ZoneId,
    pub count: usize,
    /// Signed distance from the mean, in customers.
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub tolerance: f64,
    pub mean: f64,
    pub counts_before: BTreeMap<ZoneId, usize>,
    pub counts_after: BTreeMap<ZoneId, usize>,
    pub transfers: Vec<Transfer>,
    /// Pairing rounds attempted.
    pub iterations: usize,
    pub balanced: bool,
    /// Zones still outside tolerance when the pass stopped.
    pub residual: Vec<ZoneImbalance>,
}

/// Transfer candidate ordered by distance only.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance_km: f64,
    customer: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_km
            .total_cmp(&other.distance_km)
            .then(self.customer.cmp(&other.customer))
    }
}

/// Rebalances `assignment` in place.
///
/// Zones are those present in the assignment plus every polygon's zone, so a
/// drawn zone with no members can still receive customers. Unassigned
/// customers are left alone.
pub fn balance<P: DistanceProvider + ?Sized>(
    assignment: &mut ZoneAssignment,
    customers: &[Customer],
    polygons: &[ZonePolygon],
    options: &BalanceOptions,
    provider: &P,
) -> Result<BalanceReport, EngineError> {
    if !options.tolerance.is_finite() || options.tolerance < 0.0 {
        return Err(InputError::InvalidTolerance(options.tolerance).into());
    }

    let mut members: BTreeMap<ZoneId, Vec<usize>> = polygons
        .iter()
        .map(|polygon| (polygon.zone_id.clone(), Vec::new()))
        .collect();
    for (index, customer) in customers.iter().enumerate() {
        if let Some(zone) = assignment.zone_of(&customer.id) {
            members.entry(zone.clone()).or_default().push(index);
        }
    }
    let polygon_centroids: HashMap<&str, (f64, f64)> = polygons
        .iter()
        .map(|polygon| (polygon.zone_id.as_str(), geometry::centroid(&polygon.ring)))
        .collect();

    let counts_before = counts(&members);
    let total: usize = counts_before.values().sum();
    let mean = if members.is_empty() {
        0.0
    } else {
        total as f64 / members.len() as f64
    };
    let allowed = options.tolerance * mean + EPSILON;
    let budget = options.max_iterations.unwrap_or(total);

    let mut transfers = Vec::new();
    let mut stuck: HashSet<ZoneId> = HashSet::new();
    let mut iterations = 0;

    while transfers.len() < budget {
        let Some(focus) = most_deviating(&members, mean, allowed, &stuck) else {
            break;
        };
        iterations += 1;

        let centroids = centroids(&members, customers, &polygon_centroids);
        let over = members[&focus].len() as f64 > mean;
        let partner = nearest_partner(&members, &centroids, &focus, mean, !over);
        let Some(partner) = partner else {
            debug!(zone = %focus, "no partner zone on the other side of the mean");
            stuck.insert(focus);
            continue;
        };
        let (donor, receiver) = if over {
            (focus.clone(), partner)
        } else {
            (partner, focus.clone())
        };

        let donor_points: Vec<(f64, f64)> = members[&donor]
            .iter()
            .map(|i| customers[*i].location())
            .collect();
        let matrix = provider.table(&donor_points, &[centroids[&receiver]])?;
        let mut heap: BinaryHeap<Reverse<Candidate>> = members[&donor]
            .iter()
            .enumerate()
            .filter(|(row, _)| matrix.is_reachable(*row, 0))
            .map(|(row, customer)| {
                Reverse(Candidate {
                    distance_km: matrix.distance_km(row, 0),
                    customer: *customer,
                })
            })
            .collect();

        let mut moved = 0;
        while let Some(Reverse(candidate)) = heap.pop() {
            let donor_count = members[&donor].len();
            let receiver_count = members[&receiver].len();
            if donor_count < receiver_count + 2 {
                break;
            }
            let within = |count: usize| (count as f64 - mean).abs() <= allowed;
            if within(donor_count) && within(receiver_count) {
                break;
            }
            if transfers.len() >= budget {
                break;
            }

            let customer = &customers[candidate.customer];
            if let Some(list) = members.get_mut(&donor) {
                list.retain(|i| *i != candidate.customer);
            }
            if let Some(list) = members.get_mut(&receiver) {
                list.push(candidate.customer);
            }
            assignment.assign(customer.id.clone(), receiver.clone());
            transfers.push(Transfer {
                customer_id: customer.id.clone(),
                from_zone: donor.clone(),
                to_zone: receiver.clone(),
                distance_km: candidate.distance_km,
            });
            moved += 1;
        }

        if moved == 0 {
            stuck.insert(focus);
        } else {
            debug!(from = %donor, to = %receiver, moved, "transferred customers");
            stuck.clear();
        }
    }

    let counts_after = counts(&members);
    let residual: Vec<ZoneImbalance> = counts_after
        .iter()
        .filter(|(_, count)| (**count as f64 - mean).abs() > allowed)
        .map(|(zone, count)| ZoneImbalance {
            zone_id: zone.clone(),
            count: *count,
            deviation: *count as f64 - mean,
        })
        .collect();
    let balanced = residual.is_empty();

    if balanced {
        info!(transfers = transfers.len(), iterations, mean, "zones balanced");
    } else {
        warn!(
            transfers = transfers.len(),
            iterations,
            mean,
            residual = residual.len(),
            "zones left outside balance tolerance"
        );
    }

    Ok(BalanceReport {
        tolerance: options.tolerance,
        mean,
        counts_before,
        counts_after,
        transfers,
        iterations,
        balanced,
        residual,
    })
}

fn counts(members: &BTreeMap<ZoneId, Vec<usize>>) -> BTreeMap<ZoneId, usize> {
    members.iter().map(|(zone, list)| (zone.clone(), list.len())).collect()
}

/// Zone furthest from the mean beyond `allowed`, skipping `stuck` zones.
/// Ties go to the lowest zone id.
fn most_deviating(
    members: &BTreeMap<ZoneId, Vec<usize>>,
    mean: f64,
    allowed: f64,
    stuck: &HashSet<ZoneId>,
) -> Option<ZoneId> {
    let mut best: Option<(&ZoneId, f64)> = None;
    for (zone, list) in members {
        if stuck.contains(zone) {
            continue;
        }
        let deviation = (list.len() as f64 - mean).abs();
        if deviation > allowed && best.is_none_or(|(_, d)| deviation > d) {
            best = Some((zone, deviation));
        }
    }
    best.map(|(zone, _)| zone.clone())
}

/// Nearest zone by centroid that sits strictly above (`above`) or below the mean.
fn nearest_partner(
    members: &BTreeMap<ZoneId, Vec<usize>>,
    centroids: &HashMap<ZoneId, (f64, f64)>,
    focus: &ZoneId,
    mean: f64,
    above: bool,
) -> Option<ZoneId> {
    let origin = centroids[focus];
    members
        .iter()
        .filter(|(zone, _)| *zone != focus)
        .filter(|(_, list)| {
            let count = list.len() as f64;
            if above { count > mean } else { count < mean }
        })
        .map(|(zone, _)| (zone, haversine_km(origin, centroids[zone])))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(zone, _)| zone.clone())
}

/// Mean member location per zone, falling back to the polygon centroid.
fn centroids(
    members: &BTreeMap<ZoneId, Vec<usize>>,
    customers: &[Customer],
    polygon_centroids: &HashMap<&str, (f64, f64)>,
) -> HashMap<ZoneId, (f64, f64)> {
    members
        .iter()
        .map(|(zone, list)| {
            let centroid = if list.is_empty() {
                polygon_centroids.get(zone.as_str()).copied().unwrap_or_default()
            } else {
                let points: Vec<(f64, f64)> =
                    list.iter().map(|i| customers[*i].location()).collect();
                geometry::mean_point(&points)
            };
            (zone.clone(), centroid)
        })
        .collect()
}
