//! Core capability traits for the planner.
//!
//! Backends implement these for whatever transport they use; the engine
//! only ever talks to the trait.

use crate::distance::{RouteGeometry, TravelMatrix};
use crate::error::ProviderError;

/// Resolves travel distance and duration between points.
///
/// Points are `(lat, lng)`. Queries are idempotent and safe to retry.
pub trait DistanceProvider {
    /// Matrix of `origins.len() x destinations.len()` cells.
    ///
    /// A result either covers every cell or the call fails; partial
    /// matrices are never returned.
    fn table(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<TravelMatrix, ProviderError>;

    /// Path through `points` in order, with totals.
    fn route(&self, points: &[(f64, f64)]) -> Result<RouteGeometry, ProviderError>;

    /// Square all-pairs matrix over `points`.
    fn square(&self, points: &[(f64, f64)]) -> Result<TravelMatrix, ProviderError> {
        self.table(points, points)
    }
}
