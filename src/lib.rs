//! zone-planner core
//!
//! Assigns geolocated customers to delivery zones and routes each zone from
//! a depot under capacity, duration and distance constraints.

pub mod balancer;
pub mod config;
pub mod distance;
pub mod error;
pub mod export;
pub mod geometry;
pub mod haversine;
pub mod model;
pub mod osrm;
pub mod polyline;
pub mod solver;
pub mod traits;
pub mod zoning;

pub use config::EngineConfig;
pub use distance::{Precision, TravelProvider};
pub use error::{EngineError, InputError};
pub use model::{Customer, Depot, RoutePlan, RoutingResult, ZoneAssignment, ZonePolygon};
pub use solver::{solve_zone, SolveOptions};
pub use traits::DistanceProvider;
pub use zoning::{generate_zones, ZoneStrategy, ZoningRequest, ZoningResult};
