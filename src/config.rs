//! Engine configuration.
//!
//! Defaults cover a run without a routing service. [`EngineConfig::from_env`]
//! layers `IZG_`-prefixed settings (config file, then environment) over
//! those defaults through `ortho_config`.

use std::collections::HashMap;

use clap::Parser;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::haversine::DEFAULT_SPEED_KMH;
use crate::model::{ConstraintOverrides, ConstraintSet};
use crate::osrm::OsrmConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Live routing service; `None` means estimated distances only.
    pub osrm: Option<OsrmConfig>,
    pub fallback_speed_kmh: f64,
    /// Isochrone thresholds (minutes) used when a request supplies none.
    pub default_isochrones: Vec<u32>,
    /// Working-day cycle that routes are distributed over.
    pub working_days: Vec<String>,
    pub constraints: ConstraintSet,
    /// Per-city constraint overrides, keyed by city name.
    pub city_constraints: HashMap<String, ConstraintOverrides>,
    /// Balancer tolerance applied by `ZoningRequest::balanced_from`.
    pub balance_tolerance: f64,
    pub max_polar_sectors: usize,
    pub clustering_seed: u64,
    pub clustering_max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            osrm: None,
            fallback_speed_kmh: DEFAULT_SPEED_KMH,
            default_isochrones: vec![15, 30, 45, 60],
            working_days: ["SUN", "MON", "TUE", "WED", "THU", "SAT"]
                .iter()
                .map(|day| day.to_string())
                .collect(),
            constraints: ConstraintSet::default(),
            city_constraints: HashMap::new(),
            balance_tolerance: 0.2,
            max_polar_sectors: 24,
            clustering_seed: 42,
            clustering_max_iterations: 300,
        }
    }
}

impl EngineConfig {
    /// Loads `IZG_*` settings from the config file and process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = EnvSettings::load_from_iter([env!("CARGO_PKG_NAME")])?;
        Ok(settings.into())
    }

    /// Constraints for `city`, with its overrides applied when present.
    pub fn constraints_for(&self, city: Option<&str>) -> ConstraintSet {
        city.and_then(|city| self.city_constraints.get(city))
            .map(|overrides| self.constraints.with_overrides(overrides))
            .unwrap_or_else(|| self.constraints.clone())
    }
}

/// Flat settings read under the `IZG` prefix, e.g. `IZG_OSRM_BASE_URL`.
///
/// Every field is optional; unset fields keep the [`EngineConfig`] default.
/// List values are arrays, e.g. `IZG_WORKING_DAYS='["SUN","MON"]'`.
#[derive(Debug, Clone, Default, Parser, Deserialize, Serialize, OrthoConfig)]
#[command(name = "zone-planner", about = "Zoning and routing engine settings")]
#[ortho_config(prefix = "IZG")]
pub struct EnvSettings {
    #[arg(long)]
    #[serde(default)]
    pub osrm_base_url: Option<String>,
    #[arg(long)]
    #[serde(default)]
    pub osrm_profile: Option<String>,
    #[arg(long)]
    #[serde(default)]
    pub osrm_max_retries: Option<u32>,
    #[arg(long)]
    #[serde(default)]
    pub osrm_backoff_ms: Option<u64>,
    #[arg(long)]
    #[serde(default)]
    pub osrm_timeout_secs: Option<u64>,
    #[arg(long)]
    #[serde(default)]
    pub fallback_speed_kmh: Option<f64>,
    #[arg(long)]
    #[serde(default)]
    pub default_isochrones: Option<Vec<u32>>,
    #[arg(long)]
    #[serde(default)]
    pub working_days: Option<Vec<String>>,
    #[arg(long)]
    #[serde(default)]
    pub max_customers_per_route: Option<usize>,
    #[arg(long)]
    #[serde(default)]
    pub min_customers_per_route: Option<usize>,
    #[arg(long)]
    #[serde(default)]
    pub max_route_duration_minutes: Option<f64>,
    #[arg(long)]
    #[serde(default)]
    pub max_distance_per_route_km: Option<f64>,
    #[arg(long)]
    #[serde(default)]
    pub solver_time_limit_seconds: Option<u64>,
    #[arg(long)]
    #[serde(default)]
    pub balance_tolerance: Option<f64>,
    #[arg(long)]
    #[serde(default)]
    pub max_polar_sectors: Option<usize>,
}

impl From<EnvSettings> for EngineConfig {
    fn from(settings: EnvSettings) -> Self {
        let defaults = Self::default();
        let osrm = settings.osrm_base_url.map(|base_url| {
            let base = OsrmConfig::default();
            OsrmConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                profile: settings.osrm_profile.unwrap_or(base.profile),
                max_retries: settings.osrm_max_retries.unwrap_or(base.max_retries),
                backoff_ms: settings.osrm_backoff_ms.unwrap_or(base.backoff_ms),
                timeout_secs: settings.osrm_timeout_secs.unwrap_or(base.timeout_secs),
                ..base
            }
        });
        let constraints = defaults.constraints.with_overrides(&ConstraintOverrides {
            max_customers_per_route: settings.max_customers_per_route,
            min_customers_per_route: settings.min_customers_per_route,
            max_route_duration_minutes: settings.max_route_duration_minutes,
            max_distance_per_route_km: settings.max_distance_per_route_km,
            time_budget_secs: settings.solver_time_limit_seconds,
        });

        Self {
            osrm,
            fallback_speed_kmh: settings.fallback_speed_kmh.unwrap_or(defaults.fallback_speed_kmh),
            default_isochrones: settings
                .default_isochrones
                .unwrap_or(defaults.default_isochrones),
            working_days: settings.working_days.unwrap_or(defaults.working_days),
            constraints,
            balance_tolerance: settings.balance_tolerance.unwrap_or(defaults.balance_tolerance),
            max_polar_sectors: settings.max_polar_sectors.unwrap_or(defaults.max_polar_sectors),
            ..defaults
        }
    }
}
