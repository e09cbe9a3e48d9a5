//! OSRM HTTP adapter for distance tables and route geometry.
//!
//! Transient failures are retried with exponential backoff; rejected queries
//! and malformed responses fail at once. Tables larger than the
//! per-request coordinate limit are split into origin/destination blocks and
//! fetched in parallel; a failed block fails the whole table.

use std::time::Duration;

use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};

use crate::distance::{Precision, RouteGeometry, TravelMatrix};
use crate::error::ProviderError;
use crate::polyline::Polyline;
use crate::traits::DistanceProvider;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff_ms * 2^(n-1)`.
    pub backoff_ms: u64,
    pub max_coordinates_per_request: usize,
    pub max_parallel_requests: usize,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "driving".to_string(),
            timeout_secs: 60,
            max_retries: 3,
            backoff_ms: 1000,
            max_coordinates_per_request: 80,
            max_parallel_requests: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

/// One origin block against one destination block.
struct Block {
    origin_start: usize,
    origins: Vec<(f64, f64)>,
    destination_start: usize,
    destinations: Vec<(f64, f64)>,
}

struct BlockResult {
    origin_start: usize,
    destination_start: usize,
    distances_km: Vec<Vec<f64>>,
    durations_min: Vec<Vec<f64>>,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OsrmConfig {
        &self.config
    }

    /// Checks the service with a minimal two-point table.
    pub fn check_health(&self) -> bool {
        let sample = [(52.517037, 13.388860), (52.496891, 13.385983)];
        match self.request_table(&sample, &[0, 1], &[0, 1]) {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, base_url = %self.config.base_url, "OSRM health check failed");
                false
            }
        }
    }

    fn with_retry<T>(
        &self,
        what: &str,
        mut call: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() || attempt >= self.config.max_retries => {
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    let wait = self.config.backoff_ms.saturating_mul(1 << (attempt - 1).min(16));
                    debug!(
                        error = %err,
                        attempt,
                        max_retries = self.config.max_retries,
                        wait_ms = wait,
                        "OSRM {} request failed; retrying",
                        what
                    );
                    std::thread::sleep(Duration::from_millis(wait));
                }
            }
        }
    }

    fn get<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
        coordinates: usize,
    ) -> Result<T, ProviderError> {
        let response = self.client.get(url).query(query).send()?;
        if response.status() == reqwest::StatusCode::URI_TOO_LONG {
            return Err(ProviderError::TooLarge(coordinates));
        }
        Ok(response.error_for_status()?.json::<T>()?)
    }

    fn request_table(
        &self,
        coordinates: &[(f64, f64)],
        sources: &[usize],
        destinations: &[usize],
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), ProviderError> {
        let url = format!(
            "{}/table/v1/{}/{}",
            self.config.base_url,
            self.config.profile,
            coordinate_path(coordinates)
        );
        let query = [
            ("annotations", "duration,distance".to_string()),
            ("sources", index_list(sources)),
            ("destinations", index_list(destinations)),
        ];

        self.with_retry("table", || {
            let body: OsrmTableResponse = self.get(&url, &query, coordinates.len())?;
            check_code(body.code.as_deref(), body.message.as_deref())?;
            let durations = body.durations.ok_or(ProviderError::MissingField("durations"))?;
            let distances = body.distances.ok_or(ProviderError::MissingField("distances"))?;
            check_shape(&durations, sources.len(), destinations.len())?;
            check_shape(&distances, sources.len(), destinations.len())?;

            let durations_min = convert(durations, 60.0);
            let distances_km = convert(distances, 1000.0);
            Ok((distances_km, durations_min))
        })
    }

    fn request_block(&self, block: &Block) -> Result<BlockResult, ProviderError> {
        let mut coordinates = block.origins.clone();
        coordinates.extend_from_slice(&block.destinations);
        let sources: Vec<usize> = (0..block.origins.len()).collect();
        let destinations: Vec<usize> = (block.origins.len()..coordinates.len()).collect();

        let (distances_km, durations_min) =
            self.request_table(&coordinates, &sources, &destinations)?;
        Ok(BlockResult {
            origin_start: block.origin_start,
            destination_start: block.destination_start,
            distances_km,
            durations_min,
        })
    }

    fn chunked_table(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<TravelMatrix, ProviderError> {
        let chunk = (self.config.max_coordinates_per_request / 2).max(1);
        let mut blocks = Vec::new();
        for (oi, origin_chunk) in origins.chunks(chunk).enumerate() {
            for (di, destination_chunk) in destinations.chunks(chunk).enumerate() {
                blocks.push(Block {
                    origin_start: oi * chunk,
                    origins: origin_chunk.to_vec(),
                    destination_start: di * chunk,
                    destinations: destination_chunk.to_vec(),
                });
            }
        }

        info!(
            origins = origins.len(),
            destinations = destinations.len(),
            blocks = blocks.len(),
            parallel = self.config.max_parallel_requests,
            "chunking OSRM table request"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_parallel_requests.max(1))
            .build()
            .map_err(|err| ProviderError::Pool(err.to_string()))?;
        let results = pool.install(|| {
            blocks
                .par_iter()
                .map(|block| self.request_block(block))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut distances_km = vec![vec![f64::INFINITY; destinations.len()]; origins.len()];
        let mut durations_min = vec![vec![f64::INFINITY; destinations.len()]; origins.len()];
        for result in results {
            for (r, (distance_row, duration_row)) in result
                .distances_km
                .into_iter()
                .zip(result.durations_min)
                .enumerate()
            {
                let row = result.origin_start + r;
                let cells = distance_row.into_iter().zip(duration_row).enumerate();
                for (c, (distance, duration)) in cells {
                    distances_km[row][result.destination_start + c] = distance;
                    durations_min[row][result.destination_start + c] = duration;
                }
            }
        }

        Ok(TravelMatrix::new(distances_km, durations_min, Precision::Live))
    }
}

impl DistanceProvider for OsrmClient {
    fn table(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<TravelMatrix, ProviderError> {
        if origins.is_empty() || destinations.is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let square = origins == destinations;
        let coordinate_count = if square {
            origins.len()
        } else {
            origins.len() + destinations.len()
        };
        if coordinate_count > self.config.max_coordinates_per_request {
            return self.chunked_table(origins, destinations);
        }

        let (distances_km, durations_min) = if square {
            let all: Vec<usize> = (0..origins.len()).collect();
            self.request_table(origins, &all, &all)?
        } else {
            let mut coordinates = origins.to_vec();
            coordinates.extend_from_slice(destinations);
            let sources: Vec<usize> = (0..origins.len()).collect();
            let targets: Vec<usize> = (origins.len()..coordinates.len()).collect();
            self.request_table(&coordinates, &sources, &targets)?
        };

        Ok(TravelMatrix::new(distances_km, durations_min, Precision::Live))
    }

    fn route(&self, points: &[(f64, f64)]) -> Result<RouteGeometry, ProviderError> {
        if points.len() < 2 {
            return Err(ProviderError::EmptyInput);
        }

        let url = format!(
            "{}/route/v1/{}/{}",
            self.config.base_url,
            self.config.profile,
            coordinate_path(points)
        );
        let query = [
            ("overview", "full".to_string()),
            ("geometries", "polyline".to_string()),
            ("steps", "false".to_string()),
        ];

        self.with_retry("route", || {
            let body: OsrmRouteResponse = self.get(&url, &query, points.len())?;
            check_code(body.code.as_deref(), body.message.as_deref())?;
            let route = body
                .routes
                .and_then(|routes| routes.into_iter().next())
                .ok_or(ProviderError::MissingField("routes"))?;
            let polyline = Polyline::decode(&route.geometry)
                .ok_or(ProviderError::MissingField("geometry"))?;
            Ok(RouteGeometry {
                polyline,
                distance_km: route.distance / 1000.0,
                duration_min: route.duration / 60.0,
                precision: Precision::Live,
            })
        })
    }
}

/// OSRM takes `lng,lat` pairs separated by `;`.
fn coordinate_path(points: &[(f64, f64)]) -> String {
    points
        .iter()
        .map(|(lat, lng)| format!("{:.6},{:.6}", lng, lat))
        .collect::<Vec<_>>()
        .join(";")
}

fn index_list(indices: &[usize]) -> String {
    indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

fn check_code(code: Option<&str>, message: Option<&str>) -> Result<(), ProviderError> {
    match code {
        None | Some("Ok") => Ok(()),
        Some(code) => Err(ProviderError::Rejected {
            code: code.to_string(),
            message: message.unwrap_or_default().to_string(),
        }),
    }
}

fn check_shape(
    rows: &[Vec<Option<f64>>],
    expected_rows: usize,
    expected_cols: usize,
) -> Result<(), ProviderError> {
    if rows.len() != expected_rows {
        return Err(ProviderError::ShapeMismatch {
            expected: expected_rows,
            got: rows.len(),
        });
    }
    if let Some(row) = rows.iter().find(|row| row.len() != expected_cols) {
        return Err(ProviderError::ShapeMismatch {
            expected: expected_cols,
            got: row.len(),
        });
    }
    Ok(())
}

fn convert(rows: Vec<Vec<Option<f64>>>, divisor: f64) -> Vec<Vec<f64>> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|value| value.map_or(f64::INFINITY, |v| v / divisor))
                .collect()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: Option<String>,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: Option<String>,
    message: Option<String>,
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: String,
    distance: f64,
    duration: f64,
}
