//! Polyline representation for route geometries.
//!
//! Routes are kept as decoded coordinate sequences. The compact encoded
//! format only appears at the boundary, when reading OSRM responses.

use serde::{Deserialize, Serialize};

/// Coordinate precision of OSRM's default `polyline` geometry.
const OSRM_PRECISION: f64 = 1e5;

/// A polyline representing a route geometry as decoded coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    /// Creates a new Polyline from decoded `(lat, lng)` points.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Decodes an encoded polyline string at OSRM precision (5 digits).
    ///
    /// Returns `None` when the string is truncated or contains bytes outside
    /// the encoding alphabet.
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = encoded.as_bytes();
        let mut index = 0;
        let mut lat: i64 = 0;
        let mut lng: i64 = 0;
        let mut points = Vec::new();

        while index < bytes.len() {
            lat += next_delta(bytes, &mut index)?;
            lng += next_delta(bytes, &mut index)?;
            points.push((lat as f64 / OSRM_PRECISION, lng as f64 / OSRM_PRECISION));
        }

        Some(Self { points })
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Option<i64> {
    let mut shift = 0;
    let mut result: i64 = 0;
    loop {
        let byte = *bytes.get(*index)?;
        if !(63..=126).contains(&byte) || shift > 60 {
            return None;
        }
        let chunk = i64::from(byte - 63);
        *index += 1;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    Some(if result & 1 == 1 { !(result >> 1) } else { result >> 1 })
}
