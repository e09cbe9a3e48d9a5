//! Error taxonomy for the zoning and routing engine.
//!
//! Validation problems surface immediately as [`InputError`]. Provider and
//! solver degradation never show up here; they travel as metadata on an
//! otherwise successful result.

use std::sync::Arc;

use thiserror::Error;

/// Malformed caller input. Nothing is attempted when one of these is raised.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("at least one customer is required")]
    EmptyCustomers,

    #[error("customer {id} has an invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { id: String, lat: f64, lng: f64 },

    #[error("depot {code} has an invalid coordinate ({lat}, {lng})")]
    InvalidDepot { code: String, lat: f64, lng: f64 },

    #[error("customer id {0} appears more than once")]
    DuplicateCustomer(String),

    #[error("unknown zoning strategy '{0}'")]
    UnknownStrategy(String),

    #[error("sector count must be between 1 and {max}, got {got}")]
    InvalidSectorCount { got: usize, max: usize },

    #[error("rotation offset must be finite, got {0}")]
    InvalidRotation(f64),

    #[error("invalid isochrone thresholds: {0}")]
    InvalidThresholds(String),

    #[error("invalid clustering parameters: {0}")]
    InvalidClustering(String),

    #[error("polygon for zone {zone_id} is invalid: {reason}")]
    InvalidPolygon { zone_id: String, reason: String },

    #[error("polygons for zones {first} and {second} overlap")]
    OverlappingPolygons { first: String, second: String },

    #[error("zone id {0} is used by more than one polygon")]
    DuplicateZone(String),

    #[error("manual zoning requires at least one polygon")]
    MissingPolygons,

    #[error("balance tolerance must be finite and >= 0, got {0}")]
    InvalidTolerance(f64),

    #[error("working-day cycle is empty")]
    EmptyWorkingDays,

    #[error("invalid route constraints: {0}")]
    InvalidConstraints(String),
}

/// Failures of a single distance provider backend.
///
/// [`crate::distance::TravelProvider`] absorbs these for non-empty requests by
/// switching to estimated distances.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("at least one point is required")]
    EmptyInput,

    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("routing request rejected: {code}: {message}")]
    Rejected { code: String, message: String },

    #[error("routing response missing {0}")]
    MissingField(&'static str),

    #[error("routing response shape mismatch: expected {expected} rows, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("request too large for routing service ({0} coordinates)")]
    TooLarge(usize),

    #[error("worker pool unavailable: {0}")]
    Pool(String),
}

impl ProviderError {
    /// Whether repeating the same request could succeed: transport failures,
    /// timeouts and server-side statuses. Client errors, undecodable bodies
    /// and rejected queries fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => {
                !err.is_decode() && !err.status().is_some_and(|status| status.is_client_error())
            }
            _ => false,
        }
    }
}

/// Failures while producing or reading export artifacts.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output was not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("csv writer could not be flushed: {0}")]
    Flush(String),

    #[error("ring for {0} needs at least 3 points")]
    RingTooShort(String),

    #[error("customer {0} appears more than once in the assignment table")]
    DuplicateRow(String),
}

/// Configuration layering failed (file or environment).
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Arc<ortho_config::OrthoError>),
}

/// Umbrella error returned by the engine entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
