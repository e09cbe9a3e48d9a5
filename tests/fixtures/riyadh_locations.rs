//! Riyadh neighbourhood locations for realistic fixtures.
//!
//! Coordinates are approximate district centres, good enough for zoning and
//! estimated routing.

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

pub const DEPOT: Location = Location::new("Riyadh Central Depot", 24.7136, 46.6753);

// ============================================================================
// North
// ============================================================================

pub const NORTH: &[Location] = &[
    Location::new("Al Nakheel", 24.7560, 46.6380),
    Location::new("Al Yasmin", 24.8290, 46.6420),
    Location::new("Hittin", 24.7630, 46.6000),
    Location::new("Al Sahafah", 24.8000, 46.6400),
    Location::new("Al Narjis", 24.8550, 46.6750),
    Location::new("Al Qirawan", 24.8500, 46.6200),
];

// ============================================================================
// East
// ============================================================================

pub const EAST: &[Location] = &[
    Location::new("Al Rawdah", 24.7350, 46.7650),
    Location::new("Al Naseem", 24.7300, 46.8200),
    Location::new("Al Munsiyah", 24.8200, 46.8100),
    Location::new("Al Rimal", 24.8300, 46.8500),
    Location::new("Al Hamra", 24.7800, 46.7500),
    Location::new("Al Malaz", 24.6660, 46.7270),
];

// ============================================================================
// South
// ============================================================================

pub const SOUTH: &[Location] = &[
    Location::new("Al Aziziyah", 24.5900, 46.7600),
    Location::new("Al Shifa", 24.5550, 46.7050),
    Location::new("Badr", 24.5350, 46.7200),
    Location::new("Al Suwaidi", 24.6000, 46.6350),
    Location::new("Al Uraija", 24.6100, 46.6100),
    Location::new("Al Sulimaniyah", 24.7000, 46.7000),
];

// ============================================================================
// West
// ============================================================================

pub const WEST: &[Location] = &[
    Location::new("Dhahrat Laban", 24.6300, 46.5550),
    Location::new("Irqah", 24.6850, 46.5800),
    Location::new("Al Khuzama", 24.6950, 46.6330),
    Location::new("Olaya", 24.6950, 46.6850),
    Location::new("King Fahd", 24.7350, 46.6650),
    Location::new("Al Wurud", 24.7230, 46.6780),
];

/// Every neighbourhood, north, east, south, west.
pub fn all_locations() -> Vec<&'static Location> {
    NORTH.iter().chain(EAST).chain(SOUTH).chain(WEST).collect()
}
