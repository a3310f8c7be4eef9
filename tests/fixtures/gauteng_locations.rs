//! Gauteng (Johannesburg / Pretoria) locations for realistic fixtures.
//!
//! Longitude is positive and latitude negative throughout, so a swapped
//! axis always shows up as a mismatch.

/// A named location with coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub name: &'static str,
    pub lon: f64,
    pub lat: f64,
}

impl Location {
    pub const fn new(name: &'static str, lon: f64, lat: f64) -> Self {
        Self { name, lon, lat }
    }

    pub fn solver(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

// ============================================================================
// Depots
// ============================================================================

pub const JOHANNESBURG_CBD: Location = Location::new("Johannesburg CBD", 28.0473, -26.2041);

pub const DEPOTS: &[Location] = &[
    JOHANNESBURG_CBD,
    Location::new("City Deep Container Terminal", 28.0706, -26.2232),
    Location::new("Midrand Logistics Park", 28.1284, -25.9992),
    Location::new("Pretoria West", 28.1550, -25.7500),
];

// ============================================================================
// Customer sites
// ============================================================================

pub const CUSTOMERS: &[Location] = &[
    Location::new("Sandton City", 28.0567, -26.1076),
    Location::new("Rosebank Mall", 28.0436, -26.1458),
    Location::new("Melrose Arch", 28.0683, -26.1334),
    Location::new("Soweto Maponya Mall", 27.9186, -26.2601),
    Location::new("Eastgate Shopping Centre", 28.1146, -26.1801),
    Location::new("Fourways Mall", 28.0071, -26.0168),
    Location::new("OR Tambo Airport", 28.2460, -26.1367),
    Location::new("Menlyn Park", 28.2773, -25.7833),
    Location::new("Hatfield Plaza", 28.2336, -25.7489),
    Location::new("Centurion Mall", 28.1881, -25.8603),
    Location::new("Boksburg East Rand Mall", 28.2393, -26.1846),
    Location::new("Randburg Square", 27.9976, -26.0936),
];

/// Customer sites, cycling when more are requested than exist.
pub fn customer_sites(count: usize) -> Vec<Location> {
    CUSTOMERS.iter().copied().cycle().take(count).collect()
}
