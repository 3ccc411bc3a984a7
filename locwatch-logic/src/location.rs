use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A "part" of a location
pub type LocationComponent = f64;

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
/// A plain latitude / longitude pair
pub struct Coordinate {
    /// Latitude
    pub lat: LocationComponent,
    /// Longitude
    pub long: LocationComponent,
}

impl Coordinate {
    pub const fn new(lat: LocationComponent, long: LocationComponent) -> Self {
        Self { lat, long }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A single position as reported by the platform's location service
pub struct Fix {
    /// Latitude
    pub lat: LocationComponent,
    /// Longitude
    pub long: LocationComponent,
    /// Altitude in meters, if the platform reports it
    #[serde(default)]
    pub altitude: Option<LocationComponent>,
    /// Horizontal accuracy radius in meters
    #[serde(default)]
    pub accuracy: Option<LocationComponent>,
    /// When the platform took this fix
    #[serde(default)]
    pub timestamp: Option<UtcDT>,
}

impl Fix {
    /// A fix with only a position, no precision metadata
    pub const fn new(lat: LocationComponent, long: LocationComponent) -> Self {
        Self {
            lat,
            long,
            altitude: None,
            accuracy: None,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: UtcDT) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.long)
    }
}

impl From<Coordinate> for Fix {
    fn from(value: Coordinate) -> Self {
        Self::new(value.lat, value.long)
    }
}
