use crate::units::{decimal_to_dms, Dms};
use crate::{Error, Result};
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic position in decimal degrees, optionally with altitude
/// (meters) and compass heading (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    latitude: f64,
    longitude: f64,
    altitude: Option<f64>,
    heading: Option<f64>,
}

#[derive(Deserialize)]
struct RawPosition {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
}

impl TryFrom<RawPosition> for Position {
    type Error = Error;

    fn try_from(raw: RawPosition) -> Result<Self> {
        Ok(Position::new(raw.latitude, raw.longitude)?
            .with_altitude(raw.altitude)
            .with_heading(raw.heading))
    }
}

impl Position {
    /// Validates latitude in [-90, 90] and longitude in [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::invalid_data("latitude", format!("{} out of range", latitude)));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::invalid_data("longitude", format!("{} out of range", longitude)));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude: None,
            heading: None,
        })
    }

    pub fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_heading(mut self, heading: Option<f64>) -> Self {
        self.heading = heading;
        self
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    /// `(latitude, longitude)`
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn to_dms(&self) -> (Dms, Dms) {
        (decimal_to_dms(self.latitude), decimal_to_dms(self.longitude))
    }

    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Position) -> f64 {
        self.to_point().haversine_distance(&other.to_point())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lat, lon) = self.to_dms();
        write!(
            f,
            "{}°{}'{:.3}\"{} {}°{}'{:.3}\"{}",
            lat.degrees,
            lat.minutes,
            lat.seconds,
            if lat.negative { 'S' } else { 'N' },
            lon.degrees,
            lon.minutes,
            lon.seconds,
            if lon.negative { 'W' } else { 'E' },
        )?;
        if let Some(altitude) = self.altitude {
            write!(f, " {:.2}m", altitude)?;
        }
        if let Some(heading) = self.heading {
            write!(f, " {:.2}°", heading)?;
        }
        Ok(())
    }
}
