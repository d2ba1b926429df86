use crate::position::Position;
use crate::schedule::ScheduledEvent;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};

pub type Loader = dyn Fn() -> anyhow::Result<Vec<ConnectingVehicle>> + Send + Sync;

/// A connecting service departing from a station. Only limited information
/// is usually available.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConnectingVehicle {
    pub vehicle_type: Option<String>,
    pub line_number: Option<String>,
    pub departure: Option<ScheduledEvent<DateTime<Utc>>>,
    pub destination: Option<String>,
    pub platform: Option<ScheduledEvent<String>>,
}

/// The connections of a station, fetched on first access.
#[derive(Clone, Default)]
pub struct Connections {
    loaded: Arc<OnceLock<Vec<ConnectingVehicle>>>,
    loader: Option<Arc<Loader>>,
}

impl Connections {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn known(connections: Vec<ConnectingVehicle>) -> Self {
        let loaded = OnceLock::new();
        let _ = loaded.set(connections);
        Self {
            loaded: Arc::new(loaded),
            loader: None,
        }
    }

    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Vec<ConnectingVehicle>> + Send + Sync + 'static,
    {
        Self {
            loaded: Arc::new(OnceLock::new()),
            loader: Some(Arc::new(loader)),
        }
    }

    /// Resolve the connections, running the loader at most once on success.
    pub fn get(&self) -> Result<&[ConnectingVehicle]> {
        if let Some(connections) = self.loaded.get() {
            return Ok(connections.as_slice());
        }
        let connections = match &self.loader {
            Some(loader) => loader().map_err(|e| Error::Connection(format!("{:#}", e)))?,
            None => Vec::new(),
        };
        Ok(self.loaded.get_or_init(|| connections).as_slice())
    }
}

impl fmt::Debug for Connections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loaded.get() {
            Some(connections) => f.debug_list().entries(connections).finish(),
            None => f.write_str("[<not loaded>]"),
        }
    }
}

/// A stop on the journey. Rebuilt on every refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub arrival: Option<ScheduledEvent<DateTime<Utc>>>,
    pub departure: Option<ScheduledEvent<DateTime<Utc>>>,
    /// Platform for trains, gate for planes
    pub platform: Option<ScheduledEvent<String>>,
    pub position: Option<Position>,
    /// Meters from the start of the journey
    pub distance: Option<f64>,
    pub connections: Connections,
}

impl Station {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arrival: None,
            departure: None,
            platform: None,
            position: None,
            distance: None,
            connections: Connections::none(),
        }
    }

    pub fn connections(&self) -> Result<&[ConnectingVehicle]> {
        self.connections.get()
    }

    /// Distance in meters between this station and `target`.
    ///
    /// Distances along the journey are preferred over great-circle distances
    /// when both sides know them.
    pub fn calculate_distance<'a>(&self, target: impl Into<DistanceTarget<'a>>) -> Result<f64> {
        let target = target.into();
        match target {
            DistanceTarget::Meters(meters) => self
                .distance
                .map(|distance| (distance - meters).abs())
                .ok_or_else(|| self.no_location(&target)),
            DistanceTarget::Position(position) => self
                .position
                .map(|own| own.distance_to(position))
                .ok_or_else(|| self.no_location(&target)),
            DistanceTarget::Station(other) => {
                if let (Some(own), Some(theirs)) = (self.distance, other.distance) {
                    return Ok((own - theirs).abs());
                }
                if let (Some(own), Some(theirs)) = (&self.position, &other.position) {
                    return Ok(own.distance_to(theirs));
                }
                Err(self.no_location(&target))
            }
        }
    }

    fn no_location(&self, target: &DistanceTarget<'_>) -> Error {
        Error::NoLocation(format!("{} from station {}", target, self.name))
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.arrival == other.arrival
            && self.departure == other.departure
            && self.platform == other.platform
            && self.position == other.position
            && self.distance == other.distance
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Anything a distance can be measured to.
#[derive(Debug, Clone, Copy)]
pub enum DistanceTarget<'a> {
    Station(&'a Station),
    Position(&'a Position),
    /// Meters from the start of the journey
    Meters(f64),
}

impl<'a> From<&'a Station> for DistanceTarget<'a> {
    fn from(station: &'a Station) -> Self {
        DistanceTarget::Station(station)
    }
}

impl<'a> From<&'a Position> for DistanceTarget<'a> {
    fn from(position: &'a Position) -> Self {
        DistanceTarget::Position(position)
    }
}

impl From<f64> for DistanceTarget<'_> {
    fn from(meters: f64) -> Self {
        DistanceTarget::Meters(meters)
    }
}

impl fmt::Display for DistanceTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceTarget::Station(station) => write!(f, "station {}", station.name),
            DistanceTarget::Position(position) => write!(f, "position {}", position),
            DistanceTarget::Meters(meters) => write!(f, "{} m along the journey", meters),
        }
    }
}
