//! Independent capabilities a vehicle may offer.
//!
//! A vehicle implements any subset of these traits and announces them through
//! the accessors on [`Vehicle`](crate::Vehicle). None of them depends on
//! another.

use crate::position::Position;
use crate::station::Station;
use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    Geo,
    Journey,
    InternetAccess,
    InternetMetrics,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Geo,
        Capability::Journey,
        Capability::InternetAccess,
        Capability::InternetMetrics,
    ];

    /// The error raised when this capability is used on a vehicle without it.
    pub fn missing(self) -> Error {
        Error::FeatureMissing(self.to_string())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Geo => "geo",
            Capability::Journey => "journey",
            Capability::InternetAccess => "internet access",
            Capability::InternetMetrics => "internet metrics",
        };
        f.write_str(name)
    }
}

/// Where the vehicle is and how fast it moves.
pub trait Geo {
    fn position(&self) -> Result<Position>;

    /// Speed in m/s
    fn speed(&self) -> Result<f64>;
}

/// The stops of the current journey.
pub trait Journey {
    /// All stops in travel order
    fn stations(&self) -> Result<Vec<Station>>;

    /// The stop the vehicle is at or will arrive at next
    fn current_station(&self) -> Result<Station>;

    fn origin(&self) -> Result<Station> {
        self.stations()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::invalid_data("origin", "journey has no stations"))
    }

    fn destination(&self) -> Result<Station> {
        self.stations()?
            .pop()
            .ok_or_else(|| Error::invalid_data("destination", "journey has no stations"))
    }

    fn station(&self, id: &str) -> Result<Station> {
        self.stations()?
            .into_iter()
            .find(|station| station.id == id)
            .ok_or_else(|| Error::NotFound(format!("station {}", id)))
    }

    /// Arrival delay at the current station. Zero if it has no arrival time.
    fn delay(&self) -> Result<Duration> {
        Ok(self
            .current_station()?
            .arrival
            .map(|arrival| arrival.delay())
            .unwrap_or_else(Duration::zero))
    }

    /// Meters travelled since the origin
    fn distance(&self) -> Result<f64> {
        Err(Error::FeatureMissing("journey distance".to_string()))
    }
}

/// Captive portal login and logout.
pub trait InternetAccess {
    fn enable(&self) -> Result<()>;

    fn disable(&self) -> Result<()>;

    /// State after the last successful `enable`/`disable`
    fn is_enabled(&self) -> bool;
}

/// A ceiling on internet usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataLimit {
    /// Bytes
    Volume(u64),
    Time(std::time::Duration),
}

pub trait InternetMetrics {
    /// `None` when usage is unlimited
    fn limit(&self) -> Result<Option<DataLimit>>;
}

/// Login state that only changes when the vendor confirmed the change.
#[derive(Debug, Default)]
pub struct AccessState {
    enabled: AtomicBool,
}

impl AccessState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Run the vendor call and record `enabled` only if it succeeded.
    pub fn toggle<F>(&self, enabled: bool, vendor_call: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        vendor_call()?;
        self.enabled.store(enabled, Ordering::SeqCst);
        log::info!("Internet access {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduledEvent;
    use chrono::{TimeZone, Utc};

    struct Line {
        stops: Vec<Station>,
        current: usize,
    }

    impl Journey for Line {
        fn stations(&self) -> Result<Vec<Station>> {
            Ok(self.stops.clone())
        }

        fn current_station(&self) -> Result<Station> {
            self.stops
                .get(self.current)
                .cloned()
                .ok_or_else(|| Error::invalid_data("current_station", "none"))
        }
    }

    fn line() -> Line {
        let planned = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut linz = Station::new("8100013", "Linz Hbf");
        linz.arrival = Some(ScheduledEvent::with_actual(
            planned,
            Some(planned + Duration::minutes(4)),
        ));
        Line {
            stops: vec![
                Station::new("8103000", "Wien Hbf"),
                linz,
                Station::new("8100002", "Salzburg Hbf"),
            ],
            current: 1,
        }
    }

    #[test]
    fn test_journey_defaults() {
        let line = line();
        assert_eq!(line.origin().unwrap().name, "Wien Hbf");
        assert_eq!(line.destination().unwrap().name, "Salzburg Hbf");
        assert_eq!(line.station("8100013").unwrap().name, "Linz Hbf");
        assert!(matches!(line.station("0"), Err(Error::NotFound(_))));
        assert_eq!(line.delay().unwrap(), Duration::minutes(4));
    }

    #[test]
    fn test_distance_is_missing_by_default() {
        assert!(matches!(line().distance(), Err(Error::FeatureMissing(_))));
    }

    #[test]
    fn test_empty_journey_has_no_origin() {
        let line = Line {
            stops: Vec::new(),
            current: 0,
        };
        assert!(matches!(line.origin(), Err(Error::InvalidData { .. })));
        assert!(matches!(line.destination(), Err(Error::InvalidData { .. })));
    }

    #[test]
    fn test_access_state_follows_successful_calls_only() {
        let state = AccessState::default();
        state.toggle(true, || Ok(())).unwrap();
        assert!(state.is_enabled());

        let failed = state.toggle(false, || Err(Error::Connection("logout failed".to_string())));
        assert!(matches!(failed, Err(Error::Connection(_))));
        assert!(state.is_enabled());
    }

    #[test]
    fn test_missing_names_the_capability() {
        let message = Capability::InternetMetrics.missing().to_string();
        assert!(message.contains("internet metrics"), "{}", message);
    }
}
