//! Deutsche Bahn ICE Portal.

use crate::capability::{Geo, Journey};
use crate::config::VehicleConfig;
use crate::position::Position;
use crate::schedule::ScheduledEvent;
use crate::station::{ConnectingVehicle, Connections, Station};
use crate::train::{from_millis, Train};
use crate::units::kmh_to_ms;
use crate::vehicle::{Facade, Vehicle};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use onboard_connect::rest::RestSession;
use onboard_connect::{CacheStore, Connector, SessionConfig};
use serde::Deserialize;
use std::sync::Arc;

pub const API_URL: &str = "https://iceportal.de";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WagonClass {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternetStatus {
    NoInternet,
    Unstable,
    Weak,
    Middle,
    High,
    #[default]
    #[serde(other)]
    NoInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub current_state: Option<InternetStatus>,
    pub next_state: Option<InternetStatus>,
    pub remaining_time_seconds: Option<i64>,
}

impl Connectivity {
    fn status_change(&self) -> Result<Option<Duration>> {
        self.remaining_time_seconds
            .map(|seconds| {
                Duration::try_seconds(seconds).ok_or_else(|| {
                    Error::invalid_data("remainingTimeSeconds", format!("{} out of range", seconds))
                })
            })
            .transpose()
    }
}

/// `api1/rs/status`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub tzn: Option<String>,
    /// km/h
    pub speed: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Milliseconds since the epoch
    pub server_time: Option<i64>,
    pub wagon_class: Option<WagonClass>,
    pub connectivity: Option<Connectivity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationRef {
    eva_nr: String,
    name: String,
    geocoordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Coordinates {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timetable {
    scheduled_arrival_time: Option<i64>,
    actual_arrival_time: Option<i64>,
    scheduled_departure_time: Option<i64>,
    actual_departure_time: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Track {
    scheduled: Option<String>,
    actual: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopDetails {
    distance_from_start: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stop {
    station: StationRef,
    #[serde(default)]
    timetable: Timetable,
    #[serde(default)]
    track: Track,
    #[serde(default)]
    info: StopDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopInfo {
    actual_next: Option<String>,
}

/// The `trip` object of `api1/rs/tripInfo/trip`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    train_type: Option<String>,
    vzn: Option<String>,
    /// Meters from the origin to the last stop passed
    actual_position: Option<f64>,
    distance_from_last_stop: Option<f64>,
    #[serde(default)]
    stop_info: StopInfo,
    #[serde(default)]
    stops: Vec<Stop>,
}

#[derive(Deserialize)]
struct TripInfo {
    trip: Option<Trip>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
    train_type: Option<String>,
    vzn: Option<String>,
    #[serde(default)]
    station: Option<Named>,
    #[serde(default)]
    timetable: Timetable,
    #[serde(default)]
    track: Track,
}

#[derive(Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Deserialize)]
struct ConnectionList {
    #[serde(default)]
    connections: Vec<Connection>,
}

pub fn parse_status(body: &str) -> Result<Status> {
    Ok(serde_json::from_str(body)?)
}

pub fn parse_trip(body: &str) -> Result<Trip> {
    let info: TripInfo = serde_json::from_str(body)?;
    info.trip
        .ok_or_else(|| Error::invalid_data("trip", "response carries no trip"))
}

pub fn parse_connections(body: &str) -> Result<Vec<ConnectingVehicle>> {
    let list: ConnectionList = serde_json::from_str(body)?;
    Ok(list
        .connections
        .into_iter()
        .map(|connection| ConnectingVehicle {
            vehicle_type: connection.train_type,
            line_number: connection.vzn,
            departure: scheduled_time(
                connection.timetable.scheduled_departure_time,
                connection.timetable.actual_departure_time,
            ),
            destination: connection.station.and_then(|station| station.name),
            platform: platform(connection.track),
        })
        .collect())
}

fn scheduled_time(scheduled: Option<i64>, actual: Option<i64>) -> Option<ScheduledEvent<DateTime<Utc>>> {
    ScheduledEvent::from_options(scheduled.and_then(from_millis), actual.and_then(from_millis))
}

fn platform(track: Track) -> Option<ScheduledEvent<String>> {
    ScheduledEvent::from_options(track.scheduled, track.actual)
}

impl Trip {
    /// Build the stations, wiring each one's connections to `session`.
    fn stations(&self, session: Option<&RestSession>) -> Vec<Station> {
        self.stops
            .iter()
            .map(|stop| {
                let position = stop
                    .station
                    .geocoordinates
                    .and_then(|c| Position::new(c.latitude, c.longitude).ok());
                let connections = match session {
                    Some(session) => {
                        let session = session.clone();
                        let path = format!("api1/rs/tripInfo/connection/{}", stop.station.eva_nr);
                        Connections::lazy(move || Ok(parse_connections(&session.get_text(&path)?)?))
                    }
                    None => Connections::none(),
                };
                Station {
                    id: stop.station.eva_nr.clone(),
                    name: stop.station.name.clone(),
                    arrival: scheduled_time(
                        stop.timetable.scheduled_arrival_time,
                        stop.timetable.actual_arrival_time,
                    ),
                    departure: scheduled_time(
                        stop.timetable.scheduled_departure_time,
                        stop.timetable.actual_departure_time,
                    ),
                    platform: platform(stop.track.clone()),
                    position,
                    distance: stop.info.distance_from_start,
                    connections,
                }
            })
            .collect()
    }

    fn travelled(&self) -> Option<f64> {
        Some(self.actual_position? + self.distance_from_last_stop.unwrap_or(0.0))
    }
}

pub struct IcePortalConnector {
    session: RestSession,
    cache: CacheStore,
}

impl IcePortalConnector {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            session: RestSession::new(&config.clone().or_base_url(API_URL))?,
            cache: CacheStore::new(),
        })
    }

    pub fn session(&self) -> &RestSession {
        &self.session
    }
}

impl Connector for IcePortalConnector {
    fn api_url(&self) -> &str {
        API_URL
    }

    fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn refresh(&self) -> anyhow::Result<()> {
        let status = parse_status(&self.session.get_text("api1/rs/status")?)?;
        self.store("status", status);
        let trip = parse_trip(&self.session.get_text("api1/rs/tripInfo/trip")?)?;
        self.store("trip", trip);
        Ok(())
    }
}

pub struct IcePortal {
    facade: Facade<IcePortalConnector>,
}

impl IcePortal {
    pub fn new() -> Result<Self> {
        Self::with_config(VehicleConfig::default())
    }

    pub fn with_config(config: VehicleConfig) -> Result<Self> {
        let connector = IcePortalConnector::new(&config.session)?;
        Ok(Self {
            facade: Facade::polled(connector, config.poller),
        })
    }

    pub fn facade(&self) -> &Facade<IcePortalConnector> {
        &self.facade
    }

    fn status(&self) -> Result<Arc<Status>> {
        self.facade.connector()?.load("status")
    }

    fn trip(&self) -> Result<Arc<Trip>> {
        self.facade.connector()?.load("trip")
    }

    /// Class of the wagon the client is seated in
    pub fn wagon_class(&self) -> Result<Option<WagonClass>> {
        Ok(self.status()?.wagon_class)
    }

    pub fn internet_status(&self) -> Result<InternetStatus> {
        Ok(self.connectivity()?.current_state.unwrap_or_default())
    }

    pub fn next_internet_status(&self) -> Result<InternetStatus> {
        Ok(self.connectivity()?.next_state.unwrap_or_default())
    }

    /// Time until the internet status changes, if announced
    pub fn internet_status_change(&self) -> Result<Option<Duration>> {
        self.connectivity()?.status_change()
    }

    fn connectivity(&self) -> Result<Connectivity> {
        Ok(self.status()?.connectivity.clone().unwrap_or_default())
    }
}

impl Vehicle for IcePortal {
    fn init(&self) -> Result<()> {
        self.facade.init()
    }

    fn shutdown(&self) {
        self.facade.shutdown()
    }

    fn id(&self) -> Result<String> {
        self.status()?
            .tzn
            .clone()
            .ok_or_else(|| Error::invalid_data("tzn", "missing"))
    }

    fn now(&self) -> DateTime<Utc> {
        self.status()
            .ok()
            .and_then(|status| status.server_time)
            .and_then(from_millis)
            .unwrap_or_else(Utc::now)
    }

    fn geo(&self) -> Result<&dyn Geo> {
        Ok(self)
    }

    fn journey(&self) -> Result<&dyn Journey> {
        Ok(self)
    }
}

impl Train for IcePortal {
    fn train_type(&self) -> Result<String> {
        self.trip()?
            .train_type
            .clone()
            .ok_or_else(|| Error::invalid_data("trainType", "missing"))
    }

    fn line_number(&self) -> Result<String> {
        self.trip()?
            .vzn
            .clone()
            .ok_or_else(|| Error::invalid_data("vzn", "missing"))
    }
}

impl Geo for IcePortal {
    fn position(&self) -> Result<Position> {
        let status = self.status()?;
        match (status.latitude, status.longitude) {
            (Some(latitude), Some(longitude)) => Position::new(latitude, longitude),
            _ => Err(Error::invalid_data("status", "no coordinates")),
        }
    }

    fn speed(&self) -> Result<f64> {
        self.status()?
            .speed
            .map(kmh_to_ms)
            .ok_or_else(|| Error::invalid_data("speed", "missing"))
    }
}

impl Journey for IcePortal {
    fn stations(&self) -> Result<Vec<Station>> {
        let session = self.facade.connector()?.session();
        let trip = self.trip()?;
        if trip.stops.is_empty() {
            return Err(Error::invalid_data("stops", "API is missing data about stations"));
        }
        Ok(trip.stations(Some(session)))
    }

    fn current_station(&self) -> Result<Station> {
        let next = self
            .trip()?
            .stop_info
            .actual_next
            .clone()
            .ok_or_else(|| Error::invalid_data("actualNext", "no current station"))?;
        self.station(&next)
    }

    fn distance(&self) -> Result<f64> {
        self.trip()?
            .travelled()
            .ok_or_else(|| Error::invalid_data("actualPosition", "missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TRIP: &str = r#"{
        "trip": {
            "trainType": "ICE",
            "vzn": "691",
            "actualPosition": 120000,
            "distanceFromLastStop": 3500,
            "stopInfo": {"actualNext": "8000261"},
            "stops": [
                {
                    "station": {"evaNr": "8011160", "name": "Berlin Hbf",
                                "geocoordinates": {"latitude": 52.525, "longitude": 13.369}},
                    "timetable": {"scheduledDepartureTime": 1700000000000, "actualDepartureTime": 1700000120000},
                    "track": {"scheduled": "13", "actual": "14"},
                    "info": {"distanceFromStart": 0}
                },
                {
                    "station": {"evaNr": "8000261", "name": "München Hbf",
                                "geocoordinates": {"latitude": 48.140, "longitude": 11.558}},
                    "timetable": {"scheduledArrivalTime": 1700014400000, "actualArrivalTime": 1700014700000},
                    "track": {"scheduled": "19", "actual": null},
                    "info": {"distanceFromStart": 623000}
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_trip_stations() {
        let trip = parse_trip(TRIP).unwrap();
        let stations = trip.stations(None);
        assert_eq!(stations.len(), 2);

        let berlin = &stations[0];
        assert_eq!(berlin.name, "Berlin Hbf");
        assert!(berlin.arrival.is_none());
        let departure = berlin.departure.as_ref().unwrap();
        assert_eq!(departure.delay(), Duration::minutes(2));
        let platform = berlin.platform.as_ref().unwrap();
        assert_eq!((platform.scheduled().as_str(), platform.actual().as_str()), ("13", "14"));

        let munich = &stations[1];
        assert_eq!(munich.platform.as_ref().unwrap().actual(), "19");
        assert_eq!(munich.arrival.as_ref().unwrap().delay(), Duration::minutes(5));
        assert_relative_eq!(berlin.calculate_distance(munich).unwrap(), 623_000.0);
        assert!(munich.connections().unwrap().is_empty());
    }

    #[test]
    fn test_travelled_distance() {
        let trip = parse_trip(TRIP).unwrap();
        assert_relative_eq!(trip.travelled().unwrap(), 123_500.0);
        assert_eq!(trip.train_type.as_deref(), Some("ICE"));
    }

    #[test]
    fn test_trip_without_trip_is_invalid() {
        assert!(matches!(parse_trip("{}"), Err(Error::InvalidData { .. })));
    }

    #[test]
    fn test_parse_status() {
        let status = parse_status(
            r#"{
                "tzn": "Tz9018", "speed": 252.0, "latitude": 50.1, "longitude": 8.6,
                "serverTime": 1700000000000, "wagonClass": "FIRST",
                "connectivity": {"currentState": "HIGH", "nextState": "SATELLITE", "remainingTimeSeconds": 90}
            }"#,
        )
        .unwrap();
        assert_eq!(status.tzn.as_deref(), Some("Tz9018"));
        assert_eq!(status.wagon_class, Some(WagonClass::First));
        let connectivity = status.connectivity.unwrap();
        assert_eq!(connectivity.current_state, Some(InternetStatus::High));
        assert_eq!(connectivity.next_state, Some(InternetStatus::NoInfo));
        assert_eq!(connectivity.remaining_time_seconds, Some(90));
        assert_eq!(connectivity.status_change().unwrap(), Some(Duration::seconds(90)));
    }

    #[test]
    fn test_status_change_out_of_range_is_invalid() {
        let status =
            parse_status(r#"{"connectivity": {"remainingTimeSeconds": 9223372036854775807}}"#).unwrap();
        let connectivity = status.connectivity.unwrap();
        assert!(matches!(
            connectivity.status_change(),
            Err(Error::InvalidData { .. })
        ));
        assert_eq!(Connectivity::default().status_change().unwrap(), None);
    }

    #[test]
    fn test_parse_connections() {
        let connections = parse_connections(
            r#"{"connections": [
                {"trainType": "RE", "vzn": "5",
                 "station": {"name": "Rosenheim"},
                 "timetable": {"scheduledDepartureTime": 1700015000000},
                 "track": {"scheduled": "7"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(connections.len(), 1);
        let re = &connections[0];
        assert_eq!(re.vehicle_type.as_deref(), Some("RE"));
        assert_eq!(re.destination.as_deref(), Some("Rosenheim"));
        assert!(!re.departure.as_ref().unwrap().is_delayed());
        assert_eq!(re.platform.as_ref().unwrap().actual(), "7");
    }

    #[test]
    fn test_offers_geo_and_journey() {
        let train = IcePortal::new().unwrap();
        let capabilities = train.capabilities();
        assert!(capabilities.contains(&crate::Capability::Geo));
        assert!(capabilities.contains(&crate::Capability::Journey));
        assert!(!capabilities.contains(&crate::Capability::InternetAccess));
        assert!(matches!(train.stations(), Err(Error::NotInitialized)));
    }
}
