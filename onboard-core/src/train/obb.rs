//! ÖBB Railnet Regio, the portal on Austrian regional trains.

use crate::capability::Geo;
use crate::config::VehicleConfig;
use crate::position::Position;
use crate::train::Train;
use crate::units::kmh_to_ms;
use crate::vehicle::{Facade, Vehicle};
use crate::{Error, Result};
use anyhow::Context;
use onboard_connect::rest::RestSession;
use onboard_connect::{CacheStore, Connector};
use serde::Deserialize;

pub const API_URL: &str = "https://railnet.oebb.at";

/// A GPS fix as reported by `api/gps`. Altitude and bearing only come from
/// newer trains.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpsFix {
    #[serde(alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(alias = "longitude")]
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    #[serde(alias = "orientation")]
    pub bearing: Option<f64>,
    /// km/h
    pub speed: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GpsPayload {
    Wrapped {
        #[serde(rename = "JSON")]
        json: GpsFix,
    },
    Plain(GpsFix),
}

pub fn parse_gps(body: &str) -> Result<GpsFix> {
    match serde_json::from_str(body)? {
        GpsPayload::Wrapped { json } | GpsPayload::Plain(json) => Ok(json),
    }
}

/// Plain-text number such as `87.5`.
pub fn parse_speed(body: &str) -> Result<f64> {
    body.trim()
        .parse()
        .map_err(|e| Error::invalid_data("speed", e))
}

pub struct RailnetConnector {
    session: RestSession,
    cache: CacheStore,
}

impl RailnetConnector {
    pub fn new(config: &onboard_connect::SessionConfig) -> Result<Self> {
        Ok(Self {
            session: RestSession::new(&config.clone().or_base_url(API_URL))?,
            cache: CacheStore::new(),
        })
    }

    fn train_info(&self) -> anyhow::Result<()> {
        // constant for the journey, fetched once
        if self.cache.contains("train_info") {
            return Ok(());
        }
        let id = self.session.get_text("api/trainInfo")?.trim().to_string();
        self.store("train_info", id);
        Ok(())
    }

    fn gps(&self) -> anyhow::Result<()> {
        let fix = parse_gps(&self.session.get_text("api/gps")?).context("api/gps")?;
        self.store("gps", fix);
        Ok(())
    }

    fn speed(&self) -> anyhow::Result<()> {
        let speed = parse_speed(&self.session.get_text("api/speed")?)?;
        self.store("speed", speed);
        Ok(())
    }
}

impl Connector for RailnetConnector {
    fn api_url(&self) -> &str {
        API_URL
    }

    fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn refresh(&self) -> anyhow::Result<()> {
        self.train_info()?;
        self.gps()?;
        self.speed()
    }
}

pub struct RailnetRegio {
    facade: Facade<RailnetConnector>,
}

impl RailnetRegio {
    pub fn new() -> Result<Self> {
        Self::with_config(VehicleConfig::default())
    }

    pub fn with_config(config: VehicleConfig) -> Result<Self> {
        let connector = RailnetConnector::new(&config.session)?;
        Ok(Self {
            facade: Facade::polled(connector, config.poller),
        })
    }

    pub fn facade(&self) -> &Facade<RailnetConnector> {
        &self.facade
    }
}

impl Vehicle for RailnetRegio {
    fn init(&self) -> Result<()> {
        self.facade.init()
    }

    fn shutdown(&self) {
        self.facade.shutdown()
    }

    fn id(&self) -> Result<String> {
        Ok(self.facade.connector()?.load::<String>("train_info")?.to_string())
    }

    fn geo(&self) -> Result<&dyn Geo> {
        Ok(self)
    }
}

impl Train for RailnetRegio {}

impl Geo for RailnetRegio {
    fn position(&self) -> Result<Position> {
        let fix = self.facade.connector()?.load::<GpsFix>("gps")?;
        fix_position(&fix)
    }

    fn speed(&self) -> Result<f64> {
        let connector = self.facade.connector()?;
        match connector.load::<f64>("speed") {
            Ok(speed) => Ok(kmh_to_ms(*speed)),
            Err(Error::NotFound(_)) => connector
                .load::<GpsFix>("gps")?
                .speed
                .map(kmh_to_ms)
                .ok_or_else(|| Error::NotFound("speed".to_string())),
            Err(e) => Err(e),
        }
    }
}

fn fix_position(fix: &GpsFix) -> Result<Position> {
    match (fix.lat, fix.lon) {
        (Some(lat), Some(lon)) => Ok(Position::new(lat, lon)?
            .with_altitude(fix.alt)
            .with_heading(fix.bearing)),
        _ => Err(Error::invalid_data("gps", "fix without coordinates")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_wrapped_gps() {
        let fix = parse_gps(r#"{"JSON": {"lat": 47.81, "lon": 13.04, "alt": 430.0, "bearing": 271.5}}"#)
            .unwrap();
        let position = fix_position(&fix).unwrap();
        assert_relative_eq!(position.latitude(), 47.81);
        assert_eq!(position.altitude(), Some(430.0));
        assert_eq!(position.heading(), Some(271.5));
    }

    #[test]
    fn test_parse_plain_gps_from_older_trains() {
        let fix = parse_gps(r#"{"latitude": 48.2, "longitude": 16.37, "orientation": null, "speed": 72.0}"#)
            .unwrap();
        let position = fix_position(&fix).unwrap();
        assert_eq!(position.coordinates(), (48.2, 16.37));
        assert_eq!(position.heading(), None);
        assert_eq!(fix.speed, Some(72.0));
    }

    #[test]
    fn test_fix_without_coordinates_is_invalid() {
        let fix = parse_gps(r#"{"JSON": {}}"#).unwrap();
        assert!(matches!(fix_position(&fix), Err(Error::InvalidData { .. })));
    }

    #[test]
    fn test_parse_speed() {
        assert_relative_eq!(parse_speed(" 87.5\n").unwrap(), 87.5);
        assert!(parse_speed("fast").is_err());
    }

    #[test]
    fn test_reads_require_init() {
        let train = RailnetRegio::new().unwrap();
        assert_eq!(train.facade().api_url(), API_URL);
        assert!(matches!(train.position(), Err(Error::NotInitialized)));
        assert!(matches!(train.journey(), Err(Error::FeatureMissing(_))));
    }
}
