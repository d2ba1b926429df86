//! Unwired Networks journey widget, a GraphQL backend behind several
//! operators' splash pages.

use crate::capability::Journey;
use crate::config::VehicleConfig;
use crate::schedule::ScheduledEvent;
use crate::station::Station;
use crate::train::{split_line, Train};
use crate::vehicle::{Facade, Vehicle};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use onboard_connect::graphql::GraphQlSession;
use onboard_connect::{CacheStore, Connector, SessionConfig, Url};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, PoisonError, RwLock};

pub const API_URL: &str = "https://wasabi-splashpage.wifi.unwired.at/api/graphql";

/// Redirects to a splash page URL carrying a fresh `user_session_id`.
pub const LANDING_URL: &str = "https://unwired.info/?source=wasabi";

pub const JOURNEY_WIDGET_ID: &str = "363a8707-5e3e-4a5b-b565-9d22470dfd25";

const JOURNEY_QUERY: &str = r#"
query JourneyInfo($widget_id: ID!, $language: String!, $user_session_id: ID) {
  feed_widget(widget_id: $widget_id, language: $language, user_session_id: $user_session_id) {
    widget {
      json
    }
  }
}
"#;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub arrival_planned: Option<DateTime<Utc>>,
    /// Minutes
    pub arrival_delay: Option<i64>,
    pub departure_planned: Option<DateTime<Utc>>,
    /// Minutes
    pub departure_delay: Option<i64>,
}

impl Stop {
    fn to_station(&self) -> Station {
        let delayed = |planned: Option<DateTime<Utc>>, delay: Option<i64>| {
            planned.map(|planned| {
                ScheduledEvent::with_actual(planned, delay.map(|minutes| planned + Duration::minutes(minutes)))
            })
        };
        Station {
            arrival: delayed(self.arrival_planned, self.arrival_delay),
            departure: delayed(self.departure_planned, self.departure_delay),
            ..Station::new(self.id.clone(), self.name.clone())
        }
    }
}

/// The `course` of a journey widget. Empty while the train is not on a
/// journey.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Course {
    pub id: Option<String>,
    pub line: Option<String>,
    #[serde(default)]
    pub stops: Vec<Stop>,
}

#[derive(Deserialize)]
struct WidgetResponse {
    feed_widget: FeedWidget,
}

#[derive(Deserialize)]
struct FeedWidget {
    widget: Widget,
}

#[derive(Deserialize)]
struct Widget {
    /// The widget's payload, JSON encoded once more
    json: String,
}

#[derive(Deserialize)]
struct WidgetPayload {
    course: Option<Course>,
}

pub fn parse_widget(payload: &str) -> Result<Course> {
    let payload: WidgetPayload = serde_json::from_str(payload)?;
    Ok(payload.course.unwrap_or_default())
}

pub fn user_session_id(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "user_session_id")
        .map(|(_, value)| value.into_owned())
}

pub struct UnwiredConnector {
    client: GraphQlSession,
    cache: CacheStore,
    session_id: RwLock<Option<String>>,
}

impl UnwiredConnector {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            client: GraphQlSession::new(&config.clone().or_base_url(API_URL))?,
            cache: CacheStore::new(),
            session_id: RwLock::new(None),
        })
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for UnwiredConnector {
    fn api_url(&self) -> &str {
        API_URL
    }

    fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Follow the landing page redirect to obtain a user session.
    fn init(&self) -> Result<()> {
        let response = self
            .client
            .rest()
            .get(LANDING_URL)
            .map_err(|e| Error::initial_connection(LANDING_URL, e))?;
        let session_id = user_session_id(response.url()).ok_or_else(|| {
            Error::initial_connection(LANDING_URL, "redirect carries no user_session_id")
        })?;
        log::debug!("Unwired user session {}", session_id);
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = Some(session_id);
        Ok(())
    }

    fn refresh(&self) -> anyhow::Result<()> {
        let variables = json!({
            "widget_id": JOURNEY_WIDGET_ID,
            "language": "de",
            "user_session_id": self.session_id(),
        });
        let response: WidgetResponse = self.client.execute(JOURNEY_QUERY, &variables)?;
        let course = parse_widget(&response.feed_widget.widget.json)?;
        self.store("journey", course);
        Ok(())
    }
}

pub struct UnwiredTrain {
    facade: Facade<UnwiredConnector>,
}

impl UnwiredTrain {
    pub fn new() -> Result<Self> {
        Self::with_config(VehicleConfig::default())
    }

    pub fn with_config(config: VehicleConfig) -> Result<Self> {
        let connector = UnwiredConnector::new(&config.session)?;
        Ok(Self {
            facade: Facade::polled(connector, config.poller),
        })
    }

    fn course(&self) -> Result<Arc<Course>> {
        self.facade.connector()?.load("journey")
    }

    fn line(&self) -> Result<(String, String)> {
        let course = self.course()?;
        let line = course
            .line
            .as_deref()
            .ok_or_else(|| Error::invalid_data("line", "missing"))?;
        split_line(line)
            .map(|(category, number)| (category.to_string(), number.to_string()))
            .ok_or_else(|| Error::invalid_data("line", format!("cannot split {:?}", line)))
    }
}

impl Vehicle for UnwiredTrain {
    fn init(&self) -> Result<()> {
        self.facade.init()
    }

    fn shutdown(&self) {
        self.facade.shutdown()
    }

    fn id(&self) -> Result<String> {
        self.course()?
            .id
            .clone()
            .ok_or_else(|| Error::invalid_data("id", "the train's id could not be fetched"))
    }

    fn journey(&self) -> Result<&dyn Journey> {
        Ok(self)
    }
}

impl Train for UnwiredTrain {
    fn train_type(&self) -> Result<String> {
        Ok(self.line()?.0)
    }

    fn line_number(&self) -> Result<String> {
        Ok(self.line()?.1)
    }
}

impl Journey for UnwiredTrain {
    fn stations(&self) -> Result<Vec<Station>> {
        Ok(self.course()?.stops.iter().map(Stop::to_station).collect())
    }

    fn current_station(&self) -> Result<Station> {
        next_station(self.stations()?, self.now())
    }
}

/// The first station the train has yet to arrive at.
fn next_station(stations: Vec<Station>, now: DateTime<Utc>) -> Result<Station> {
    stations
        .into_iter()
        .find(|station| {
            station
                .arrival
                .as_ref()
                .map_or(false, |arrival| now < *arrival.actual())
        })
        .ok_or_else(|| Error::invalid_data("current_station", "no upcoming station"))
}
