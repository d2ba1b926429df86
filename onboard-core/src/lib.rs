pub mod capability;
pub mod config;
pub mod poller;
pub mod position;
pub mod schedule;
pub mod station;
pub mod train;
pub mod units;
pub mod vehicle;

pub use capability::{AccessState, Capability, DataLimit, Geo, InternetAccess, InternetMetrics, Journey};
pub use config::{PollerConfig, VehicleConfig};
pub use onboard_connect::{CacheStore, Connector, Error, Result, SessionConfig};
pub use poller::{Poller, PollerState};
pub use position::Position;
pub use schedule::ScheduledEvent;
pub use station::{ConnectingVehicle, Connections, DistanceTarget, Station};
pub use vehicle::{with_vehicle, Facade, Session, Vehicle};

use tokio::sync::mpsc;

/// What pollers report while they run. Every event names the backend's API URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PollerStarted(String),
    Refreshed { api_url: String, cycle: u64 },
    RefreshFailed { api_url: String, cycle: u64, message: String },
    ConnectionChanged { api_url: String, connected: bool },
    PollerStopped(String),
}

impl Event {
    pub fn api_url(&self) -> &str {
        match self {
            Event::PollerStarted(api_url) | Event::PollerStopped(api_url) => api_url,
            Event::Refreshed { api_url, .. }
            | Event::RefreshFailed { api_url, .. }
            | Event::ConnectionChanged { api_url, .. } => api_url,
        }
    }
}

/// A channel to hand to [`Poller::with_events`] or [`Facade::with_events`].
pub fn event_channel() -> (mpsc::UnboundedSender<Event>, mpsc::UnboundedReceiver<Event>) {
    mpsc::unbounded_channel()
}
