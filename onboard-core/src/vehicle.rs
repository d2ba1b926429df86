//! The public face of a vehicle.
//!
//! A [`Facade`] owns one connector, either driven by a background [`Poller`]
//! or refreshed on demand, and guards every read behind `init()`. Vendor
//! vehicles wrap a facade and implement [`Vehicle`] plus the capabilities
//! they offer.

use crate::capability::{Capability, Geo, InternetAccess, InternetMetrics, Journey};
use crate::config::PollerConfig;
use crate::poller::Poller;
use crate::station::DistanceTarget;
use crate::{Error, Event, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use onboard_connect::Connector;
use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

pub trait Vehicle: Send + Sync {
    /// Connect and start refreshing. Must succeed before any data is read.
    fn init(&self) -> Result<()>;

    /// Stop refreshing and release the connection. Safe to call repeatedly.
    fn shutdown(&self);

    /// Stable identity of this vehicle
    fn id(&self) -> Result<String>;

    /// The backend's current time, or the local clock if it has none.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn geo(&self) -> Result<&dyn Geo> {
        Err(Capability::Geo.missing())
    }

    fn journey(&self) -> Result<&dyn Journey> {
        Err(Capability::Journey.missing())
    }

    fn internet_access(&self) -> Result<&dyn InternetAccess> {
        Err(Capability::InternetAccess.missing())
    }

    fn internet_metrics(&self) -> Result<&dyn InternetMetrics> {
        Err(Capability::InternetMetrics.missing())
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| match capability {
                Capability::Geo => self.geo().is_ok(),
                Capability::Journey => self.journey().is_ok(),
                Capability::InternetAccess => self.internet_access().is_ok(),
                Capability::InternetMetrics => self.internet_metrics().is_ok(),
            })
            .collect()
    }

    /// Distance in meters from the vehicle to `target`.
    ///
    /// Journey distances are used when both sides know them, the current
    /// position otherwise.
    fn calculate_distance<'a>(&self, target: impl Into<DistanceTarget<'a>>) -> Result<f64>
    where
        Self: Sized,
    {
        let target = target.into();
        let travelled = self.journey().and_then(|journey| journey.distance()).ok();
        let position = self.geo().and_then(|geo| geo.position()).ok();

        match target {
            DistanceTarget::Meters(meters) => travelled.map(|own| (own - meters).abs()),
            DistanceTarget::Position(other) => position.map(|own| own.distance_to(other)),
            DistanceTarget::Station(station) => match (travelled, station.distance) {
                (Some(own), Some(theirs)) => Some((own - theirs).abs()),
                _ => position
                    .zip(station.position)
                    .map(|(own, theirs)| own.distance_to(&theirs)),
            },
        }
        .ok_or_else(|| Error::NoLocation(target.to_string()))
    }

    /// Initialise now and shut down when the returned guard is dropped.
    fn session(&self) -> Result<Session<'_, Self>>
    where
        Self: Sized,
    {
        Session::open(self)
    }
}

/// Keeps a vehicle initialised for as long as it lives.
pub struct Session<'a, V: Vehicle + ?Sized> {
    vehicle: &'a V,
}

impl<'a, V: Vehicle + ?Sized> Session<'a, V> {
    pub fn open(vehicle: &'a V) -> Result<Self> {
        if let Err(e) = vehicle.init() {
            vehicle.shutdown();
            return Err(e);
        }
        Ok(Self { vehicle })
    }
}

impl<V: Vehicle + ?Sized> Deref for Session<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.vehicle
    }
}

impl<V: Vehicle + ?Sized> Drop for Session<'_, V> {
    fn drop(&mut self) {
        self.vehicle.shutdown();
    }
}

/// Run `body` against an initialised vehicle. The vehicle is shut down
/// afterwards, whether `body` succeeds, fails or panics.
pub fn with_vehicle<V, R, F>(vehicle: &V, body: F) -> Result<R>
where
    V: Vehicle + ?Sized,
    F: FnOnce(&V) -> Result<R>,
{
    let session = Session::open(vehicle)?;
    body(&session)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initialized,
    ShutDown,
}

enum Driver<C: Connector + 'static> {
    Polled(Poller<C>),
    /// Refreshed once by `init()` and then only on request
    Blocking(C),
}

pub struct Facade<C: Connector + 'static> {
    driver: Driver<C>,
    /// Only held to read or flip the state, never across I/O
    lifecycle: Mutex<Lifecycle>,
    /// Serializes `init()` and `shutdown()`
    transition: Mutex<()>,
}

impl<C: Connector + 'static> Facade<C> {
    pub fn polled(connector: C, config: PollerConfig) -> Self {
        Self::with_driver(Driver::Polled(Poller::new(connector, config)))
    }

    pub fn blocking(connector: C) -> Self {
        Self::with_driver(Driver::Blocking(connector))
    }

    fn with_driver(driver: Driver<C>) -> Self {
        Self {
            driver,
            lifecycle: Mutex::new(Lifecycle::Created),
            transition: Mutex::new(()),
        }
    }

    /// Report poller events on `events`. Blocking facades have none.
    pub fn with_events(self, events: mpsc::UnboundedSender<Event>) -> Self {
        let driver = match self.driver {
            Driver::Polled(poller) => Driver::Polled(poller.with_events(events)),
            blocking => blocking,
        };
        Self {
            driver,
            lifecycle: self.lifecycle,
            transition: self.transition,
        }
    }

    pub fn api_url(&self) -> &str {
        self.raw_connector().api_url()
    }

    pub fn poller(&self) -> Option<&Poller<C>> {
        match &self.driver {
            Driver::Polled(poller) => Some(poller),
            Driver::Blocking(_) => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        *self.lifecycle() == Lifecycle::Initialized
    }

    pub fn is_connected(&self) -> bool {
        match &self.driver {
            Driver::Polled(poller) => poller.is_connected(),
            Driver::Blocking(_) => self.is_initialized(),
        }
    }

    /// Run the connector's handshake, then start polling (or fetch once).
    ///
    /// A failing handshake is always a connection error. So is a first
    /// refresh that fails or times out, unless the poller was configured not
    /// to require it. Initialising twice does nothing.
    pub fn init(&self) -> Result<()> {
        let _transition = self.transition();
        if *self.lifecycle() == Lifecycle::Initialized {
            return Ok(());
        }

        let api_url = self.api_url().to_string();
        self.raw_connector()
            .init()
            .map_err(|e| establishing(&api_url, e))?;

        match &self.driver {
            Driver::Polled(poller) => {
                poller.start()?;
                let config = poller.config();
                if config.require_initial_refresh {
                    if !poller.wait_for_refresh(config.ready_timeout) {
                        poller.stop();
                        return Err(Error::initial_connection(
                            api_url,
                            format!("no data within {:?}", config.ready_timeout),
                        ));
                    }
                    if !poller.is_connected() {
                        poller.stop();
                        return Err(Error::initial_connection(api_url, "first refresh failed"));
                    }
                }
            }
            Driver::Blocking(connector) => {
                connector
                    .refresh()
                    .map_err(|e| Error::initial_connection(&api_url, format!("{:#}", e)))?;
            }
        }

        *self.lifecycle() = Lifecycle::Initialized;
        info!("Vehicle backed by {} initialized", api_url);
        Ok(())
    }

    /// Stop polling. Calling it again, or before `init()`, does nothing.
    /// Readers see `ShutDown` as soon as it starts, not once the poller has
    /// finished its last refresh.
    pub fn shutdown(&self) {
        let _transition = self.transition();
        {
            let mut lifecycle = self.lifecycle();
            if *lifecycle != Lifecycle::Initialized {
                return;
            }
            *lifecycle = Lifecycle::ShutDown;
        }
        if let Driver::Polled(poller) = &self.driver {
            poller.stop();
        }
        info!("Vehicle backed by {} shut down", self.api_url());
    }

    /// The connector, for reading cached data. Fails outside of
    /// `init()`..`shutdown()`.
    pub fn connector(&self) -> Result<&C> {
        match *self.lifecycle() {
            Lifecycle::Initialized => Ok(self.raw_connector()),
            Lifecycle::Created => Err(Error::NotInitialized),
            Lifecycle::ShutDown => Err(Error::ShutDown),
        }
    }

    /// Fetch fresh data now. Polled facades refresh on their own, so this
    /// only does work for blocking ones.
    pub fn refresh(&self) -> Result<()> {
        let connector = self.connector()?;
        if let Driver::Blocking(connector) = &self.driver {
            connector
                .refresh()
                .map_err(|e| Error::Connection(format!("{:#}", e)))?;
        } else {
            debug!("Ignoring manual refresh of polled {}", connector.api_url());
        }
        Ok(())
    }

    /// Forget all cached data.
    pub fn reset(&self) {
        match &self.driver {
            Driver::Polled(poller) => poller.reset(),
            Driver::Blocking(connector) => connector.reset(),
        }
    }

    fn raw_connector(&self) -> &C {
        match &self.driver {
            Driver::Polled(poller) => poller.connector(),
            Driver::Blocking(connector) => connector,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn establishing(api_url: &str, error: Error) -> Error {
    match error {
        Error::InitialConnection { .. } => error,
        other => Error::initial_connection(api_url, other),
    }
}
