//! Background refresh of a [`Connector`].
//!
//! A [`Poller`] owns exactly one thread while running. That thread is the only
//! writer to the connector's cache: it calls `refresh()`, records the outcome
//! and sleeps until the next cycle or until it is told to stop, whichever
//! comes first. A failed refresh is logged and reported as an [`Event`], and
//! the previously cached values stay readable.

use crate::config::PollerConfig;
use crate::{Error, Event, Result};
use anyhow::anyhow;
use log::{debug, info, trace, warn};
use onboard_connect::Connector;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Constructed, never started
    Idle,
    Running,
    /// Stopped explicitly, may be started again
    Stopped,
}

struct Control {
    stop: bool,
    cycles: u64,
}

/// State shared between the poller handle and its thread.
struct Shared {
    running: AtomicBool,
    connected: AtomicBool,
    control: Mutex<Control>,
    wake: Condvar,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Lifecycle {
    state: PollerState,
    handle: Option<JoinHandle<()>>,
    /// Completed cycles when the current run started
    first_cycle: u64,
}

pub struct Poller<C: Connector + 'static> {
    connector: Arc<C>,
    config: PollerConfig,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl<C: Connector + 'static> Poller<C> {
    pub fn new(connector: C, config: PollerConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                control: Mutex::new(Control {
                    stop: false,
                    cycles: 0,
                }),
                wake: Condvar::new(),
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: PollerState::Idle,
                handle: None,
                first_cycle: 0,
            }),
            events: None,
        }
    }

    /// Report lifecycle and refresh outcomes on `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn state(&self) -> PollerState {
        self.lifecycle().state
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether the last refresh succeeded.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Completed refresh cycles, successful or not, over the poller's lifetime.
    pub fn cycles(&self) -> u64 {
        self.shared.control().cycles
    }

    /// Spawn the polling thread. Starting a running poller does nothing.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == PollerState::Running {
            debug!("Poller for {} is already running", self.connector.api_url());
            return Ok(());
        }

        lifecycle.first_cycle = {
            let mut control = self.shared.control();
            control.stop = false;
            control.cycles
        };
        self.shared.running.store(true, Ordering::SeqCst);

        let api_url = self.connector.api_url().to_string();
        // announced before the thread can report its first refresh
        self.emit(Event::PollerStarted(api_url.clone()));

        let connector = self.connector.clone();
        let config = self.config.clone();
        let shared = self.shared.clone();
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name(format!("poller {}", api_url))
            .spawn(move || run_loop(connector, config, shared, events));

        match spawned {
            Ok(handle) => {
                lifecycle.handle = Some(handle);
                lifecycle.state = PollerState::Running;
                info!("Poller for {} started", api_url);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.emit(Event::PollerStopped(api_url));
                Err(Error::Io(e))
            }
        }
    }

    /// Signal the thread to exit and wait for it. No cache writes happen after
    /// this returns. Stopping an idle or stopped poller does nothing.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        let Some(handle) = lifecycle.handle.take() else {
            return;
        };

        self.shared.control().stop = true;
        self.shared.wake.notify_all();
        if handle.join().is_err() {
            warn!("Poller thread for {} panicked", self.connector.api_url());
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        lifecycle.state = PollerState::Stopped;
        info!("Poller for {} stopped", self.connector.api_url());
        self.emit(Event::PollerStopped(self.connector.api_url().to_string()));
    }

    /// Clear the cache. Legal in any state, leaves `running` untouched.
    pub fn reset(&self) {
        self.connector.reset();
    }

    /// Wait until the current run has completed at least one cycle.
    /// Returns `false` on timeout or if the poller was stopped meanwhile.
    pub fn wait_for_refresh(&self, timeout: Duration) -> bool {
        let first_cycle = self.lifecycle().first_cycle;
        self.wait_for_cycles(first_cycle + 1, timeout)
    }

    /// Wait until `cycles()` reaches `target`.
    pub fn wait_for_cycles(&self, target: u64, timeout: Duration) -> bool {
        let control = self.shared.control();
        let (control, _) = self
            .shared
            .wake
            .wait_timeout_while(control, timeout, |c| c.cycles < target && !c.stop)
            .unwrap_or_else(PoisonError::into_inner);
        control.cycles >= target
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: Event) {
        emit(&self.events, event);
    }
}

impl<C: Connector + 'static> Drop for Poller<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn emit(events: &Option<mpsc::UnboundedSender<Event>>, event: Event) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

fn run_loop<C: Connector>(
    connector: Arc<C>,
    config: PollerConfig,
    shared: Arc<Shared>,
    events: Option<mpsc::UnboundedSender<Event>>,
) {
    let api_url = connector.api_url().to_string();
    debug!("Polling {} every {:?}", api_url, config.interval);

    loop {
        if shared.control().stop {
            break;
        }

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| connector.refresh()))
            .unwrap_or_else(|_| Err(anyhow!("refresh panicked")));

        let connected = outcome.is_ok();
        let was_connected = shared.connected.swap(connected, Ordering::SeqCst);

        let cycle = {
            let mut control = shared.control();
            control.cycles += 1;
            control.cycles
        };
        shared.wake.notify_all();

        match outcome {
            Ok(()) => {
                trace!("Refresh #{} of {} succeeded", cycle, api_url);
                emit(
                    &events,
                    Event::Refreshed {
                        api_url: api_url.clone(),
                        cycle,
                    },
                );
            }
            Err(e) => {
                warn!("Refresh #{} of {} failed: {:#}", cycle, api_url, e);
                emit(
                    &events,
                    Event::RefreshFailed {
                        api_url: api_url.clone(),
                        cycle,
                        message: format!("{:#}", e),
                    },
                );
            }
        }
        if connected != was_connected {
            emit(
                &events,
                Event::ConnectionChanged {
                    api_url: api_url.clone(),
                    connected,
                },
            );
        }

        let sleep = config.sleep_after(started.elapsed());
        let control = shared.control();
        let (control, _) = shared
            .wake
            .wait_timeout_while(control, sleep, |c| !c.stop)
            .unwrap_or_else(PoisonError::into_inner);
        if control.stop {
            break;
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    debug!("Poller thread for {} exited", api_url);
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboard_connect::CacheStore;
    use std::sync::atomic::AtomicU32;

    struct CountingConnector {
        cache: CacheStore,
        calls: AtomicU32,
    }

    impl CountingConnector {
        fn new() -> Self {
            Self {
                cache: CacheStore::new(),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Connector for CountingConnector {
        fn api_url(&self) -> &str {
            "test://counting"
        }

        fn cache(&self) -> &CacheStore {
            &self.cache
        }

        fn refresh(&self) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.store("calls", call);
            Ok(())
        }
    }

    struct PanickingConnector {
        cache: CacheStore,
    }

    impl Connector for PanickingConnector {
        fn api_url(&self) -> &str {
            "test://panicking"
        }

        fn cache(&self) -> &CacheStore {
            &self.cache
        }

        fn refresh(&self) -> anyhow::Result<()> {
            panic!("vendor bug")
        }
    }

    fn fast() -> PollerConfig {
        PollerConfig::default()
            .interval(Duration::from_millis(5))
            .min_sleep(Duration::from_millis(1))
    }

    #[test]
    fn test_lifecycle_states() {
        let poller = Poller::new(CountingConnector::new(), fast());
        assert_eq!(poller.state(), PollerState::Idle);
        assert!(!poller.is_running());

        poller.start().unwrap();
        assert_eq!(poller.state(), PollerState::Running);
        assert!(poller.is_running());
        assert!(poller.wait_for_refresh(Duration::from_secs(5)));
        assert!(poller.is_connected());

        poller.stop();
        assert_eq!(poller.state(), PollerState::Stopped);
        assert!(!poller.is_running());
        poller.stop();
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[test]
    fn test_start_twice_spawns_one_thread() {
        let poller = Poller::new(CountingConnector::new(), fast());
        poller.start().unwrap();
        poller.start().unwrap();
        assert!(poller.wait_for_cycles(3, Duration::from_secs(5)));
        poller.stop();

        // one thread means calls and cycles advance in lockstep
        let calls = poller.connector().calls.load(Ordering::SeqCst) as u64;
        assert_eq!(calls, poller.cycles());
    }

    #[test]
    fn test_no_writes_after_stop() {
        let poller = Poller::new(CountingConnector::new(), fast());
        poller.start().unwrap();
        assert!(poller.wait_for_cycles(2, Duration::from_secs(5)));
        poller.stop();

        let calls = *poller.connector().load::<u32>("calls").unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(*poller.connector().load::<u32>("calls").unwrap(), calls);
    }

    #[test]
    fn test_stop_wakes_a_sleeping_poller() {
        let config = PollerConfig::default()
            .interval(Duration::from_secs(60))
            .min_sleep(Duration::from_secs(60));
        let poller = Poller::new(CountingConnector::new(), config);
        poller.start().unwrap();
        assert!(poller.wait_for_refresh(Duration::from_secs(5)));

        let started = Instant::now();
        poller.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_restart_after_stop() {
        let poller = Poller::new(CountingConnector::new(), fast());
        poller.start().unwrap();
        assert!(poller.wait_for_refresh(Duration::from_secs(5)));
        poller.stop();

        let cycles = poller.cycles();
        poller.start().unwrap();
        assert!(poller.wait_for_refresh(Duration::from_secs(5)));
        assert!(poller.cycles() > cycles);
        poller.stop();
    }

    #[test]
    fn test_reset_clears_cache_but_keeps_running() {
        let config = PollerConfig::default()
            .interval(Duration::from_secs(60))
            .min_sleep(Duration::from_secs(60));
        let poller = Poller::new(CountingConnector::new(), config);
        poller.start().unwrap();
        assert!(poller.wait_for_refresh(Duration::from_secs(5)));
        assert!(poller.connector().cache().contains("calls"));

        poller.reset();
        assert!(poller.connector().cache().is_empty());
        assert!(poller.is_running());
        assert_eq!(poller.state(), PollerState::Running);
        poller.stop();
    }

    #[test]
    fn test_panicking_refresh_keeps_looping() {
        let poller = Poller::new(
            PanickingConnector {
                cache: CacheStore::new(),
            },
            fast(),
        );
        poller.start().unwrap();
        assert!(poller.wait_for_cycles(3, Duration::from_secs(5)));
        assert!(poller.is_running());
        assert!(!poller.is_connected());
        poller.stop();
    }

    #[test]
    fn test_events_are_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = Poller::new(CountingConnector::new(), fast()).with_events(tx);
        poller.start().unwrap();
        assert!(poller.wait_for_refresh(Duration::from_secs(5)));
        poller.stop();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&Event::PollerStarted("test://counting".to_string())));
        assert!(events.contains(&Event::Refreshed {
            api_url: "test://counting".to_string(),
            cycle: 1,
        }));
        assert!(events.contains(&Event::ConnectionChanged {
            api_url: "test://counting".to_string(),
            connected: true,
        }));
        assert_eq!(events.last(), Some(&Event::PollerStopped("test://counting".to_string())));
    }

    #[test]
    fn test_drop_stops_thread() {
        let poller = Poller::new(CountingConnector::new(), fast());
        poller.start().unwrap();
        let shared = poller.shared.clone();
        drop(poller);
        assert!(!shared.running.load(Ordering::SeqCst));
    }
}
