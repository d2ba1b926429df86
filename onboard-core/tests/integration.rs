use onboard_connect::dummy::DummyConnector;
use onboard_core::{
    event_channel, with_vehicle, CacheStore, Capability, Connector, DataLimit, Error, Event, Facade,
    InternetMetrics, Poller, PollerConfig, Result, Vehicle,
};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fast() -> PollerConfig {
    PollerConfig::default()
        .interval(Duration::from_millis(5))
        .min_sleep(Duration::from_millis(1))
        .ready_timeout(Duration::from_secs(5))
}

/// Refreshes as the test dictates: every cycle waits for the next scripted
/// outcome.
struct Scripted {
    cache: CacheStore,
    script: Mutex<mpsc::Receiver<anyhow::Result<u32>>>,
}

impl Scripted {
    fn new() -> (Self, mpsc::Sender<anyhow::Result<u32>>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                cache: CacheStore::new(),
                script: Mutex::new(rx),
            },
            tx,
        )
    }
}

impl Connector for Scripted {
    fn api_url(&self) -> &str {
        "test://scripted"
    }

    fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn refresh(&self) -> anyhow::Result<()> {
        let next = self.script.lock().unwrap().recv();
        match next {
            Ok(outcome) => {
                self.store("version", outcome?);
                Ok(())
            }
            Err(_) => anyhow::bail!("script finished"),
        }
    }
}

#[test]
fn test_dummy_connector_returns_defaults() {
    let connector = DummyConnector::new();
    connector.store("speed", 27.7);
    assert_eq!(connector.load_or("speed", 0.0), 0.0);
    assert!(matches!(connector.load::<f64>("speed"), Err(Error::NotFound(_))));
}

#[test]
fn test_failures_keep_cached_values() {
    init_logging();
    let (connector, script) = Scripted::new();
    let poller = Poller::new(connector, fast());
    poller.start().unwrap();

    script.send(Ok(1)).unwrap();
    assert!(poller.wait_for_cycles(1, Duration::from_secs(5)));
    assert!(poller.is_connected());

    for failure in 0..3u64 {
        script.send(Err(anyhow::anyhow!("HTTP 502"))).unwrap();
        assert!(poller.wait_for_cycles(2 + failure, Duration::from_secs(5)));
        assert!(!poller.is_connected());
        assert!(poller.is_running());
        assert_eq!(*poller.connector().load::<u32>("version").unwrap(), 1);
    }

    script.send(Ok(2)).unwrap();
    assert!(poller.wait_for_cycles(5, Duration::from_secs(5)));
    assert!(poller.is_connected());
    assert_eq!(*poller.connector().load::<u32>("version").unwrap(), 2);

    drop(script);
    poller.stop();
    assert!(!poller.is_running());
}

/// Each refresh takes 100 ms.
struct Slow {
    cache: CacheStore,
}

impl Connector for Slow {
    fn api_url(&self) -> &str {
        "test://slow"
    }

    fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn refresh(&self) -> anyhow::Result<()> {
        thread::sleep(Duration::from_millis(100));
        self.store("speed", 22.2);
        Ok(())
    }
}

#[test]
fn test_start_stop_is_bounded() {
    let interval = Duration::from_secs(30);
    let poller = Poller::new(
        Slow {
            cache: CacheStore::new(),
        },
        PollerConfig::default().interval(interval),
    );

    // stop during the first refresh
    let started = Instant::now();
    poller.start().unwrap();
    poller.stop();
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert!(!poller.is_running());

    // stop while sleeping towards the next cycle
    poller.start().unwrap();
    assert!(poller.wait_for_refresh(Duration::from_secs(5)));
    let started = Instant::now();
    poller.stop();
    poller.stop();
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert!(started.elapsed() < interval);
    assert!(!poller.is_running());
}

#[test]
fn test_readers_see_whole_values_while_polling() {
    struct Blocks {
        cache: CacheStore,
        version: std::sync::atomic::AtomicU64,
    }

    impl Connector for Blocks {
        fn api_url(&self) -> &str {
            "test://blocks"
        }

        fn cache(&self) -> &CacheStore {
            &self.cache
        }

        fn refresh(&self) -> anyhow::Result<()> {
            let version = self
                .version
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.store("block", vec![version; 8192]);
            Ok(())
        }
    }

    let poller = Poller::new(
        Blocks {
            cache: CacheStore::new(),
            version: Default::default(),
        },
        PollerConfig::default()
            .interval(Duration::from_millis(1))
            .min_sleep(Duration::ZERO),
    );
    poller.start().unwrap();
    assert!(poller.wait_for_refresh(Duration::from_secs(5)));

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..500 {
                    let block = poller.connector().load::<Vec<u64>>("block").unwrap();
                    assert!(block.iter().all(|v| *v == block[0]));
                }
            });
        }
    });
    poller.stop();
}

#[tokio::test]
async fn test_events_reach_the_channel() {
    let (tx, mut rx) = event_channel();
    let (connector, script) = Scripted::new();
    let facade = Facade::polled(connector, fast()).with_events(tx);

    script.send(Ok(7)).unwrap();
    facade.init().unwrap();

    let started = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(started, Some(Event::PollerStarted("test://scripted".to_string())));

    let mut saw_refresh = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        assert_eq!(event.api_url(), "test://scripted");
        if matches!(event, Event::Refreshed { cycle: 1, .. }) {
            saw_refresh = true;
            break;
        }
    }
    assert!(saw_refresh);

    drop(script);
    facade.shutdown();
}

/// A vehicle that knows nothing but its data allowance.
struct Metered {
    facade: Facade<DummyConnector>,
}

impl Vehicle for Metered {
    fn init(&self) -> Result<()> {
        self.facade.init()
    }

    fn shutdown(&self) {
        self.facade.shutdown()
    }

    fn id(&self) -> Result<String> {
        Ok("metered".to_string())
    }

    fn internet_metrics(&self) -> Result<&dyn InternetMetrics> {
        Ok(self)
    }
}

impl InternetMetrics for Metered {
    fn limit(&self) -> Result<Option<DataLimit>> {
        self.facade.connector()?;
        Ok(Some(DataLimit::Volume(200 * 1024 * 1024)))
    }
}

#[test]
fn test_scoped_vehicle() {
    let vehicle = Metered {
        facade: Facade::blocking(DummyConnector::new()),
    };
    assert_eq!(
        vehicle.capabilities().into_iter().collect::<Vec<_>>(),
        vec![Capability::InternetMetrics]
    );
    assert!(matches!(vehicle.geo(), Err(Error::FeatureMissing(_))));

    let limit = with_vehicle(&vehicle, |v| v.internet_metrics()?.limit()).unwrap();
    assert_eq!(limit, Some(DataLimit::Volume(200 * 1024 * 1024)));
    assert!(matches!(vehicle.limit(), Err(Error::ShutDown)));
}
