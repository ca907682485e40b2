use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use uuid::Uuid;
use vehreg::cache::{Clock, SourceFingerprint};
use vehreg::{
    AggregationCache, CsvFileSource, DashboardConfig, RecordLoader, RecordSet, RecordSource,
    RegistrationRecord, Result, VehRegError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

/// In-memory source that counts loads and can be told to fail.
struct CountingSource {
    records: RecordSet,
    loads: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    delay: Duration,
}

impl CountingSource {
    fn new(records: RecordSet) -> Self {
        Self {
            records,
            loads: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            delay: Duration::ZERO,
        }
    }
}

impl RecordSource for CountingSource {
    fn describe(&self) -> String {
        "counting".to_string()
    }

    fn fingerprint(&self) -> Result<SourceFingerprint> {
        Ok(SourceFingerprint::Version(1))
    }

    fn load(&self, _loader: &RecordLoader) -> Result<RecordSet> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(VehRegError::Schema("registrations".to_string()));
        }
        Ok(self.records.clone())
    }
}

fn sample() -> RecordSet {
    let d = |y, m| NaiveDate::from_ymd_opt(y, m, 1).unwrap();
    RecordSet::from_records(vec![
        RegistrationRecord::new(d(2021, 3), "4W", "Acme", 100),
        RegistrationRecord::new(d(2022, 3), "4W", "Acme", 150),
    ])
}

fn temp_csv(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("vehreg-{}.csv", Uuid::new_v4()));
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn reads_within_ttl_share_one_snapshot() {
    init_tracing();
    let source = CountingSource::new(sample());
    let loads = Arc::clone(&source.loads);
    let clock = Arc::new(ManualClock::new());
    let cache = AggregationCache::new(source, RecordLoader::default(), Duration::from_secs(300))
        .with_clock(clock.clone());

    let first = cache.get().unwrap();
    clock.advance(Duration::from_secs(299));
    let second = cache.get().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(first.yoy()[0].yoy_growth_pct, 50.0);
}

#[test]
fn ttl_expiry_triggers_one_recompute() {
    init_tracing();
    let source = CountingSource::new(sample());
    let loads = Arc::clone(&source.loads);
    let clock = Arc::new(ManualClock::new());
    let cache = AggregationCache::new(source, RecordLoader::default(), Duration::from_secs(60))
        .with_clock(clock.clone());

    let first = cache.get().unwrap();
    clock.advance(Duration::from_secs(60));
    let second = cache.get().unwrap();
    let third = cache.get().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &third));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(cache.recompute_count(), 2);
}

#[test]
fn invalidate_before_ttl_forces_refresh() {
    init_tracing();
    let source = CountingSource::new(sample());
    let loads = Arc::clone(&source.loads);
    let cache = AggregationCache::new(source, RecordLoader::default(), Duration::from_secs(3600));

    let first = cache.get().unwrap();
    cache.invalidate();
    let second = cache.get().unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_readers_after_invalidation_recompute_once() {
    init_tracing();
    let mut source = CountingSource::new(sample());
    source.delay = Duration::from_millis(50);
    let loads = Arc::clone(&source.loads);
    let cache = AggregationCache::new(source, RecordLoader::default(), Duration::from_secs(3600));

    cache.get().unwrap();
    cache.invalidate();

    let snapshots: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| cache.get().unwrap())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert!(snapshots.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn failed_refresh_keeps_previous_snapshot_published() {
    init_tracing();
    let source = CountingSource::new(sample());
    let fail = Arc::clone(&source.fail);
    let cache = AggregationCache::new(source, RecordLoader::default(), Duration::from_secs(3600));

    let good = cache.get().unwrap();
    cache.invalidate();
    fail.store(true, Ordering::SeqCst);

    assert!(matches!(cache.get(), Err(VehRegError::Schema(_))));
    let still = cache.peek().unwrap();
    assert!(Arc::ptr_eq(&good, &still));

    fail.store(false, Ordering::SeqCst);
    let recovered = cache.get().unwrap();
    assert_ne!(recovered.id(), good.id());
}

#[test]
fn rewritten_file_is_detected() {
    init_tracing();
    let path = temp_csv(
        "date,category,manufacturer,registrations\n\
         2021-03-01,4W,Acme,100\n",
    );
    let cache = AggregationCache::new(
        CsvFileSource::new(&path),
        RecordLoader::default(),
        Duration::from_secs(3600),
    );

    let before = cache.get().unwrap();
    assert!(before.yoy().is_empty());

    fs::write(
        &path,
        "date,category,manufacturer,registrations\n\
         2021-03-01,4W,Acme,100\n\
         2022-03-01,4W,Acme,150\n",
    )
    .unwrap();

    let after = cache.get().unwrap();
    assert_eq!(after.yoy().len(), 1);
    assert_eq!(after.yoy()[0].current_total, 150);
    assert_eq!(cache.recompute_count(), 2);

    fs::remove_file(&path).unwrap();
}

#[test]
fn config_driven_cache_applies_row_policy() {
    init_tracing();
    let path = temp_csv(
        "date,category,manufacturer,registrations\n\
         2021-03-01,4W,Acme,100\n\
         2022-03-01,4W,Acme,-5\n",
    );

    let strict = DashboardConfig {
        data_path: path.clone(),
        ..DashboardConfig::default()
    };
    let err = AggregationCache::from_config(&strict).get().unwrap_err();
    assert!(matches!(err, VehRegError::InvalidValue { .. }));

    let yaml = format!("data_path: {}\nrow_policy: skip\ncache_ttl: 1m\n", path.display());
    let lenient = DashboardConfig::from_yaml_str(&yaml).unwrap();
    let cache = AggregationCache::from_config(&lenient);
    assert_eq!(cache.ttl(), Duration::from_secs(60));
    let snapshot = cache.get().unwrap();
    assert_eq!(snapshot.records().len(), 1);
    assert!(snapshot.yoy().is_empty());

    fs::remove_file(&path).unwrap();
}
