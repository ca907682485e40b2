//! Aggregation cache: memoizes "load records + compute growth tables".
//!
//! A snapshot stays valid until one of these happens:
//! - its age reaches the configured TTL,
//! - `invalidate()` is called,
//! - the source fingerprint changes (file rewritten, version bumped).
//!
//! Refreshes are serialized by a mutex and re-check freshness after taking
//! it, so a burst of readers after an invalidation triggers one recompute.
//! A new snapshot is fully built before it replaces the published one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DashboardConfig;
use crate::error::Result;
use crate::growth::{GrowthTables, QoqGrowth, YoyGrowth};
use crate::loader::{LoadOptions, RecordLoader};
use crate::record::RecordSet;

// ── Sources ─────────────────────────────────────────────────────────────────

/// Identity of a source's current content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFingerprint {
    File {
        path: PathBuf,
        modified: Option<SystemTime>,
        len: u64,
    },
    Version(u64),
}

/// Where records come from.
pub trait RecordSource: Send + Sync {
    /// Short label for logs.
    fn describe(&self) -> String;

    fn fingerprint(&self) -> Result<SourceFingerprint>;

    fn load(&self, loader: &RecordLoader) -> Result<RecordSet>;
}

/// A CSV file on disk, identified by path, modification time and length.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CsvFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fingerprint(&self) -> Result<SourceFingerprint> {
        let meta = fs::metadata(&self.path)?;
        Ok(SourceFingerprint::File {
            path: self.path.clone(),
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }

    fn load(&self, loader: &RecordLoader) -> Result<RecordSet> {
        loader.load_csv(&self.path)
    }
}

/// Records already in memory, identified by an explicit version token.
#[derive(Debug, Clone)]
pub struct StaticSource {
    records: RecordSet,
    version: u64,
}

impl StaticSource {
    pub fn new(records: RecordSet, version: u64) -> Self {
        Self { records, version }
    }
}

impl RecordSource for StaticSource {
    fn describe(&self) -> String {
        format!("static records v{}", self.version)
    }

    fn fingerprint(&self) -> Result<SourceFingerprint> {
        Ok(SourceFingerprint::Version(self.version))
    }

    fn load(&self, _loader: &RecordLoader) -> Result<RecordSet> {
        Ok(self.records.clone())
    }
}

// ── Clock ───────────────────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ── Snapshot ────────────────────────────────────────────────────────────────

/// One published, immutable result of load + compute.
#[derive(Debug)]
pub struct Snapshot {
    id: Uuid,
    fingerprint: SourceFingerprint,
    epoch: u64,
    computed_at: Instant,
    records: RecordSet,
    tables: GrowthTables,
}

impl Snapshot {
    /// Fresh for every recompute; lets consumers notice a refresh.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn fingerprint(&self) -> &SourceFingerprint {
        &self.fingerprint
    }

    pub fn computed_at(&self) -> Instant {
        self.computed_at
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn yoy(&self) -> &[YoyGrowth] {
        &self.tables.yoy
    }

    pub fn qoq(&self) -> &[QoqGrowth] {
        &self.tables.qoq
    }

    pub fn tables(&self) -> &GrowthTables {
        &self.tables
    }
}

// ── Cache ───────────────────────────────────────────────────────────────────

pub struct AggregationCache {
    source: Box<dyn RecordSource>,
    loader: RecordLoader,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    epoch: AtomicU64,
    published: RwLock<Option<Arc<Snapshot>>>,
    refresh: Mutex<()>,
    recomputes: AtomicU64,
}

impl AggregationCache {
    pub fn new(source: impl RecordSource + 'static, loader: RecordLoader, ttl: Duration) -> Self {
        Self {
            source: Box::new(source),
            loader,
            ttl,
            clock: Arc::new(SystemClock),
            epoch: AtomicU64::new(0),
            published: RwLock::new(None),
            refresh: Mutex::new(()),
            recomputes: AtomicU64::new(0),
        }
    }

    /// Cache over the CSV file named in the config.
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(
            CsvFileSource::new(config.data_path.clone()),
            RecordLoader::new(LoadOptions::from(config)),
            config.cache_ttl,
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of load + compute cycles run so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::SeqCst)
    }

    /// Current snapshot, recomputing first if it is missing or stale.
    ///
    /// A failed refresh returns the error and leaves the previous snapshot
    /// published (still stale, so the next call retries).
    pub fn get(&self) -> Result<Arc<Snapshot>> {
        let fingerprint = self.source.fingerprint()?;
        if let Some(snapshot) = self.fresh(&fingerprint) {
            debug!(snapshot = %snapshot.id, "aggregation cache hit");
            return Ok(snapshot);
        }

        let _guard = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);

        // another caller may have refreshed while we waited
        let fingerprint = self.source.fingerprint()?;
        if let Some(snapshot) = self.fresh(&fingerprint) {
            return Ok(snapshot);
        }

        let snapshot = match self.compute(fingerprint) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                warn!(source = %self.source.describe(), error = %err, "aggregation refresh failed");
                return Err(err);
            }
        };
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Last published snapshot, fresh or not. Never recomputes.
    pub fn peek(&self) -> Option<Arc<Snapshot>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mark the published snapshot stale; the next `get` recomputes.
    pub fn invalidate(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, "aggregation cache invalidated");
    }

    fn fresh(&self, fingerprint: &SourceFingerprint) -> Option<Arc<Snapshot>> {
        let guard = self
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = guard.as_ref()?;

        let age = self.clock.now().saturating_duration_since(snapshot.computed_at);
        let valid = snapshot.epoch == self.epoch.load(Ordering::SeqCst)
            && &snapshot.fingerprint == fingerprint
            && age < self.ttl;
        valid.then(|| Arc::clone(snapshot))
    }

    fn compute(&self, fingerprint: SourceFingerprint) -> Result<Snapshot> {
        // read before loading: an invalidate() during the load must still win
        let epoch = self.epoch.load(Ordering::SeqCst);
        let started = Instant::now();

        let records = self.source.load(&self.loader)?;
        let tables = GrowthTables::compute(&records);
        self.recomputes.fetch_add(1, Ordering::SeqCst);

        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            fingerprint,
            epoch,
            computed_at: self.clock.now(),
            records,
            tables,
        };
        info!(
            source = %self.source.describe(),
            snapshot = %snapshot.id,
            records = snapshot.records.len(),
            yoy_rows = snapshot.tables.yoy.len(),
            qoq_rows = snapshot.tables.qoq.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation snapshot published"
        );
        Ok(snapshot)
    }
}
