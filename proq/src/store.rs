//! The series store: bounded history per series plus the latest histograms.
//!
//! One [`Store`] is built at startup and shared, usually as `Arc<Store>`,
//! between the poll actor that ingests batches and the display actor that
//! reads history and binds live subscribers. There is no process-wide state.
//!
//! # Design
//!
//! - The series index sits behind a read/write lock. Writes to a known
//!   series only take the read lock; the write lock is taken once per new
//!   series.
//! - Each series cell serializes its own ring, subscriber slot and delivery.
//! - Histograms live in an atomically swapped map. Each batch publishes a
//!   new map; readers keep whatever snapshot they loaded.
//!
//! Nothing is ever evicted. Memory grows with the number of distinct series,
//! each costing `capacity` floats.
//!
//! # Example Usage
//!
//! ```rust
//! use proq::{MetricKey, RawSample, Store};
//!
//! # fn main() -> proq::Result<()> {
//! let store = Store::with_capacity(3)?;
//! let key: MetricKey = r#"cpu_seconds{mode="idle"}"#.parse()?;
//!
//! for v in [1.0, 2.0, 3.0, 4.0] {
//!     store.update(&RawSample::new(key.clone(), v));
//! }
//!
//! let samples = store.samples(&key)?;
//! assert_eq!(samples.values, vec![2.0, 3.0, 4.0]);
//! assert_eq!(samples.total, 4);
//!
//! assert!(store.samples(&MetricKey::bare("unseen")).is_err());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::{ConfigError, Result, StoreError};
use crate::metric::{Histogram, MetricKey, RawSample};
use crate::ring::Samples;
use crate::series::{Series, SeriesId, SeriesIndex};
use crate::stream::{self, SampleSink, Stream, Subscription};

/// Whether a catalog entry is a plain series or a histogram.
///
/// Histograms order before series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeriesKind {
    /// A reconstructed histogram.
    Histogram,
    /// A raw sample series.
    Series,
}

/// One entry in [`Store::catalog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Series or histogram key.
    pub key: MetricKey,
    /// What the key refers to.
    pub kind: SeriesKind,
}

type HistogramMap = HashMap<String, Arc<Histogram>>;

/// Bounded in-memory store for one scrape target.
///
/// # Thread Safety
///
/// All methods take `&self`. `update` and `update_histograms` are expected
/// to be called from a single poll actor; reads, binds and unbinds may come
/// from any thread concurrently with it.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    capacity: usize,
    index: RwLock<SeriesIndex>,
    histograms: ArcSwap<HistogramMap>,
}

impl Store {
    /// Creates an empty store sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration does not validate.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity();
        Ok(Self {
            config,
            capacity,
            index: RwLock::new(SeriesIndex::new(capacity)),
            histograms: ArcSwap::from_pointee(HashMap::new()),
        })
    }

    /// Creates an empty store retaining exactly `capacity` samples per series.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] for a zero capacity, or any
    /// other [`ConfigError`] from validation.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity.into());
        }
        Self::new(StoreConfig::with_capacity(capacity))
    }

    /// Returns the configuration the store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the number of samples retained per series.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of series observed so far.
    pub fn series_count(&self) -> usize {
        self.index.read().len()
    }

    /// Returns the number of histograms currently stored.
    pub fn histogram_count(&self) -> usize {
        self.histograms.load().len()
    }

    /// Records one sample.
    ///
    /// The series is created on first sight. The value is appended to its
    /// ring and offered to the bound subscriber, if any, without blocking.
    /// Always succeeds.
    pub fn update(&self, sample: &RawSample) {
        self.series_for_write(&sample.key).record(sample.value);
    }

    /// Replaces the stored histogram for every key in `batch`.
    ///
    /// Keys not in `batch` keep their previous histogram. Values are never
    /// merged. Returns the number of histograms written.
    pub fn update_histograms<I>(&self, batch: I) -> usize
    where
        I: IntoIterator<Item = Histogram>,
    {
        let mut next: HistogramMap = HistogramMap::clone(&self.histograms.load());
        let mut written = 0;
        for histogram in batch {
            next.insert(histogram.key.canonical(), Arc::new(histogram));
            written += 1;
        }
        if written > 0 {
            self.histograms.store(Arc::new(next));
        }
        written
    }

    /// Returns the retained history of `key`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SeriesNotFound`] if no sample was ever written
    /// for `key`.
    pub fn samples(&self, key: &MetricKey) -> Result<Samples> {
        Ok(self.series(key)?.samples())
    }

    /// Returns the latest histogram for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::HistogramNotFound`] if none has been stored.
    pub fn get_histogram(&self, key: &MetricKey) -> Result<Arc<Histogram>> {
        let canonical = key.canonical();
        self.histograms
            .load()
            .get(&canonical)
            .cloned()
            .ok_or_else(|| StoreError::HistogramNotFound { key: canonical }.into())
    }

    /// Returns the id assigned to `key`, if it has been observed.
    pub fn series_id(&self, key: &MetricKey) -> Option<SeriesId> {
        self.index.read().get(&key.canonical()).map(|s| s.id())
    }

    /// Makes `sink` the only live subscriber of `key`.
    ///
    /// Any previous subscriber is replaced silently. `baseline` is the
    /// number of samples the caller already consumed through
    /// [`samples`](Self::samples); it is carried on the returned [`Stream`]
    /// and does not affect storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SeriesNotFound`] if `key` was never observed.
    pub fn bind<S>(&self, key: &MetricKey, sink: S, baseline: u64) -> Result<Stream>
    where
        S: SampleSink + 'static,
    {
        let series = self.series(key)?;
        let (binding, _) = series.bind(Box::new(sink), false);
        Ok(Stream::new(series, binding, baseline))
    }

    /// Clears the subscriber owned by `stream`.
    ///
    /// Safe to call any number of times, and a no-op once another `bind`
    /// has replaced the stream's subscriber. A stream bound on another store
    /// is left alone. Returns `true` if the slot was cleared by this call.
    pub fn unbind(&self, stream: &Stream) -> bool {
        let series = stream.series();
        let owned = self
            .index
            .read()
            .by_id(series.id())
            .is_some_and(|own| Arc::ptr_eq(own, series));
        owned && stream.release()
    }

    /// Snapshots the history of `key` and binds a fresh size-1 channel in
    /// one step, so no value falls between replay and live delivery.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SeriesNotFound`] if `key` was never observed.
    pub fn subscribe(&self, key: &MetricKey) -> Result<Subscription> {
        let series = self.series(key)?;
        let (tx, receiver) = stream::channel();
        let (binding, replay) = series.bind(Box::new(tx), true);
        let replay = replay.unwrap_or_default();
        let stream = Stream::new(series, binding, replay.total);
        Ok(Subscription {
            replay,
            receiver,
            stream,
        })
    }

    /// Lists every known histogram and series.
    ///
    /// Histograms come first, then entries are ordered by metric name and
    /// finally by canonical key.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<CatalogEntry> = self
            .histograms
            .load()
            .values()
            .map(|h| CatalogEntry {
                key: h.key.clone(),
                kind: SeriesKind::Histogram,
            })
            .collect();

        entries.extend(self.index.read().iter().map(|s| CatalogEntry {
            key: s.key().clone(),
            kind: SeriesKind::Series,
        }));

        entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.key.cmp(&b.key)));
        entries
    }

    fn series(&self, key: &MetricKey) -> Result<Arc<Series>> {
        let canonical = key.canonical();
        let index = self.index.read();
        match index.get(&canonical) {
            Some(series) => Ok(Arc::clone(series)),
            None => Err(StoreError::SeriesNotFound { key: canonical }.into()),
        }
    }

    fn series_for_write(&self, key: &MetricKey) -> Arc<Series> {
        let canonical = key.canonical();
        if let Some(series) = self.index.read().get(&canonical) {
            return Arc::clone(series);
        }
        self.index.write().get_or_register(key, canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProqError;
    use crate::metric::{Bin, Label};

    fn sample(name: &str, labels: &[(&str, &str)], value: f64) -> RawSample {
        RawSample::new(
            MetricKey::new(
                name,
                labels.iter().map(|(n, v)| Label::new(*n, *v)).collect(),
            ),
            value,
        )
    }

    fn histogram(name: &str, counts: &[u64]) -> Histogram {
        Histogram {
            key: MetricKey::bare(name),
            bins: counts
                .iter()
                .enumerate()
                .map(|(i, &count)| Bin {
                    upper_bound: f64::from(u32::try_from(i).unwrap()),
                    count,
                })
                .collect(),
            count: counts.last().copied().unwrap_or(0) as f64,
            sum: 1.0,
        }
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = Store::new(StoreConfig::default()).unwrap();
        assert_eq!(store.capacity(), 61);
        assert_eq!(store.series_count(), 0);
        assert_eq!(store.histogram_count(), 0);
        assert!(store.catalog().is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = Store::with_capacity(0).unwrap_err();
        assert!(matches!(err, ProqError::Config(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn test_update_is_label_order_independent() {
        let store = Store::with_capacity(4).unwrap();
        store.update(&sample("x", &[("a", "1"), ("b", "2")], 1.0));
        store.update(&sample("x", &[("b", "2"), ("a", "1")], 2.0));
        assert_eq!(store.series_count(), 1);

        let key = sample("x", &[("b", "2"), ("a", "1")], 0.0).key;
        assert_eq!(store.samples(&key).unwrap().values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_samples_not_found() {
        let store = Store::with_capacity(4).unwrap();
        let err = store.samples(&MetricKey::bare("missing")).unwrap_err();
        assert!(matches!(
            err,
            ProqError::Store(StoreError::SeriesNotFound { ref key }) if key == "missing"
        ));
    }

    #[test]
    fn test_histograms_replace_not_merge() {
        let store = Store::with_capacity(4).unwrap();
        let first = histogram("h", &[1, 2]);
        store.update_histograms([first.clone()]);
        store.update_histograms([first.clone()]);
        assert_eq!(*store.get_histogram(&MetricKey::bare("h")).unwrap(), first);

        let second = histogram("h", &[5]);
        store.update_histograms([second.clone()]);
        assert_eq!(*store.get_histogram(&MetricKey::bare("h")).unwrap(), second);
    }

    #[test]
    fn test_histograms_absent_from_batch_are_untouched() {
        let store = Store::with_capacity(4).unwrap();
        store.update_histograms([histogram("a", &[1]), histogram("b", &[2])]);
        assert_eq!(store.update_histograms([histogram("b", &[3])]), 1);

        assert_eq!(store.get_histogram(&MetricKey::bare("a")).unwrap().bins[0].count, 1);
        assert_eq!(store.get_histogram(&MetricKey::bare("b")).unwrap().bins[0].count, 3);
        assert_eq!(store.histogram_count(), 2);
    }

    #[test]
    fn test_empty_histogram_batch_is_noop() {
        let store = Store::with_capacity(4).unwrap();
        assert_eq!(store.update_histograms(Vec::new()), 0);
        assert_eq!(store.histogram_count(), 0);
    }

    #[test]
    fn test_histogram_reader_keeps_snapshot() {
        let store = Store::with_capacity(4).unwrap();
        store.update_histograms([histogram("h", &[1])]);
        let held = store.get_histogram(&MetricKey::bare("h")).unwrap();
        store.update_histograms([histogram("h", &[9])]);
        assert_eq!(held.bins[0].count, 1);
    }

    #[test]
    fn test_get_histogram_not_found() {
        let store = Store::with_capacity(4).unwrap();
        let err = store.get_histogram(&MetricKey::bare("h")).unwrap_err();
        assert!(matches!(
            err,
            ProqError::Store(StoreError::HistogramNotFound { .. })
        ));
    }

    #[test]
    fn test_bind_unseen_key_fails() {
        let store = Store::with_capacity(4).unwrap();
        let (tx, _rx) = stream::channel();
        let err = store.bind(&MetricKey::bare("nope"), tx, 0).unwrap_err();
        assert!(matches!(
            err,
            ProqError::Store(StoreError::SeriesNotFound { .. })
        ));
    }

    #[test]
    fn test_bind_carries_baseline() {
        let store = Store::with_capacity(4).unwrap();
        let s = sample("x", &[], 1.0);
        store.update(&s);
        let (tx, _rx) = stream::channel();
        let stream = store.bind(&s.key, tx, 7).unwrap();
        assert_eq!(stream.baseline(), 7);
        assert_eq!(stream.key(), &s.key);
    }

    #[test]
    fn test_unbind_is_repeatable() {
        let store = Store::with_capacity(4).unwrap();
        let s = sample("x", &[], 1.0);
        store.update(&s);
        let (tx, rx) = stream::channel();
        let stream = store.bind(&s.key, tx, 0).unwrap();

        assert!(store.unbind(&stream));
        assert!(!store.unbind(&stream));
        store.update(&s);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unbind_ignores_stream_from_other_store() {
        let ours = Store::with_capacity(4).unwrap();
        let theirs = Store::with_capacity(4).unwrap();
        let s = sample("x", &[], 1.0);
        ours.update(&s);
        theirs.update(&s);

        let (tx, rx) = stream::channel();
        let stream = theirs.bind(&s.key, tx, 0).unwrap();

        assert!(!ours.unbind(&stream));
        theirs.update(&s);
        assert_eq!(rx.try_recv().ok(), Some(1.0));

        assert!(theirs.unbind(&stream));
    }

    #[test]
    fn test_subscribe_baseline_matches_replay() {
        let store = Store::with_capacity(2).unwrap();
        let s = sample("x", &[], 1.0);
        for _ in 0..5 {
            store.update(&s);
        }
        let sub = store.subscribe(&s.key).unwrap();
        assert_eq!(sub.replay.values.len(), 2);
        assert_eq!(sub.replay.total, 5);
        assert_eq!(sub.stream.baseline(), 5);
    }

    #[test]
    fn test_series_ids_are_stable() {
        let store = Store::with_capacity(2).unwrap();
        store.update(&sample("a", &[], 1.0));
        store.update(&sample("b", &[], 1.0));
        store.update(&sample("a", &[], 2.0));
        assert_eq!(store.series_id(&MetricKey::bare("a")), Some(SeriesId(0)));
        assert_eq!(store.series_id(&MetricKey::bare("b")), Some(SeriesId(1)));
        assert_eq!(store.series_id(&MetricKey::bare("c")), None);
    }

    #[test]
    fn test_catalog_order() {
        let store = Store::with_capacity(2).unwrap();
        store.update(&sample("zeta", &[], 1.0));
        store.update(&sample("alpha", &[("b", "2")], 1.0));
        store.update(&sample("alpha", &[("a", "1")], 1.0));
        store.update_histograms([histogram("web", &[1]), histogram("db", &[1])]);

        let catalog: Vec<(SeriesKind, String)> = store
            .catalog()
            .into_iter()
            .map(|e| (e.kind, e.key.canonical()))
            .collect();

        assert_eq!(catalog, vec![
            (SeriesKind::Histogram, "db".to_string()),
            (SeriesKind::Histogram, "web".to_string()),
            (SeriesKind::Series, r#"alpha{a="1"}"#.to_string()),
            (SeriesKind::Series, r#"alpha{b="2"}"#.to_string()),
            (SeriesKind::Series, "zeta".to_string()),
        ]);
    }

    #[test]
    fn test_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Store>();
        assert_send_sync::<Stream>();
    }
}
