//! Series registration and per-series state.
//!
//! The [`SeriesIndex`] maps canonical key strings to stable numeric ids and
//! owns one [`Series`] cell per id. A cell is created on the first write for
//! its key and lives until the store is dropped; ids are handed out
//! sequentially and never reused.
//!
//! # Shared state
//!
//! Each cell keeps its ring buffer and its single subscriber slot behind one
//! mutex. The poll actor writes and delivers while the display actor binds
//! and unbinds, so the slot must never be read and replaced concurrently.
//! Delivery itself never blocks: the slot holds a [`SampleSink`] whose
//! `try_deliver` either hands the value over or reports why it could not.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::metric::MetricKey;
use crate::ring::{RingBuffer, Samples};
use crate::stream::{Delivery, SampleSink};

/// Stable numeric identity of a series for the life of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(pub u32);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one `bind` call on one series.
///
/// Unbinding with a stale id is a no-op, so a subscriber that has already
/// been replaced cannot clear its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

struct Binding {
    id: BindingId,
    sink: Box<dyn SampleSink>,
}

struct SeriesState {
    ring: RingBuffer,
    binding: Option<Binding>,
    next_binding: u64,
}

/// One series: its key, its history and its live subscriber slot.
pub struct Series {
    id: SeriesId,
    key: MetricKey,
    canonical: String,
    state: Mutex<SeriesState>,
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Series");
        out.field("id", &self.id).field("key", &self.canonical);
        // A sink may format its series while `record` holds the lock.
        match self.state.try_lock() {
            Some(state) => out.field("bound", &state.binding.is_some()),
            None => out.field("bound", &format_args!("<locked>")),
        };
        out.finish_non_exhaustive()
    }
}

impl Series {
    fn new(id: SeriesId, key: MetricKey, canonical: String, capacity: usize) -> Self {
        Self {
            id,
            key,
            canonical,
            state: Mutex::new(SeriesState {
                ring: RingBuffer::new(capacity),
                binding: None,
                next_binding: 0,
            }),
        }
    }

    /// Returns the series id.
    pub fn id(&self) -> SeriesId {
        self.id
    }

    /// Returns the key as first observed.
    pub fn key(&self) -> &MetricKey {
        &self.key
    }

    /// Returns the canonical key string.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Returns `true` while a subscriber is bound.
    pub fn is_bound(&self) -> bool {
        self.state.lock().binding.is_some()
    }

    /// Appends `value` to the ring and offers it to the bound subscriber.
    ///
    /// A full sink drops the value for live purposes only; it is still in
    /// the ring. A disconnected sink is cleared from the slot.
    pub(crate) fn record(&self, value: f64) {
        let mut state = self.state.lock();
        state.ring.push(value);

        let Some(binding) = state.binding.as_ref() else {
            return;
        };
        let delivery = binding.sink.try_deliver(value);
        let binding_id = binding.id;

        match delivery {
            Delivery::Delivered => {}
            Delivery::Full => {
                trace!(series = %self.canonical, value, "subscriber full, live value dropped");
            }
            Delivery::Disconnected => {
                state.binding = None;
                debug!(series = %self.canonical, binding = %binding_id, "subscriber disconnected, slot cleared");
            }
        }
    }

    /// Copies the retained history.
    pub fn samples(&self) -> Samples {
        self.state.lock().ring.snapshot()
    }

    /// Installs `sink` as the only subscriber, replacing any previous one.
    ///
    /// When `snapshot` is set the history is copied under the same lock, so
    /// no write can land between the copy and the first live delivery.
    pub(crate) fn bind(
        &self,
        sink: Box<dyn SampleSink>,
        snapshot: bool,
    ) -> (BindingId, Option<Samples>) {
        let mut state = self.state.lock();
        let id = BindingId(state.next_binding);
        state.next_binding += 1;

        let replay = snapshot.then(|| state.ring.snapshot());
        let previous = state.binding.replace(Binding { id, sink });

        match previous {
            Some(old) => debug!(series = %self.canonical, binding = %id, replaced = %old.id, "subscriber replaced"),
            None => debug!(series = %self.canonical, binding = %id, "subscriber bound"),
        }
        (id, replay)
    }

    /// Clears the slot if `binding` is still the current subscriber.
    ///
    /// Returns `true` if something was cleared.
    pub(crate) fn unbind(&self, binding: BindingId) -> bool {
        let mut state = self.state.lock();
        if state.binding.as_ref().map(|b| b.id) != Some(binding) {
            return false;
        }
        state.binding = None;
        debug!(series = %self.canonical, binding = %binding, "subscriber unbound");
        true
    }
}

/// Registry of every series observed by a store.
///
/// Lookups are by canonical key string. Label order in the incoming key
/// never matters because [`MetricKey::canonical`] sorts before serializing.
#[derive(Debug)]
pub struct SeriesIndex {
    by_key: HashMap<String, SeriesId>,
    series: Vec<Arc<Series>>,
    capacity: usize,
}

impl SeriesIndex {
    /// Creates an empty index whose rings hold `capacity` samples each.
    pub fn new(capacity: usize) -> Self {
        Self {
            by_key: HashMap::new(),
            series: Vec::new(),
            capacity,
        }
    }

    /// Looks up a series by canonical key.
    pub fn get(&self, canonical: &str) -> Option<&Arc<Series>> {
        self.by_key
            .get(canonical)
            .map(|id| &self.series[id.0 as usize])
    }

    /// Looks up a series by id.
    pub fn by_id(&self, id: SeriesId) -> Option<&Arc<Series>> {
        self.series.get(id.0 as usize)
    }

    /// Returns the existing series for `canonical`, registering a new one
    /// for `key` if this is its first sight.
    pub fn get_or_register(&mut self, key: &MetricKey, canonical: String) -> Arc<Series> {
        if let Some(existing) = self.get(&canonical) {
            return Arc::clone(existing);
        }

        #[allow(clippy::cast_possible_truncation)] // four billion distinct series is out of reach
        let id = SeriesId(self.series.len() as u32);
        let series = Arc::new(Series::new(id, key.clone(), canonical.clone(), self.capacity));
        debug!(series = %canonical, id = %id, "registered new series");

        self.by_key.insert(canonical, id);
        self.series.push(Arc::clone(&series));
        series
    }

    /// Returns the number of registered series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Iterates series in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Series>> {
        self.series.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Label;
    use crate::stream::channel;
    use std::sync::OnceLock;

    fn key(name: &str, labels: &[(&str, &str)]) -> MetricKey {
        MetricKey::new(
            name,
            labels.iter().map(|(n, v)| Label::new(*n, *v)).collect(),
        )
    }

    fn register(index: &mut SeriesIndex, k: &MetricKey) -> Arc<Series> {
        index.get_or_register(k, k.canonical())
    }

    #[test]
    fn test_registration_assigns_sequential_ids() {
        let mut index = SeriesIndex::new(4);
        let a = register(&mut index, &key("a", &[]));
        let b = register(&mut index, &key("b", &[]));
        assert_eq!(a.id(), SeriesId(0));
        assert_eq!(b.id(), SeriesId(1));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_registration_is_label_order_independent() {
        let mut index = SeriesIndex::new(4);
        let first = register(&mut index, &key("x", &[("a", "1"), ("b", "2")]));
        let second = register(&mut index, &key("x", &[("b", "2"), ("a", "1")]));
        assert_eq!(first.id(), second.id());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(index.len(), 1);
        // The first-seen label order is kept.
        assert_eq!(second.key().labels[0].name, "a");
    }

    #[test]
    fn test_lookup_by_id_and_key() {
        let mut index = SeriesIndex::new(4);
        let k = key("up", &[("job", "node")]);
        let s = register(&mut index, &k);
        assert!(index.get(r#"up{job="node"}"#).is_some());
        assert!(index.get("up").is_none());
        assert_eq!(index.by_id(s.id()).map(|s| s.canonical()), Some(r#"up{job="node"}"#));
        assert!(index.by_id(SeriesId(9)).is_none());
    }

    #[test]
    fn test_record_delivers_to_bound_sink() {
        let mut index = SeriesIndex::new(4);
        let s = register(&mut index, &key("x", &[]));
        let (tx, rx) = channel();
        let (binding, replay) = s.bind(Box::new(tx), false);
        assert!(replay.is_none());

        s.record(1.5);
        assert_eq!(rx.try_recv().ok(), Some(1.5));

        assert!(s.unbind(binding));
        s.record(2.5);
        assert!(rx.try_recv().is_err());
        assert_eq!(s.samples().values, vec![1.5, 2.5]);
    }

    #[test]
    fn test_full_sink_drops_live_value_only() {
        let mut index = SeriesIndex::new(4);
        let s = register(&mut index, &key("x", &[]));
        let (tx, rx) = channel();
        s.bind(Box::new(tx), false);

        s.record(1.0);
        s.record(2.0);
        assert_eq!(rx.try_recv().ok(), Some(1.0));
        assert!(rx.try_recv().is_err());
        assert_eq!(s.samples().values, vec![1.0, 2.0]);
        assert!(s.is_bound());
    }

    #[test]
    fn test_disconnected_sink_is_cleared() {
        let mut index = SeriesIndex::new(4);
        let s = register(&mut index, &key("x", &[]));
        let (tx, rx) = channel();
        s.bind(Box::new(tx), false);
        drop(rx);

        s.record(1.0);
        assert!(!s.is_bound());
    }

    #[test]
    fn test_stale_unbind_keeps_newer_binding() {
        let mut index = SeriesIndex::new(4);
        let s = register(&mut index, &key("x", &[]));
        let (old_tx, _old_rx) = channel();
        let (new_tx, new_rx) = channel();

        let old = s.bind(Box::new(old_tx), false).0;
        let new = s.bind(Box::new(new_tx), false).0;
        assert_ne!(old, new);

        assert!(!s.unbind(old));
        s.record(3.0);
        assert_eq!(new_rx.try_recv().ok(), Some(3.0));

        assert!(s.unbind(new));
        assert!(!s.unbind(new));
    }

    /// Sink that formats its own series on every delivery.
    struct FormattingSink {
        series: Arc<OnceLock<Arc<Series>>>,
        out: crossbeam_channel::Sender<String>,
    }

    impl SampleSink for FormattingSink {
        fn try_deliver(&self, _value: f64) -> Delivery {
            if let Some(series) = self.series.get() {
                let _ = self.out.try_send(format!("{series:?}"));
            }
            Delivery::Delivered
        }
    }

    #[test]
    fn test_debug_inside_delivery_does_not_block() {
        let mut index = SeriesIndex::new(4);
        let s = register(&mut index, &key("x", &[]));
        let slot = Arc::new(OnceLock::new());
        let _ = slot.set(Arc::clone(&s));
        let (out, formatted) = crossbeam_channel::bounded(1);
        s.bind(Box::new(FormattingSink { series: slot, out }), false);

        s.record(1.0);
        let text = formatted.try_recv().unwrap();
        assert!(text.contains("<locked>"), "{text}");

        // Outside delivery the binding state is reported.
        assert!(format!("{s:?}").contains("bound: true"));
    }

    #[test]
    fn test_bind_with_snapshot() {
        let mut index = SeriesIndex::new(2);
        let s = register(&mut index, &key("x", &[]));
        for v in [1.0, 2.0, 3.0] {
            s.record(v);
        }
        let (tx, _rx) = channel();
        let (_, replay) = s.bind(Box::new(tx), true);
        let replay = replay.unwrap();
        assert_eq!(replay.values, vec![2.0, 3.0]);
        assert_eq!(replay.total, 3);
    }
}
