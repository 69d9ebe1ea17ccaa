//! Live subscription to one series.
//!
//! A series has at most one subscriber. Binding installs a [`SampleSink`] in
//! the series' slot and returns a [`Stream`] that owns that binding; closing
//! or dropping the stream releases it exactly once.
//!
//! Delivery is `try-deliver, drop-on-full`: the poll actor offers each new
//! value to the sink and moves on whether or not it was accepted. A display
//! that falls behind loses live values, never history, since every value is
//! written to the ring before it is offered.
//!
//! # Example
//!
//! ```rust
//! use proq::{MetricKey, RawSample, Store};
//!
//! # fn main() -> proq::Result<()> {
//! let store = Store::with_capacity(8)?;
//! let key = MetricKey::bare("queue_depth");
//! store.update(&RawSample::new(key.clone(), 3.0));
//!
//! let sub = store.subscribe(&key)?;
//! assert_eq!(sub.replay.values, vec![3.0]);
//!
//! store.update(&RawSample::new(key.clone(), 4.0));
//! assert_eq!(sub.receiver.try_recv().ok(), Some(4.0));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::mpsc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::metric::MetricKey;
use crate::ring::Samples;
use crate::series::{BindingId, Series};

/// Outcome of offering one value to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The sink accepted the value.
    Delivered,
    /// The sink has not drained its previous value; this one is dropped.
    Full,
    /// The receiving side is gone; the binding will be cleared.
    Disconnected,
}

/// A non-blocking destination for live values.
///
/// Implementations must return immediately. They run on the poll actor
/// while the series lock is held.
pub trait SampleSink: Send {
    /// Offers `value` without blocking.
    fn try_deliver(&self, value: f64) -> Delivery;
}

impl SampleSink for Sender<f64> {
    fn try_deliver(&self, value: f64) -> Delivery {
        match self.try_send(value) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    }
}

impl SampleSink for mpsc::SyncSender<f64> {
    fn try_deliver(&self, value: f64) -> Delivery {
        match self.try_send(value) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    }
}

/// Creates the size-1 channel used for live delivery.
pub fn channel() -> (Sender<f64>, Receiver<f64>) {
    crossbeam_channel::bounded(1)
}

/// Handle owning one binding on one series.
///
/// The binding is released by [`close`](Stream::close) or on drop, whichever
/// comes first. Releasing a binding that has since been replaced by another
/// `bind` on the same series leaves the newer subscriber in place.
#[derive(Debug)]
pub struct Stream {
    series: Arc<Series>,
    binding: BindingId,
    baseline: u64,
    closed: bool,
}

impl Stream {
    pub(crate) fn new(series: Arc<Series>, binding: BindingId, baseline: u64) -> Self {
        Self {
            series,
            binding,
            baseline,
            closed: false,
        }
    }

    /// Returns the key of the bound series.
    pub fn key(&self) -> &MetricKey {
        self.series.key()
    }

    /// Returns the binding this stream owns.
    pub fn binding(&self) -> BindingId {
        self.binding
    }

    /// Returns how many historical samples the caller already consumed
    /// through replay when it bound. Storage ignores it.
    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the binding. Only the first call has any effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.release();
    }

    pub(crate) fn series(&self) -> &Arc<Series> {
        &self.series
    }

    /// Clears the series slot if this stream's binding is still current.
    pub(crate) fn release(&self) -> bool {
        self.series.unbind(self.binding)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

/// History plus live updates for one series, captured atomically.
///
/// `replay` holds every retained value up to the moment of binding and
/// `receiver` yields values written afterwards, with no gap between them
/// other than values dropped because the receiver was not drained.
#[derive(Debug)]
pub struct Subscription {
    /// Retained history at bind time.
    pub replay: Samples,
    /// Live values written after bind.
    pub receiver: Receiver<f64>,
    /// Owner of the binding; dropping it stops delivery.
    pub stream: Stream,
}
