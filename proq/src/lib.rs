//! # proq
//!
//! Ingestion and bounded in-memory history for Prometheus text metrics.
//!
//! proq is the core of a live terminal dashboard: a poll loop fetches an
//! exposition endpoint at a fixed interval and hands each body to proq, which
//! parses it, reassembles cumulative histograms, and keeps the last window of
//! every series in a fixed-size ring buffer. A display thread reads history
//! and subscribes to live values for the series it is showing.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Series identity is independent of label order
//! - Memory per series is fixed by the display window and poll interval
//! - Histograms are rebuilt whole every poll, or not at all
//! - Live delivery never blocks ingestion; a slow display drops live values
//!   but never loses history
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use proq::{ingest, MetricKey, Store, StoreConfig};
//!
//! # fn main() -> proq::Result<()> {
//! // 10 minutes of history at one sample every 5 seconds.
//! let config = StoreConfig::new(Duration::from_secs(600), Duration::from_secs(5))?;
//! let store = Arc::new(Store::new(config)?);
//!
//! // Poll side: feed each scrape body.
//! ingest(&store, "process_open_fds 17\nprocess_open_fds{pid=\"2\"} 4\n");
//!
//! // Display side: replay history, then follow live values.
//! let key = MetricKey::bare("process_open_fds");
//! let sub = store.subscribe(&key)?;
//! assert_eq!(sub.replay.values, vec![17.0]);
//!
//! ingest(&store, "process_open_fds 18\n");
//! assert_eq!(sub.receiver.try_recv().ok(), Some(18.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`]: Shared handle owning every series and the latest histograms
//! - [`StoreConfig`]: Window and poll interval that size each ring buffer
//! - [`MetricKey`]: Name plus labels, compared by canonical form
//! - [`Stream`]: Owner of one live subscription; releases it on drop
//!
//! ## Modules
//!
//! - [`parse`]: Exposition line parser
//! - [`metric`]: Keys, samples, bins and histograms
//! - [`histogram`]: Batch histogram reconstruction
//! - [`ingest`](mod@ingest): Parse, reconstruct and store one scrape body
//! - [`store`]: Series store
//! - [`series`]: Series registry and per-series cells
//! - [`ring`]: Fixed-capacity ring buffer
//! - [`stream`]: Sink trait and subscription handles
//! - [`config`]: Store sizing
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod histogram;
pub mod ingest;
pub mod metric;
pub mod parse;
pub mod ring;
pub mod series;
pub mod store;
pub mod stream;

// Re-export primary API types at crate root for convenience.
pub use config::StoreConfig;
pub use error::{ProqError, Result};
pub use histogram::{Reconstruction, reconstruct};
pub use ingest::{IngestReport, SkippedLine, ingest, ingest_lines};
pub use metric::{Bin, Histogram, Label, MetricKey, RawSample};
pub use parse::parse_line;
pub use ring::Samples;
pub use series::SeriesId;
pub use store::{CatalogEntry, SeriesKind, Store};
pub use stream::{Delivery, SampleSink, Stream, Subscription};
