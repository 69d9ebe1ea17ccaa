//! Metric data model and canonical series identity.
//!
//! A series is identified by its metric name plus its label set. Exposition
//! output does not guarantee label order, so identity is always computed over
//! labels sorted by name: `x{b="2",a="1"}` and `x{a="1",b="2"}` are the same
//! series. The canonical string form is
//!
//! ```text
//! name{n1="v1", n2="v2"}
//! ```
//!
//! with the label block omitted entirely when there are no labels. It is used
//! as the store's lookup key and as the histogram grouping key.

use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProqError;

/// A `name="value"` tag on a sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value, unescaped.
    pub value: String,
}

impl Label {
    /// Creates a label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        f.write_str("=\"")?;
        for c in self.value.chars() {
            match c {
                '\\' => f.write_str("\\\\")?,
                '"' => f.write_str("\\\"")?,
                '\n' => f.write_str("\\n")?,
                c => f.write_char(c)?,
            }
        }
        f.write_char('"')
    }
}

/// Serializes `name` and `labels` into the canonical series key.
///
/// Labels are sorted ascending by name before serialization. The sort is
/// stable, so repeated label names keep their relative order.
///
/// # Examples
///
/// ```rust
/// use proq::metric::{canonicalize, Label};
///
/// let key = canonicalize("http_requests_total", &[
///     Label::new("status", "200"),
///     Label::new("method", "get"),
/// ]);
/// assert_eq!(key, r#"http_requests_total{method="get", status="200"}"#);
/// assert_eq!(canonicalize("up", &[]), "up");
/// ```
pub fn canonicalize(name: &str, labels: &[Label]) -> String {
    let mut sorted: Vec<&Label> = labels.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    write_canonical(name, &sorted)
}

fn write_canonical(name: &str, sorted: &[&Label]) -> String {
    let mut out = String::with_capacity(name.len() + sorted.len() * 16);
    out.push_str(name);
    if !sorted.is_empty() {
        out.push('{');
        for (i, label) in sorted.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            // Writing into a String cannot fail.
            let _ = write!(out, "{label}");
        }
        out.push('}');
    }
    out
}

/// A metric name plus its label set.
///
/// Labels are kept in the order they were received. Equality, hashing and
/// [`Display`](fmt::Display) all go through the sorted canonical form, so
/// two keys compare equal exactly when their canonical strings match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricKey {
    /// Metric name.
    pub name: String,
    /// Labels in receipt order.
    pub labels: Vec<Label>,
}

impl MetricKey {
    /// Creates a key from a name and labels.
    pub fn new(name: impl Into<String>, labels: Vec<Label>) -> Self {
        Self {
            name: name.into(),
            labels,
        }
    }

    /// Creates a key with no labels.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Returns the canonical string identity of this key.
    pub fn canonical(&self) -> String {
        write_canonical(&self.name, &self.sorted_labels())
    }

    /// Returns the labels stable-sorted by name.
    pub fn sorted_labels(&self) -> Vec<&Label> {
        let mut sorted: Vec<&Label> = self.labels.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }

    /// Returns the value of the first label called `name`.
    pub fn find(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Returns a copy of this key with every label called `name` removed,
    /// and whether anything was removed.
    pub fn without(&self, name: &str) -> (MetricKey, bool) {
        let labels: Vec<Label> = self
            .labels
            .iter()
            .filter(|l| l.name != name)
            .cloned()
            .collect();
        let removed = labels.len() < self.labels.len();
        (MetricKey::new(self.name.clone(), labels), removed)
    }

    /// Returns a copy of this key under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> MetricKey {
        MetricKey::new(name, self.labels.clone())
    }
}

impl PartialEq for MetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.labels.len() == other.labels.len()
            && self.sorted_labels() == other.sorted_labels()
    }
}

impl Eq for MetricKey {}

impl Hash for MetricKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for label in self.sorted_labels() {
            label.hash(state);
        }
    }
}

impl PartialOrd for MetricKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetricKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.canonical().cmp(&other.canonical()))
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for MetricKey {
    type Err = ProqError;

    /// Parses `name` or `name{label="value", ...}` with no value token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(crate::parse::parse_key(s)?)
    }
}

impl From<&str> for MetricKey {
    fn from(name: &str) -> Self {
        MetricKey::bare(name)
    }
}

/// One parsed exposition line: a series key and its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Series identity.
    pub key: MetricKey,
    /// Sample value.
    pub value: f64,
}

impl RawSample {
    /// Creates a sample.
    pub fn new(key: MetricKey, value: f64) -> Self {
        Self { key, value }
    }

    /// Shorthand for the metric name.
    pub fn name(&self) -> &str {
        &self.key.name
    }
}

/// One cumulative histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Inclusive upper bound (`le`); may be `f64::INFINITY`.
    pub upper_bound: f64,
    /// Number of observations less than or equal to `upper_bound`.
    pub count: u64,
}

/// A cumulative histogram reassembled from its `_bucket`, `_count` and
/// `_sum` series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Base name and labels, without `le`.
    pub key: MetricKey,
    /// Buckets in the order they were received.
    pub bins: Vec<Bin>,
    /// Value of the `_count` series.
    pub count: f64,
    /// Value of the `_sum` series.
    pub sum: f64,
}

impl Histogram {
    /// Returns the base metric name.
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Returns the mean observation, or `None` when nothing was observed.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0.0 {
            None
        } else {
            Some(self.sum / self.count)
        }
    }
}
