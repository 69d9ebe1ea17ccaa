//! Reassembly of cumulative histograms from one poll batch.
//!
//! The text format flattens a histogram into three kinds of series sharing a
//! base name: `<base>_bucket{le="..."}` per bucket, `<base>_count` and
//! `<base>_sum`. [`reconstruct`] groups a batch's samples back by base key
//! and partitions the batch into whole histograms and residual raw samples.
//!
//! # Partial-failure semantics
//!
//! A group only becomes a [`Histogram`] when it has at least one bucket, a
//! count and a sum, and every bucket carries a parsable `le` bound. Anything
//! short of that releases *every* member of the group unchanged into the
//! residual set. Reconstruction never fails a batch and never emits a partial
//! histogram.
//!
//! Bins are emitted in receipt order. Sorting by bound or merging bins for
//! display is left to the presentation layer.

use std::collections::HashMap;

use tracing::debug;

use crate::metric::{Bin, Histogram, MetricKey, RawSample};

/// Suffix of per-bucket series.
pub const BUCKET_SUFFIX: &str = "_bucket";
/// Suffix of the observation count series.
pub const COUNT_SUFFIX: &str = "_count";
/// Suffix of the observation sum series.
pub const SUM_SUFFIX: &str = "_sum";
/// Label holding a bucket's inclusive upper bound.
pub const BOUND_LABEL: &str = "le";

/// The partition of one batch produced by [`reconstruct`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reconstruction {
    /// Complete histograms keyed by canonical base key.
    pub histograms: HashMap<String, Histogram>,
    /// Samples that are not part of a complete histogram, in receipt order
    /// for pass-through samples, followed by demoted groups.
    pub residual: Vec<RawSample>,
}

#[derive(Debug, Clone, Copy)]
enum Part {
    Bucket,
    Count,
    Sum,
}

/// Accumulated members of one base key.
#[derive(Debug)]
struct Group {
    key: MetricKey,
    buckets: Vec<RawSample>,
    count: Option<RawSample>,
    sum: Option<RawSample>,
}

impl Group {
    fn new(key: MetricKey) -> Self {
        Self {
            key,
            buckets: Vec::new(),
            count: None,
            sum: None,
        }
    }

    /// Converts buckets to bins, or explains why the group does not qualify.
    fn bins(&self) -> Result<Vec<Bin>, &'static str> {
        if self.buckets.is_empty() {
            return Err("no bucket samples");
        }
        if self.count.is_none() {
            return Err("missing count sample");
        }
        if self.sum.is_none() {
            return Err("missing sum sample");
        }

        self.buckets
            .iter()
            .map(|bucket| {
                let bound = bucket
                    .key
                    .find(BOUND_LABEL)
                    .ok_or("bucket without le label")?;
                let upper_bound = parse_bound(bound).ok_or("unparsable bucket bound")?;
                Ok(Bin {
                    upper_bound,
                    count: count_from_value(bucket.value),
                })
            })
            .collect()
    }

    /// Releases every member into `residual`: buckets, then count, then sum.
    fn release(self, residual: &mut Vec<RawSample>) {
        residual.extend(self.buckets);
        residual.extend(self.count);
        residual.extend(self.sum);
    }
}

/// Splits one batch of samples into histograms and residual raw samples.
///
/// Samples whose name does not end in `_bucket`, `_count` or `_sum` pass
/// straight through. For bucket samples the `le` label is removed before the
/// base key is computed; count and sum samples keep their labels as-is.
/// When a batch repeats a count or sum for the same base key, the last one
/// wins and earlier duplicates are discarded. They stay discarded if the
/// group is later released, so the residual holds only the last of them.
///
/// Runs in a single pass, linear in the number of samples.
///
/// # Examples
///
/// ```rust
/// use proq::histogram::reconstruct;
/// use proq::parse::parse_line;
///
/// let batch = [
///     r#"x_bucket{le="0.1"} 1"#,
///     r#"x_bucket{le="+Inf"} 3"#,
///     "x_count 3",
///     "x_sum 1.2",
///     "up 1",
/// ];
/// let samples = batch.iter().map(|l| parse_line(l)).collect::<Result<Vec<_>, _>>()?;
///
/// let out = reconstruct(samples);
/// assert_eq!(out.histograms["x"].bins.len(), 2);
/// assert_eq!(out.residual.len(), 1);
/// # Ok::<(), proq::error::ParseError>(())
/// ```
pub fn reconstruct<I>(samples: I) -> Reconstruction
where
    I: IntoIterator<Item = RawSample>,
{
    let mut residual = Vec::new();
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for sample in samples {
        let Some((base_len, part)) = classify(&sample.key.name) else {
            residual.push(sample);
            continue;
        };

        let base = &sample.key.name[..base_len];
        let base_key = match part {
            Part::Bucket => sample.key.without(BOUND_LABEL).0.renamed(base),
            Part::Count | Part::Sum => sample.key.renamed(base),
        };

        let slot = *index.entry(base_key.canonical()).or_insert_with(|| {
            groups.push(Group::new(base_key));
            groups.len() - 1
        });
        let group = &mut groups[slot];

        match part {
            Part::Bucket => group.buckets.push(sample),
            Part::Count => group.count = Some(sample),
            Part::Sum => group.sum = Some(sample),
        }
    }

    let mut histograms = HashMap::with_capacity(groups.len());
    for group in groups {
        match group.bins() {
            Ok(bins) => {
                let canonical = group.key.canonical();
                let count = group.count.as_ref().map_or(0.0, |s| s.value);
                let sum = group.sum.as_ref().map_or(0.0, |s| s.value);
                histograms.insert(
                    canonical,
                    Histogram {
                        key: group.key,
                        bins,
                        count,
                        sum,
                    },
                );
            }
            Err(reason) => {
                debug!(base = %group.key, reason, "histogram group released to raw samples");
                group.release(&mut residual);
            }
        }
    }

    Reconstruction {
        histograms,
        residual,
    }
}

/// Matches a reserved suffix, returning the base name length and which part
/// of a histogram the sample is.
fn classify(name: &str) -> Option<(usize, Part)> {
    [
        (BUCKET_SUFFIX, Part::Bucket),
        (COUNT_SUFFIX, Part::Count),
        (SUM_SUFFIX, Part::Sum),
    ]
    .into_iter()
    .find_map(|(suffix, part)| match name.strip_suffix(suffix) {
        Some(base) if !base.is_empty() => Some((base.len(), part)),
        _ => None,
    })
}

/// Parses an `le` bound. `+Inf` is positive infinity; NaN is rejected.
fn parse_bound(s: &str) -> Option<f64> {
    let s = s.trim();
    if s == "+Inf" {
        return Some(f64::INFINITY);
    }
    s.parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // saturating: negative and NaN become 0
fn count_from_value(value: f64) -> u64 {
    value as u64
}
