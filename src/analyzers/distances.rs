//! Distribution of stop distances around a point.

use serde::Serialize;

use super::utility::{mean, min_max, sample_stddev};

/// Histogram bucket width in meters.
pub const BUCKET_METERS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceBucket {
    pub from: f64,
    pub to: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceSummary {
    pub stops: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    /// Contiguous buckets from 0 up to the farthest stop, empty ones included.
    pub histogram: Vec<DistanceBucket>,
}

/// Summarises distances in meters. Negative or non-finite values are ignored;
/// `None` when nothing is left.
pub fn summarize_distances(distances: &[f64]) -> Option<DistanceSummary> {
    let values: Vec<f64> = distances
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .collect();
    let (min, max) = min_max(&values)?;
    let mean = mean(&values);

    let buckets = (max / BUCKET_METERS).floor() as usize + 1;
    let mut counts = vec![0usize; buckets];
    for v in &values {
        counts[(v / BUCKET_METERS).floor() as usize] += 1;
    }

    let histogram = counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| DistanceBucket {
            from: i as f64 * BUCKET_METERS,
            to: (i + 1) as f64 * BUCKET_METERS,
            count,
        })
        .collect();

    Some(DistanceSummary {
        stops: values.len(),
        mean,
        std: sample_stddev(&values, mean),
        min,
        max,
        histogram,
    })
}
