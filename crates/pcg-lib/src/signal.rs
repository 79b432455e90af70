use crate::error::{PcgError, Result};
use serde::{Deserialize, Serialize};

/// A single `(time, value)` sample of an irregular series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Value of the straight line through `a` and `b` evaluated at `x`.
    pub fn lerp(a: &Point, b: &Point, x: f64) -> f64 {
        let span = b.x - a.x;
        if span == 0.0 {
            return a.y;
        }
        a.y + (b.y - a.y) * (x - a.x) / span
    }
}

/// Uniformly sampled series: sample `i` sits at `start_time + i * dt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformSeries {
    /// Sample spacing in seconds
    pub dt: f64,
    /// Time of the first sample in seconds
    pub start_time: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl UniformSeries {
    pub fn new(dt: f64) -> Self {
        Self::with_start(dt, 0.0)
    }

    pub fn with_start(dt: f64, start_time: f64) -> Self {
        Self {
            dt,
            start_time,
            data: Vec::new(),
        }
    }

    pub fn from_samples(dt: f64, data: Vec<f64>) -> Self {
        Self {
            dt,
            start_time: 0.0,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `(time, value)` pairs.
    pub fn pairs(&self) -> Vec<[f64; 2]> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, &v)| [self.time_at(i), v])
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Covered time span in seconds (`len * dt`).
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 * self.dt
    }

    pub fn sample_rate(&self) -> f64 {
        1.0 / self.dt
    }

    pub fn time_at(&self, index: usize) -> f64 {
        self.start_time + index as f64 * self.dt
    }

    /// Nearest sample index for time `t`; may be negative or past the end.
    pub fn index_at(&self, t: f64) -> i64 {
        ((t - self.start_time) / self.dt).round() as i64
    }

    pub fn first_time(&self) -> Option<f64> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.start_time)
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.data.get(index).copied()
    }

    pub fn push(&mut self, sample: f64) {
        self.data.push(sample);
    }

    pub fn extend(&mut self, samples: &[f64]) {
        self.data.extend_from_slice(samples);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied()
    }

    pub fn min(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Drop the `n` oldest samples, shifting `start_time` forward.
    pub fn trim_front(&mut self, n: usize) {
        let n = n.min(self.data.len());
        if n == 0 {
            return;
        }
        self.data.drain(..n);
        self.start_time += n as f64 * self.dt;
    }

    /// Keep at most `max_s` seconds of the most recent samples. Returns the
    /// number of samples removed.
    pub fn trim_to_duration(&mut self, max_s: f64) -> usize {
        let keep = (max_s / self.dt).floor().max(0.0) as usize;
        let excess = self.data.len().saturating_sub(keep);
        self.trim_front(excess);
        excess
    }
}

/// Irregular `(time, value)` series with strictly increasing times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSeries {
    pub points: Vec<Point>,
}

impl EventSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from points that are already in strictly increasing time order.
    pub fn from_points(points: Vec<Point>) -> Result<Self> {
        let mut series = Self::new();
        for p in points {
            series.push(p)?;
        }
        Ok(series)
    }

    /// Append at the tail; the new point must be later than the current last one.
    pub fn push(&mut self, point: Point) -> Result<()> {
        if let Some(last) = self.points.last() {
            if point.x <= last.x {
                return Err(PcgError::NonMonotonic {
                    previous: last.x,
                    next: point.x,
                });
            }
        }
        self.points.push(point);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&Point> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn pairs(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(|p| [p.x, p.y]).collect()
    }

    pub fn min(&self) -> Option<f64> {
        self.points.iter().map(|p| p.y).reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.points.iter().map(|p| p.y).reduce(f64::max)
    }

    /// Remove leading points earlier than `t`. Returns how many were removed.
    pub fn trim_before(&mut self, t: f64) -> usize {
        let cut = self.points.partition_point(|p| p.x < t);
        self.points.drain(..cut);
        cut
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Either representation, behind one set of queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Series {
    Uniform(UniformSeries),
    Events(EventSeries),
}

impl Series {
    pub fn len(&self) -> usize {
        match self {
            Series::Uniform(s) => s.len(),
            Series::Events(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            Series::Uniform(s) => s.min(),
            Series::Events(s) => s.min(),
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            Series::Uniform(s) => s.max(),
            Series::Events(s) => s.max(),
        }
    }

    /// `(time, value)` pairs in time order.
    pub fn points(&self) -> Vec<[f64; 2]> {
        match self {
            Series::Uniform(s) => s.pairs(),
            Series::Events(s) => s.pairs(),
        }
    }
}

impl From<UniformSeries> for Series {
    fn from(series: UniformSeries) -> Self {
        Series::Uniform(series)
    }
}

impl From<EventSeries> for Series {
    fn from(series: EventSeries) -> Self {
        Series::Events(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_front_moves_start_time() {
        let mut ts = UniformSeries::from_samples(0.5, vec![1.0, 2.0, 3.0, 4.0]);
        ts.trim_front(3);
        assert_eq!(ts.data, vec![4.0]);
        assert!((ts.start_time - 1.5).abs() < 1e-12);
        assert!((ts.time_at(0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn trim_to_duration_keeps_recent_samples() {
        let mut ts = UniformSeries::from_samples(0.25, (0..20).map(|i| i as f64).collect());
        let removed = ts.trim_to_duration(2.0);
        assert_eq!(removed, 12);
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.data[0], 12.0);
        assert!((ts.start_time - 3.0).abs() < 1e-12);
    }

    #[test]
    fn event_series_rejects_out_of_order_points() {
        let mut ev = EventSeries::new();
        ev.push(Point::new(1.0, 5.0)).unwrap();
        let err = ev.push(Point::new(1.0, 6.0)).unwrap_err();
        assert!(matches!(err, PcgError::NonMonotonic { .. }));
        assert_eq!(ev.len(), 1);
    }

    #[test]
    fn trim_before_drops_leading_points() {
        let mut ev = EventSeries::from_points(vec![
            Point::new(0.5, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.5, 1.0),
        ])
        .unwrap();
        assert_eq!(ev.trim_before(1.0), 1);
        assert_eq!(ev.times(), vec![1.0, 1.5]);
    }

    #[test]
    fn series_queries_dispatch_to_both_representations() {
        let uniform: Series = UniformSeries::from_samples(1.0, vec![3.0, -1.0, 2.0]).into();
        assert_eq!(uniform.min(), Some(-1.0));
        assert_eq!(uniform.max(), Some(3.0));
        assert_eq!(uniform.points()[2], [2.0, 2.0]);

        let events: Series = EventSeries::from_points(vec![Point::new(0.1, 7.0)])
            .unwrap()
            .into();
        assert_eq!(events.len(), 1);
        assert_eq!(events.max(), Some(7.0));
        assert!(!events.is_empty());
        assert_eq!(events.points(), vec![[0.1, 7.0]]);
    }

    #[test]
    fn uniform_pairs_follow_start_time() {
        let ts = UniformSeries {
            dt: 0.5,
            start_time: 2.0,
            data: vec![1.0, -1.0],
        };
        assert_eq!(ts.pairs(), vec![[2.0, 1.0], [2.5, -1.0]]);
    }

    #[test]
    fn lerp_interpolates_in_time() {
        let a = Point::new(1.0, 800.0);
        let b = Point::new(3.0, 820.0);
        assert!((Point::lerp(&a, &b, 2.0) - 810.0).abs() < 1e-12);
    }
}
