use crate::signal::{EventSeries, Point, UniformSeries};
use log::trace;

/// Ratio above which an interval counts as ectopic relative to its predecessor.
pub const ECTOPIC_UPPER_RATIO: f64 = 1.5;
/// Ratio below which an interval counts as ectopic relative to its predecessor.
pub const ECTOPIC_LOWER_RATIO: f64 = 0.5;

/// R-R intervals in milliseconds, stamped with the time of the closing beat.
pub fn derive_intervals(beats: &EventSeries) -> EventSeries {
    let points = beats
        .points
        .windows(2)
        .map(|w| Point::new(w[1].x, 1000.0 * (w[1].x - w[0].x)))
        .collect();
    EventSeries { points }
}

fn is_ectopic(value: f64, reference: f64) -> bool {
    value > ECTOPIC_UPPER_RATIO * reference || value < ECTOPIC_LOWER_RATIO * reference
}

/// Replace ectopic intervals.
///
/// Each interval is compared with the previous *input* interval. Interior
/// outliers are interpolated in time between their neighbours. An outlying
/// final interval takes the value of the one before it. The first interval is
/// never tested.
pub fn correct_ectopic(rr: &EventSeries) -> EventSeries {
    let input = &rr.points;
    if input.len() < 2 {
        return EventSeries::new();
    }
    let mut out = Vec::with_capacity(input.len());
    out.push(input[0]);
    for w in input.windows(3) {
        let (prev, cur, next) = (&w[0], &w[1], &w[2]);
        if is_ectopic(cur.y, prev.y) {
            out.push(Point::new(cur.x, Point::lerp(prev, next, cur.x)));
        } else {
            out.push(*cur);
        }
    }
    let last = input[input.len() - 1];
    let before_last = input[input.len() - 2];
    if is_ectopic(last.y, before_last.y) {
        out.push(Point::new(last.x, before_last.y));
    } else {
        out.push(last);
    }
    EventSeries { points: out }
}

/// Put the irregular series on a grid of `count` points spaced `period`
/// seconds apart, starting at the first input time.
///
/// Values are linearly interpolated; grid times outside the data span take
/// the nearest end value.
pub fn resample(normal: &EventSeries, period: f64, count: usize) -> UniformSeries {
    let points = &normal.points;
    let Some(first) = points.first() else {
        return UniformSeries::new(period);
    };
    let mut out = UniformSeries::with_start(period, first.x);
    out.data.reserve(count);
    let mut seg = 0;
    for i in 0..count {
        let t = first.x + i as f64 * period;
        while seg + 1 < points.len() && points[seg + 1].x < t {
            seg += 1;
        }
        let value = if t <= points[0].x {
            points[0].y
        } else if seg + 1 >= points.len() {
            points[points.len() - 1].y
        } else {
            Point::lerp(&points[seg], &points[seg + 1], t)
        };
        out.push(value);
    }
    out
}

/// Histogram of interval values over `slices` equal-width bins.
///
/// Bin 0 is closed on both ends; later bins are open below. The last bin
/// closes at the series maximum. Each point of the result is
/// `(bin centre, count)`.
pub fn histogram(rr: &EventSeries, slices: usize) -> EventSeries {
    let (Some(min), Some(max)) = (rr.min(), rr.max()) else {
        return EventSeries::new();
    };
    if slices == 0 {
        return EventSeries::new();
    }
    let resolution = (max - min) / slices as f64;
    let mut points = Vec::with_capacity(slices);
    for i in 0..slices {
        let lower = min + i as f64 * resolution;
        let upper = if i + 1 == slices {
            max
        } else {
            min + (i + 1) as f64 * resolution
        };
        let count = rr
            .iter()
            .filter(|p| {
                if i == 0 {
                    min <= p.y && p.y <= upper
                } else {
                    lower < p.y && p.y <= upper
                }
            })
            .count();
        points.push(Point::new(lower + resolution / 2.0, count as f64));
    }
    EventSeries { points }
}

/// Instantaneous heart rate for every interval.
pub fn beats_per_minute(rr: &EventSeries) -> EventSeries {
    let points = rr
        .iter()
        .filter_map(|p| {
            let bpm = 60_000.0 / p.y;
            if p.y == 0.0 || !bpm.is_finite() {
                trace!("skipping degenerate interval {} at {}", p.y, p.x);
                None
            } else {
                Some(Point::new(p.x, bpm))
            }
        })
        .collect();
    EventSeries { points }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(f64, f64)]) -> EventSeries {
        EventSeries::from_points(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
            .expect("increasing times")
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn intervals_from_beats() {
        let beats = series(&[(0.0, 1.0), (0.8, 1.0), (1.6, 1.0), (2.5, 1.0)]);
        let rr = derive_intervals(&beats);
        assert_eq!(rr.len(), 3);
        assert_eq!(rr.times(), vec![0.8, 1.6, 2.5]);
        let expected = [800.0, 800.0, 900.0];
        for (p, e) in rr.iter().zip(expected) {
            assert_close(p.y, e, 1e-9);
        }
    }

    #[test]
    fn intervals_need_two_beats() {
        assert!(derive_intervals(&EventSeries::new()).is_empty());
        assert!(derive_intervals(&series(&[(1.0, 1.0)])).is_empty());
    }

    #[test]
    fn interior_ectopic_is_interpolated() {
        let rr = series(&[(1.0, 800.0), (2.0, 1600.0), (3.0, 820.0)]);
        let normal = correct_ectopic(&rr);
        assert_eq!(normal.times(), vec![1.0, 2.0, 3.0]);
        assert_close(normal.points[1].y, 810.0, 1e-9);
        assert_eq!(normal.points[0], rr.points[0]);
        assert_eq!(normal.points[2], rr.points[2]);
    }

    #[test]
    fn short_interval_is_interpolated_in_time() {
        let rr = series(&[(1.0, 800.0), (1.3, 300.0), (2.0, 900.0), (2.9, 880.0)]);
        let normal = correct_ectopic(&rr);
        // 800 + (900 - 800) * 0.3
        assert_close(normal.points[1].y, 830.0, 1e-9);
        // compared against the uncorrected 300, so 900 is flagged too
        assert_close(normal.points[2].y, Point::lerp(&rr.points[1], &rr.points[3], 2.0), 1e-9);
    }

    #[test]
    fn ectopic_last_point_keeps_its_time() {
        let rr = series(&[(1.0, 800.0), (2.0, 810.0), (3.0, 2000.0)]);
        let normal = correct_ectopic(&rr);
        assert_eq!(normal.times(), vec![1.0, 2.0, 3.0]);
        assert_close(normal.points[2].y, 810.0, 1e-9);
    }

    #[test]
    fn ectopic_needs_two_points() {
        assert!(correct_ectopic(&series(&[(1.0, 800.0)])).is_empty());
        let two = correct_ectopic(&series(&[(1.0, 800.0), (2.0, 300.0)]));
        assert_eq!(two.values(), vec![800.0, 800.0]);
    }

    #[test]
    fn correction_is_idempotent() {
        let rr = series(&[
            (0.8, 800.0),
            (1.6, 1600.0),
            (2.4, 820.0),
            (3.2, 790.0),
            (3.5, 300.0),
            (4.3, 805.0),
            (5.1, 800.0),
        ]);
        let once = correct_ectopic(&rr);
        let twice = correct_ectopic(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn resample_interpolates_and_clamps() {
        let normal = series(&[(1.0, 800.0), (2.0, 900.0), (3.0, 700.0)]);
        let grid = resample(&normal, 0.5, 7);
        assert_eq!(grid.len(), 7);
        assert_eq!(grid.start_time, 1.0);
        assert_eq!(grid.dt, 0.5);
        let expected = [800.0, 850.0, 900.0, 800.0, 700.0, 700.0, 700.0];
        for (v, e) in grid.iter().zip(expected) {
            assert_close(v, e, 1e-9);
        }
        assert!(resample(&EventSeries::new(), 0.5, 4).is_empty());
    }

    #[test]
    fn histogram_bins_cover_range() {
        let rr = series(&[
            (1.0, 700.0),
            (2.0, 720.0),
            (3.0, 750.0),
            (4.0, 760.0),
            (5.0, 800.0),
        ]);
        let hist = histogram(&rr, 4);
        assert_eq!(hist.len(), 4);
        assert_eq!(hist.values(), vec![2.0, 1.0, 1.0, 1.0]);
        assert_close(hist.points[0].x, 712.5, 1e-9);
        assert_close(hist.points[3].x, 787.5, 1e-9);
        let total: f64 = hist.values().iter().sum();
        assert_eq!(total as usize, rr.len());
    }

    #[test]
    fn histogram_keeps_maximum_with_uneven_edges() {
        let rr = series(&[(1.0, 330.535033192153), (2.0, 949.6949673521959)]);
        let hist = histogram(&rr, 3);
        assert_eq!(hist.values(), vec![1.0, 0.0, 1.0]);

        let rr = series(&[
            (0.8, 812.3456789),
            (1.6, 797.1234567),
            (2.4, 833.9876543),
            (3.2, 771.0000001),
            (4.0, 845.4321098),
        ]);
        for slices in 1..=12 {
            let total: f64 = histogram(&rr, slices).values().iter().sum();
            assert_eq!(total as usize, rr.len(), "{slices} slices");
        }
    }

    #[test]
    fn histogram_of_constant_series() {
        let rr = series(&[(1.0, 800.0), (2.0, 800.0), (3.0, 800.0)]);
        let hist = histogram(&rr, 3);
        assert_eq!(hist.values(), vec![3.0, 0.0, 0.0]);
        assert!(histogram(&EventSeries::new(), 10).is_empty());
    }

    #[test]
    fn bpm_skips_zero_intervals() {
        let rr = EventSeries {
            points: vec![Point::new(1.0, 800.0), Point::new(2.0, 0.0), Point::new(3.0, 1000.0)],
        };
        let bpm = beats_per_minute(&rr);
        assert_eq!(bpm.times(), vec![1.0, 3.0]);
        assert_close(bpm.points[0].y, 75.0, 1e-9);
        assert_close(bpm.points[1].y, 60.0, 1e-9);
    }
}
