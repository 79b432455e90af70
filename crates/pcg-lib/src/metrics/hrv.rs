use crate::error::{PcgError, Result};
use crate::signal::EventSeries;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Successive-difference threshold for pNN50 (ms).
pub const NN50_THRESHOLD_MS: f64 = 50.0;

/// Non-spectral HRV indices of a normal R-R series. Intervals in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvIndices {
    pub n: usize,
    /// Beats per minute derived from `mean_rr`.
    pub pulse: f64,
    pub mean_rr: f64,
    pub sd_rr: f64,
    pub rmssd: f64,
    /// Percentage of successive differences larger than 50 ms.
    pub pnn50: f64,
}

impl fmt::Display for HrvIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pulse:  {:.1} BPM", self.pulse)?;
        writeln!(f, "meanRR: {:.0} ms", self.mean_rr.round())?;
        writeln!(f, "sdRR:   {:.0} ms", self.sd_rr.round())?;
        writeln!(f, "rMSSD:  {:.0} ms", self.rmssd.round())?;
        write!(f, "pNN50:  {:.1} %", self.pnn50)
    }
}

/// HRV result as published to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HrvReport {
    Available(HrvIndices),
    Unavailable { reason: String },
}

impl HrvReport {
    pub fn indices(&self) -> Option<&HrvIndices> {
        match self {
            HrvReport::Available(indices) => Some(indices),
            HrvReport::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, HrvReport::Available(_))
    }
}

impl Default for HrvReport {
    fn default() -> Self {
        HrvReport::Unavailable {
            reason: "no intervals analysed yet".into(),
        }
    }
}

impl From<Result<HrvIndices>> for HrvReport {
    fn from(result: Result<HrvIndices>) -> Self {
        match result {
            Ok(indices) => HrvReport::Available(indices),
            Err(err) => HrvReport::Unavailable {
                reason: err.to_string(),
            },
        }
    }
}

pub fn hrv_indices(normal: &EventSeries) -> Result<HrvIndices> {
    hrv_from_values(&normal.values())
}

/// Same as [`hrv_indices`] for bare interval values (ms).
pub fn hrv_from_values(rr: &[f64]) -> Result<HrvIndices> {
    let n = rr.len();
    if n <= 1 {
        return Err(PcgError::InsufficientData {
            needed: 2,
            available: n,
        });
    }
    let count = n as f64;
    let mean_rr = rr.iter().sum::<f64>() / count;
    let mean_sq = rr.iter().map(|y| y * y).sum::<f64>() / count;
    let sd_rr = (mean_sq - mean_rr * mean_rr).max(0.0).sqrt();

    let mut sum_sq_diff = 0.0;
    let mut nn50 = 0usize;
    for w in rr.windows(2) {
        let delta = w[0] - w[1];
        sum_sq_diff += delta * delta;
        if delta.abs() > NN50_THRESHOLD_MS {
            nn50 += 1;
        }
    }
    let rmssd = (sum_sq_diff / (count - 1.0)).sqrt();
    let pnn50 = 100.0 * nn50 as f64 / (count - 1.0);
    let pulse = if mean_rr > 0.0 { 60_000.0 / mean_rr } else { 0.0 };

    Ok(HrvIndices {
        n,
        pulse,
        mean_rr,
        sd_rr,
        rmssd,
        pnn50,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Point;

    fn assert_close(actual: f64, expected: f64, rel_tol: f64) {
        let tol = expected.abs().max(1.0) * rel_tol;
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn indices_for_short_series() {
        let hrv = hrv_from_values(&[700.0, 720.0, 690.0, 710.0]).unwrap();
        assert_eq!(hrv.n, 4);
        assert_close(hrv.mean_rr, 705.0, 1e-12);
        assert_close(hrv.rmssd, (1700.0f64 / 3.0).sqrt(), 1e-12);
        assert_close(hrv.pnn50, 0.0, 1e-12);
        assert_close(hrv.pulse, 60_000.0 / 705.0, 1e-12);
        assert!((hrv.pulse - 85.1).abs() < 0.05);
        // population variance: (25 + 225 + 225 + 25) / 4 = 125
        assert_close(hrv.sd_rr, 125.0f64.sqrt(), 1e-9);
    }

    #[test]
    fn pnn50_counts_strictly_larger_differences() {
        let hrv = hrv_from_values(&[800.0, 850.0, 790.0, 900.0]).unwrap();
        // |Δ| = 50, 60, 110
        assert_close(hrv.pnn50, 200.0 / 3.0, 1e-12);
    }

    #[test]
    fn constant_series_has_zero_spread() {
        let hrv = hrv_from_values(&[812.3; 6]).unwrap();
        assert!(hrv.sd_rr.is_finite());
        assert!(hrv.sd_rr < 1e-6);
        assert_eq!(hrv.rmssd, 0.0);
        assert_eq!(hrv.pnn50, 0.0);
    }

    #[test]
    fn single_interval_is_insufficient() {
        let err = hrv_from_values(&[800.0]).unwrap_err();
        assert_eq!(
            err,
            PcgError::InsufficientData {
                needed: 2,
                available: 1
            }
        );
        let report: HrvReport = hrv_indices(&EventSeries::new()).into();
        assert!(!report.is_available());
    }

    #[test]
    fn event_series_input_uses_values() {
        let normal = EventSeries::from_points(vec![
            Point::new(0.8, 800.0),
            Point::new(1.6, 800.0),
            Point::new(2.5, 900.0),
        ])
        .unwrap();
        let report: HrvReport = hrv_indices(&normal).into();
        let hrv = report.indices().copied().unwrap();
        assert_close(hrv.mean_rr, 2500.0 / 3.0, 1e-12);
        assert_close(hrv.pnn50, 50.0, 1e-12);
    }

    #[test]
    fn display_matches_panel_layout() {
        let hrv = hrv_from_values(&[700.0, 720.0, 690.0, 710.0]).unwrap();
        let text = hrv.to_string();
        assert!(text.contains("pulse:  85.1 BPM"));
        assert!(text.contains("meanRR: 705 ms"));
        assert!(text.contains("rMSSD:  24 ms"));
        assert!(text.contains("pNN50:  0.0 %"));
    }
}
