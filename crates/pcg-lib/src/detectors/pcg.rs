use crate::signal::{EventSeries, Point, UniformSeries};
use log::trace;
use serde::{Deserialize, Serialize};

/// Shortest waveform (seconds) the detector will look at.
pub const MIN_ANALYSIS_WINDOW_S: f64 = 3.0;

/// Tuning of the adaptive level-crossing beat detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatDetectorConfig {
    /// Fraction of the buffer maximum used as the crossing threshold.
    pub rise_multiplier: f64,
    /// Length of the peak search after a threshold crossing (seconds).
    pub max_time_to_peak_s: f64,
    /// Refractory skip after a detected beat (seconds).
    pub jump_time_s: f64,
}

impl Default for BeatDetectorConfig {
    fn default() -> Self {
        Self {
            rise_multiplier: 0.45,
            max_time_to_peak_s: 0.1,
            jump_time_s: 0.3,
        }
    }
}

/// Adaptive threshold plus the tuning it was derived with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatDetector {
    config: BeatDetectorConfig,
    threshold: f64,
}

impl BeatDetector {
    pub fn new(config: BeatDetectorConfig) -> Self {
        Self {
            config,
            threshold: 0.0,
        }
    }

    pub fn config(&self) -> &BeatDetectorConfig {
        &self.config
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn update_threshold(&mut self, waveform: &UniformSeries) -> f64 {
        self.threshold = update_threshold(waveform, self.config.rise_multiplier, self.threshold);
        self.threshold
    }

    pub fn detect(&self, waveform: &UniformSeries, beats: &mut EventSeries) -> usize {
        detect_beats(
            waveform,
            beats,
            self.threshold,
            self.config.max_time_to_peak_s,
            self.config.jump_time_s,
        )
    }

    pub fn reset(&mut self) {
        self.threshold = 0.0;
    }
}

/// Recompute the crossing threshold from the whole buffer.
///
/// Buffers shorter than [`MIN_ANALYSIS_WINDOW_S`] keep `previous`.
pub fn update_threshold(waveform: &UniformSeries, rise_multiplier: f64, previous: f64) -> f64 {
    if waveform.is_empty() || waveform.duration() < MIN_ANALYSIS_WINDOW_S {
        return previous;
    }
    match waveform.max() {
        Some(max) => rise_multiplier * max,
        None => previous,
    }
}

/// Scan `waveform` for new beats after the last entry of `beats`.
///
/// New beats are appended as `(time, amplitude)` of the local maximum that
/// follows each threshold crossing. Leading beats older than the first
/// waveform sample are dropped afterwards. A waveform no longer than
/// [`MIN_ANALYSIS_WINDOW_S`] leaves `beats` untouched. Returns the number
/// appended.
pub fn detect_beats(
    waveform: &UniformSeries,
    beats: &mut EventSeries,
    threshold: f64,
    max_time_to_peak: f64,
    jump_time: f64,
) -> usize {
    if !waveform.is_empty() && waveform.duration() <= MIN_ANALYSIS_WINDOW_S {
        trace!(
            "waveform too short for detection ({:.3} s)",
            waveform.duration()
        );
        return 0;
    }
    let appended = scan(waveform, beats, threshold, max_time_to_peak, jump_time);
    if let Some(first) = waveform.first_time() {
        let dropped = beats.trim_before(first);
        if dropped > 0 {
            trace!("dropped {dropped} beats older than the waveform window");
        }
    }
    appended
}

fn scan(
    waveform: &UniformSeries,
    beats: &mut EventSeries,
    threshold: f64,
    max_time_to_peak: f64,
    jump_time: f64,
) -> usize {
    let dt = waveform.dt;
    let jump = ((jump_time / dt).round() as i64 - 1).max(0);
    let peak_window = (max_time_to_peak / dt).round().max(0.0) as usize;

    let start = match beats.last() {
        None => 0,
        Some(last) => (waveform.index_at(last.x) + 1 + jump).max(0) as usize,
    };
    let len = waveform.len();
    if len.saturating_sub(start) <= peak_window {
        trace!("not enough samples after index {start} for a peak search");
        return 0;
    }

    let data = waveform.as_slice();
    let mut appended = 0;
    let mut index = start;
    while index < len {
        if data[index] >= threshold {
            if len - index <= peak_window {
                // Crossing too close to the end; it is rescanned next pass.
                break;
            }
            let mut peak = index;
            for candidate in index..=index + peak_window {
                if data[candidate] > data[peak] {
                    peak = candidate;
                }
            }
            let point = Point::new(waveform.time_at(peak), data[peak]);
            if beats.push(point).is_err() {
                break;
            }
            appended += 1;
            index = peak + jump as usize;
        }
        index += 1;
    }
    appended
}

/// One-shot threshold and detection over a finished recording.
pub fn detect_recording(waveform: &UniformSeries, config: &BeatDetectorConfig) -> EventSeries {
    let mut detector = BeatDetector::new(*config);
    detector.update_threshold(waveform);
    let mut beats = EventSeries::new();
    detector.detect(waveform, &mut beats);
    beats
}
