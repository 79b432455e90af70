//! Causal sample-by-sample filters used to split a heart-sound recording
//! into its maternal (low-frequency) and fetal (high-frequency) components.

use crate::error::{PcgError, Result};
use crate::signal::UniformSeries;
use std::collections::VecDeque;
use std::f64::consts::PI;

/// A filter that consumes one sample and yields one output sample.
pub trait SampleFilter {
    fn next(&mut self, sample: f64) -> f64;
    fn reset(&mut self);
}

/// Arithmetic mean over the last `window` inputs.
///
/// Before `window` samples have been seen the output is the mean of every
/// sample seen so far.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    buffer: VecDeque<f64>,
    sum: f64,
}

impl MovingAverage {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(PcgError::InvalidConfig(
                "moving average window must be at least 1".into(),
            ));
        }
        Ok(Self {
            window,
            buffer: VecDeque::with_capacity(window),
            sum: 0.0,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl SampleFilter for MovingAverage {
    fn next(&mut self, sample: f64) -> f64 {
        self.buffer.push_back(sample);
        self.sum += sample;
        if self.buffer.len() > self.window {
            if let Some(old) = self.buffer.pop_front() {
                self.sum -= old;
            }
        }
        self.sum / self.buffer.len() as f64
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sum = 0.0;
    }
}

/// Previous input and output of a single-pole high-pass section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HighPassState {
    pub prev_input: f64,
    pub prev_output: f64,
}

impl HighPassState {
    /// `y[n] = alpha * (y[n-1] + x[n] - x[n-1])`
    pub fn advance(self, alpha: f64, input: f64) -> (HighPassState, f64) {
        let output = alpha * (self.prev_output + input - self.prev_input);
        (
            HighPassState {
                prev_input: input,
                prev_output: output,
            },
            output,
        )
    }
}

/// Single-pole RC high-pass filter.
#[derive(Debug, Clone, Copy)]
pub struct HighPassFilter {
    alpha: f64,
    state: HighPassState,
}

impl HighPassFilter {
    pub fn new(sample_rate: f64, cutoff_hz: f64) -> Result<Self> {
        if !(sample_rate > 0.0) {
            return Err(PcgError::InvalidConfig(format!(
                "high-pass sample rate must be positive, got {sample_rate}"
            )));
        }
        if !(cutoff_hz > 0.0) {
            return Err(PcgError::InvalidConfig(format!(
                "high-pass cutoff must be positive, got {cutoff_hz}"
            )));
        }
        let dt = 1.0 / sample_rate;
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        Ok(Self {
            alpha: rc / (rc + dt),
            state: HighPassState::default(),
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn state(&self) -> HighPassState {
        self.state
    }
}

impl SampleFilter for HighPassFilter {
    fn next(&mut self, sample: f64) -> f64 {
        let (state, output) = self.state.advance(self.alpha, sample);
        self.state = state;
        output
    }

    fn reset(&mut self) {
        self.state = HighPassState::default();
    }
}

/// Run every sample of `input` through `filter`, keeping the time base.
pub fn apply_filter<F: SampleFilter>(input: &UniformSeries, filter: &mut F) -> UniformSeries {
    let mut out = UniformSeries::with_start(input.dt, input.start_time);
    out.data.reserve(input.len());
    for sample in input.iter() {
        out.push(filter.next(sample));
    }
    out
}

/// Low-frequency (maternal) estimate: moving average of the raw sound.
pub fn maternal_heart_sound(heart_sound: &UniformSeries, window: usize) -> Result<UniformSeries> {
    let mut filter = MovingAverage::new(window)?;
    Ok(apply_filter(heart_sound, &mut filter))
}

/// High-frequency (fetal) estimate: high-pass of the sign-inverted raw sound.
pub fn fetal_heart_sound(heart_sound: &UniformSeries, cutoff_hz: f64) -> Result<UniformSeries> {
    let mut filter = HighPassFilter::new(heart_sound.sample_rate(), cutoff_hz)?;
    let mut out = UniformSeries::with_start(heart_sound.dt, heart_sound.start_time);
    out.data.reserve(heart_sound.len());
    for sample in heart_sound.iter() {
        out.push(filter.next(-sample));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_warms_up_then_slides() {
        let mut ma = MovingAverage::new(3).unwrap();
        assert_eq!(ma.next(3.0), 3.0);
        assert_eq!(ma.next(6.0), 4.5);
        assert_eq!(ma.next(9.0), 6.0);
        assert_eq!(ma.next(12.0), 9.0);
        ma.reset();
        assert_eq!(ma.next(1.0), 1.0);
    }

    #[test]
    fn moving_average_rejects_zero_window() {
        assert!(matches!(
            MovingAverage::new(0),
            Err(PcgError::InvalidConfig(_))
        ));
    }

    #[test]
    fn high_pass_coefficient_matches_rc_formula() {
        let hp = HighPassFilter::new(250.0, 60.0).unwrap();
        let rc = 1.0 / (2.0 * PI * 60.0);
        let expected = rc / (rc + 1.0 / 250.0);
        assert!((hp.alpha() - expected).abs() < 1e-12);
    }

    #[test]
    fn high_pass_step_response_decays() {
        let mut hp = HighPassFilter::new(1000.0, 5.0).unwrap();
        let first = hp.next(1.0);
        assert!((first - hp.alpha()).abs() < 1e-12);
        let mut last = first;
        for _ in 0..2000 {
            last = hp.next(1.0);
        }
        assert!(last.abs() < 1e-3, "DC should be rejected, got {last}");
    }

    #[test]
    fn high_pass_state_transition_is_pure() {
        let state = HighPassState::default();
        let (next, y) = state.advance(0.5, 2.0);
        assert_eq!(y, 1.0);
        assert_eq!(next.prev_input, 2.0);
        assert_eq!(next.prev_output, 1.0);
        assert_eq!(state, HighPassState::default());
    }

    #[test]
    fn high_pass_rejects_bad_parameters() {
        assert!(HighPassFilter::new(0.0, 10.0).is_err());
        assert!(HighPassFilter::new(100.0, -1.0).is_err());
    }

    #[test]
    fn component_transforms_keep_time_base() {
        let mut raw = UniformSeries::with_start(0.004, 12.0);
        raw.extend(&[1.0, -2.0, 3.0, 0.5]);

        let maternal = maternal_heart_sound(&raw, 2).unwrap();
        assert_eq!(maternal.dt, raw.dt);
        assert_eq!(maternal.start_time, raw.start_time);
        assert_eq!(maternal.data, vec![1.0, -0.5, 0.5, 1.75]);

        let fetal = fetal_heart_sound(&raw, 60.0).unwrap();
        assert_eq!(fetal.len(), raw.len());
        assert_eq!(fetal.start_time, 12.0);
        let alpha = HighPassFilter::new(250.0, 60.0).unwrap().alpha();
        assert!((fetal.data[0] - alpha * -1.0).abs() < 1e-9);
    }
}
