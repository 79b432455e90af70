use crate::detectors::pcg::{BeatDetectorConfig, MIN_ANALYSIS_WINDOW_S};
use crate::error::{PcgError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Rolling-window limit applied to live waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxLength {
    Unlimited,
    Seconds(f64),
}

impl MaxLength {
    pub fn seconds(&self) -> Option<f64> {
        match self {
            MaxLength::Unlimited => None,
            MaxLength::Seconds(s) => Some(*s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RrOptions {
    pub histogram_slices: usize,
    pub resample_period_s: f64,
    pub resample_count: usize,
}

impl Default for RrOptions {
    fn default() -> Self {
        Self {
            histogram_slices: 10,
            resample_period_s: 0.469,
            resample_count: 256,
        }
    }
}

/// Maternal/fetal component separation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationOptions {
    pub enabled: bool,
    pub maternal_window: usize,
    pub fetal_cutoff_hz: f64,
}

impl Default for SeparationOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            maternal_window: 15,
            fetal_cutoff_hz: 60.0,
        }
    }
}

/// Flat set of analysis options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcgOptions {
    /// Capture device frame rate (Hz).
    pub sample_rate_hz: f64,
    /// Capture frames averaged into one waveform sample.
    pub frames_per_sample: usize,
    /// Compute ticks per second.
    pub refresh_rate_hz: f64,
    pub max_length: MaxLength,
    pub detector: BeatDetectorConfig,
    pub rr: RrOptions,
    pub separation: SeparationOptions,
}

impl Default for PcgOptions {
    fn default() -> Self {
        Self {
            sample_rate_hz: 11025.0,
            frames_per_sample: 44,
            refresh_rate_hz: 60.0,
            max_length: MaxLength::Seconds(60.0),
            detector: BeatDetectorConfig::default(),
            rr: RrOptions::default(),
            separation: SeparationOptions::default(),
        }
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PcgError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn at_least_one(name: &str, value: usize) -> Result<()> {
    if value >= 1 {
        Ok(())
    } else {
        Err(PcgError::InvalidConfig(format!("{name} must be at least 1")))
    }
}

impl PcgOptions {
    /// Options for an already-decimated waveform sampled at `rate_hz`.
    pub fn for_waveform_rate(rate_hz: f64) -> Self {
        Self {
            sample_rate_hz: rate_hz,
            frames_per_sample: 1,
            ..Self::default()
        }
    }

    /// Spacing of waveform samples in seconds.
    pub fn waveform_dt(&self) -> f64 {
        self.frames_per_sample as f64 / self.sample_rate_hz
    }

    pub fn validate(&self) -> Result<()> {
        positive("sample_rate_hz", self.sample_rate_hz)?;
        at_least_one("frames_per_sample", self.frames_per_sample)?;
        positive("refresh_rate_hz", self.refresh_rate_hz)?;
        if let MaxLength::Seconds(s) = self.max_length {
            positive("max_length", s)?;
            if s <= MIN_ANALYSIS_WINDOW_S {
                return Err(PcgError::InvalidConfig(format!(
                    "max_length must exceed the {MIN_ANALYSIS_WINDOW_S} s analysis window, got {s}"
                )));
            }
        }
        positive("detector.rise_multiplier", self.detector.rise_multiplier)?;
        positive("detector.max_time_to_peak_s", self.detector.max_time_to_peak_s)?;
        if !(self.detector.jump_time_s >= 0.0) {
            return Err(PcgError::InvalidConfig(format!(
                "detector.jump_time_s must not be negative, got {}",
                self.detector.jump_time_s
            )));
        }
        at_least_one("rr.histogram_slices", self.rr.histogram_slices)?;
        positive("rr.resample_period_s", self.rr.resample_period_s)?;
        at_least_one("rr.resample_count", self.rr.resample_count)?;
        at_least_one("separation.maternal_window", self.separation.maternal_window)?;
        positive("separation.fetal_cutoff_hz", self.separation.fetal_cutoff_hz)?;
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let options: PcgOptions = toml::from_str(text).context("parsing options")?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read options {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}
