use crate::config::PcgOptions;
use crate::detectors::pcg::BeatDetector;
use crate::error::Result;
use crate::metrics::{
    hrv::{hrv_indices, HrvReport},
    rr::{beats_per_minute, correct_ectopic, derive_intervals, histogram, resample},
};
use crate::signal::{EventSeries, UniformSeries};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Which sound a [`Phonocardiogram`] analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Original,
    Maternal,
    Fetal,
}

impl SoundKind {
    pub fn title(&self) -> &'static str {
        match self {
            SoundKind::Original => "Heart sound",
            SoundKind::Maternal => "Maternal heart sound",
            SoundKind::Fetal => "Fetal heart sound",
        }
    }
}

/// Read-only copy of every series of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcgSnapshot {
    pub kind: SoundKind,
    pub replay: bool,
    pub threshold: f64,
    pub waveform: UniformSeries,
    pub beats: EventSeries,
    pub rr: EventSeries,
    pub normal_rr: EventSeries,
    pub resampled_rr: UniformSeries,
    pub histogram: EventSeries,
    pub bpm: EventSeries,
    pub hrv: HrvReport,
}

/// What a single [`Phonocardiogram::run_pass`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub new_beats: usize,
    pub beats: usize,
    pub intervals: usize,
}

/// Owns the waveform of one heart sound and every series derived from it.
#[derive(Debug, Clone)]
pub struct Phonocardiogram {
    kind: SoundKind,
    options: PcgOptions,
    detector: BeatDetector,
    replay: bool,
    waveform: UniformSeries,
    beats: EventSeries,
    rr: EventSeries,
    normal_rr: EventSeries,
    resampled_rr: UniformSeries,
    histogram: EventSeries,
    bpm: EventSeries,
    hrv: HrvReport,
}

impl Phonocardiogram {
    pub fn new(kind: SoundKind, options: PcgOptions) -> Result<Self> {
        options.validate()?;
        let dt = options.waveform_dt();
        Ok(Self {
            kind,
            detector: BeatDetector::new(options.detector),
            replay: false,
            waveform: UniformSeries::new(dt),
            beats: EventSeries::new(),
            rr: EventSeries::new(),
            normal_rr: EventSeries::new(),
            resampled_rr: UniformSeries::new(options.rr.resample_period_s),
            histogram: EventSeries::new(),
            bpm: EventSeries::new(),
            hrv: HrvReport::default(),
            options,
        })
    }

    pub fn kind(&self) -> SoundKind {
        self.kind
    }

    pub fn options(&self) -> &PcgOptions {
        &self.options
    }

    pub fn is_replay(&self) -> bool {
        self.replay
    }

    pub fn threshold(&self) -> f64 {
        self.detector.threshold()
    }

    pub fn waveform(&self) -> &UniformSeries {
        &self.waveform
    }

    pub fn beats(&self) -> &EventSeries {
        &self.beats
    }

    pub fn rr(&self) -> &EventSeries {
        &self.rr
    }

    pub fn normal_rr(&self) -> &EventSeries {
        &self.normal_rr
    }

    pub fn resampled_rr(&self) -> &UniformSeries {
        &self.resampled_rr
    }

    pub fn histogram(&self) -> &EventSeries {
        &self.histogram
    }

    pub fn bpm(&self) -> &EventSeries {
        &self.bpm
    }

    pub fn hrv(&self) -> &HrvReport {
        &self.hrv
    }

    /// Append live samples and apply the rolling window. Returns the number
    /// of samples dropped from the front.
    pub fn ingest(&mut self, samples: &[f64]) -> usize {
        self.waveform.extend(samples);
        self.manage_length()
    }

    /// Replace the waveform with a finished recording and switch to replay,
    /// which disables the rolling window.
    pub fn load_recording(&mut self, samples: Vec<f64>) {
        self.reset();
        self.waveform = UniformSeries::from_samples(self.options.waveform_dt(), samples);
        self.replay = true;
    }

    /// Swap in a waveform derived elsewhere (e.g. a filtered component).
    pub fn replace_waveform(&mut self, waveform: UniformSeries) {
        self.waveform = waveform;
    }

    pub fn set_replay(&mut self, replay: bool) {
        self.replay = replay;
    }

    fn manage_length(&mut self) -> usize {
        if self.replay {
            return 0;
        }
        match self.options.max_length.seconds() {
            Some(max) => self.waveform.trim_to_duration(max),
            None => 0,
        }
    }

    /// One full recompute, upstream to downstream.
    ///
    /// Stages whose input is empty keep their previous output. In replay mode
    /// the HRV indices are refreshed as part of the pass.
    pub fn run_pass(&mut self) -> PassSummary {
        self.detector.update_threshold(&self.waveform);
        let new_beats = self.detector.detect(&self.waveform, &mut self.beats);
        if new_beats > 0 {
            debug!(
                "{}: {} new beats (total {}, threshold {:.4})",
                self.kind.title(),
                new_beats,
                self.beats.len(),
                self.detector.threshold()
            );
        }

        if self.beats.is_empty() {
            trace!("no beats yet, skipping interval stages");
        } else {
            self.rr = derive_intervals(&self.beats);
        }

        if self.rr.len() < 2 {
            trace!("{} intervals, skipping ectopic correction", self.rr.len());
        } else {
            self.normal_rr = correct_ectopic(&self.rr);
        }

        if !self.normal_rr.is_empty() {
            let rr_opts = self.options.rr;
            self.resampled_rr = resample(
                &self.normal_rr,
                rr_opts.resample_period_s,
                rr_opts.resample_count,
            );
            self.histogram = histogram(&self.normal_rr, rr_opts.histogram_slices);
            self.bpm = beats_per_minute(&self.normal_rr);
        }

        if self.replay {
            self.refresh_indices();
        }

        PassSummary {
            new_beats,
            beats: self.beats.len(),
            intervals: self.rr.len(),
        }
    }

    pub fn refresh_indices(&mut self) -> &HrvReport {
        self.hrv = hrv_indices(&self.normal_rr).into();
        &self.hrv
    }

    /// Clear every series and the adaptive threshold.
    pub fn reset(&mut self) {
        self.waveform = UniformSeries::new(self.options.waveform_dt());
        self.beats.clear();
        self.rr.clear();
        self.normal_rr.clear();
        self.resampled_rr = UniformSeries::new(self.options.rr.resample_period_s);
        self.histogram.clear();
        self.bpm.clear();
        self.hrv = HrvReport::default();
        self.detector.reset();
    }

    pub fn snapshot(&self) -> PcgSnapshot {
        PcgSnapshot {
            kind: self.kind,
            replay: self.replay,
            threshold: self.detector.threshold(),
            waveform: self.waveform.clone(),
            beats: self.beats.clone(),
            rr: self.rr.clone(),
            normal_rr: self.normal_rr.clone(),
            resampled_rr: self.resampled_rr.clone(),
            histogram: self.histogram.clone(),
            bpm: self.bpm.clone(),
            hrv: self.hrv.clone(),
        }
    }
}

/// Load `samples` as a recording and run a single replay pass.
pub fn analyze_recording(options: PcgOptions, samples: Vec<f64>) -> Result<PcgSnapshot> {
    let mut pcg = Phonocardiogram::new(SoundKind::Original, options)?;
    pcg.load_recording(samples);
    pcg.run_pass();
    Ok(pcg.snapshot())
}
