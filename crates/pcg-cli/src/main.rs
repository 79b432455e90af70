use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{debug, info, warn};
use pcg_lib::{
    config::PcgOptions,
    detectors::pcg::detect_recording,
    filters::{fetal_heart_sound, maternal_heart_sound},
    ingest::BlockAverager,
    io::{export, text as text_io},
    metrics::{
        hrv::{hrv_indices, HrvReport},
        rr::correct_ectopic,
    },
    monitor::{MonitorCommand, PcgMonitor},
    pipeline::{analyze_recording, PcgSnapshot, SoundKind},
    plot::{snapshot_figure, Figure, SnapshotView, TraceKind},
    signal::{EventSeries, Point, Series, UniformSeries},
    synth::SyntheticRecording,
};
use plotters::prelude::*;
use serde::Serialize;
use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

#[derive(Parser)]
#[command(
    name = "pcg",
    version,
    about = "Phonocardiogram beat detection, R-R statistics and HRV"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

/// Input and option overrides shared by every waveform command.
#[derive(Args, Clone, Debug)]
struct AnalysisArgs {
    /// Newline-delimited samples; read from stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,
    /// TOML options file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Rate of the input samples in Hz
    #[arg(long)]
    sample_rate: Option<f64>,
    /// Input samples averaged into one waveform sample
    #[arg(long)]
    frames_per_sample: Option<usize>,
    #[arg(long)]
    rise_multiplier: Option<f64>,
    #[arg(long)]
    max_time_to_peak: Option<f64>,
    #[arg(long)]
    jump_time: Option<f64>,
}

const DEFAULT_INPUT_RATE_HZ: f64 = 250.0;

impl AnalysisArgs {
    fn options(&self) -> Result<PcgOptions> {
        let mut options = match &self.config {
            Some(path) => PcgOptions::load(path)?,
            None => PcgOptions::for_waveform_rate(DEFAULT_INPUT_RATE_HZ),
        };
        if let Some(rate) = self.sample_rate {
            options.sample_rate_hz = rate;
        }
        if let Some(frames) = self.frames_per_sample {
            options.frames_per_sample = frames;
        }
        if let Some(rise) = self.rise_multiplier {
            options.detector.rise_multiplier = rise;
        }
        if let Some(peak) = self.max_time_to_peak {
            options.detector.max_time_to_peak_s = peak;
        }
        if let Some(jump) = self.jump_time {
            options.detector.jump_time_s = jump;
        }
        options.validate()?;
        Ok(options)
    }

    /// Samples at the waveform rate, block-averaged when the options ask for it.
    fn waveform_samples(&self, options: &PcgOptions) -> Result<Vec<f64>> {
        let frames = read_samples(self.input.as_deref())?;
        if options.frames_per_sample == 1 {
            return Ok(frames);
        }
        let mut averager = BlockAverager::new(options.frames_per_sample, false);
        let samples = averager.push(&frames);
        debug!(
            "averaged {} frames into {} samples ({} left over)",
            frames.len(),
            samples.len(),
            averager.pending()
        );
        if samples.is_empty() {
            bail!(
                "input holds fewer than {} frames",
                options.frames_per_sample
            );
        }
        Ok(samples)
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Component {
    Maternal,
    Fetal,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PlotSeries {
    Waveform,
    Beats,
    Rr,
    Normal,
    Bpm,
    Histogram,
}

impl From<PlotSeries> for SnapshotView {
    fn from(series: PlotSeries) -> Self {
        match series {
            PlotSeries::Waveform => SnapshotView::Waveform,
            PlotSeries::Beats => SnapshotView::Beats,
            PlotSeries::Rr => SnapshotView::Rr,
            PlotSeries::Normal => SnapshotView::Normal,
            PlotSeries::Bpm => SnapshotView::Bpm,
            PlotSeries::Histogram => SnapshotView::Histogram,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a whole recording: beats, R-R, histogram, BPM and HRV as JSON
    Analyze {
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Also write every derived series as `time,value` CSV into this directory
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
    /// Detected beats only
    Beats {
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// HRV indices from newline-delimited R-R intervals (ms)
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Skip ectopic correction
        #[arg(long)]
        raw: bool,
        /// Print the indices as a text panel instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Split a heart sound into its maternal or fetal component
    Separate {
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long, value_enum)]
        component: Component,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write a synthetic recording with known beat times
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 250.0)]
        sample_rate: f64,
        /// Comma-separated R-R intervals in seconds
        #[arg(long, value_delimiter = ',')]
        rr: Vec<f64>,
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Stream a recording through the live monitor, reporting HRV every second
    Monitor {
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Input samples per capture chunk
        #[arg(long, default_value_t = 25)]
        chunk: usize,
        /// Stop after this many seconds of input
        #[arg(long)]
        seconds: Option<f64>,
        /// Playback speed relative to real time
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
    /// Render one view of the analysis to a PNG via plotters
    Plot {
        #[command(flatten)]
        analysis: AnalysisArgs,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "beats")]
        series: PlotSeries,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Analyze { analysis, csv_dir } => cmd_analyze(&analysis, csv_dir.as_deref())?,
        Commands::Beats { analysis } => cmd_beats(&analysis)?,
        Commands::Hrv { input, raw, text } => cmd_hrv(input.as_deref(), raw, text)?,
        Commands::Separate {
            analysis,
            component,
            out,
        } => cmd_separate(&analysis, component, out.as_deref())?,
        Commands::Simulate {
            out,
            sample_rate,
            rr,
            noise,
            seed,
        } => cmd_simulate(&out, sample_rate, rr, noise, seed)?,
        Commands::Monitor {
            analysis,
            chunk,
            seconds,
            speed,
        } => cmd_monitor(&analysis, chunk, seconds, speed)?,
        Commands::Plot {
            analysis,
            out,
            series,
        } => cmd_plot(&analysis, &out, series)?,
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_samples(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_samples(&buf)
        }
    }
}

fn analyze(analysis: &AnalysisArgs) -> Result<PcgSnapshot> {
    let options = analysis.options()?;
    let samples = analysis.waveform_samples(&options)?;
    let snapshot = analyze_recording(options, samples)?;
    info!(
        "analysed {:.2} s: {} beats, {} intervals",
        snapshot.waveform.duration(),
        snapshot.beats.len(),
        snapshot.rr.len()
    );
    Ok(snapshot)
}

#[derive(Serialize)]
struct AnalysisOutput<'a> {
    sample_rate_hz: f64,
    duration_s: f64,
    threshold: f64,
    beats: &'a EventSeries,
    rr: &'a EventSeries,
    normal_rr: &'a EventSeries,
    resampled_rr: &'a UniformSeries,
    histogram: &'a EventSeries,
    bpm: &'a EventSeries,
    hrv: &'a HrvReport,
}

fn cmd_analyze(analysis: &AnalysisArgs, csv_dir: Option<&Path>) -> Result<()> {
    let snap = analyze(analysis)?;
    let output = AnalysisOutput {
        sample_rate_hz: snap.waveform.sample_rate(),
        duration_s: snap.waveform.duration(),
        threshold: snap.threshold,
        beats: &snap.beats,
        rr: &snap.rr,
        normal_rr: &snap.normal_rr,
        resampled_rr: &snap.resampled_rr,
        histogram: &snap.histogram,
        bpm: &snap.bpm,
        hrv: &snap.hrv,
    };
    println!("{}", serde_json::to_string(&output)?);
    if let Some(dir) = csv_dir {
        write_csv_bundle(dir, &snap)?;
    }
    Ok(())
}

fn write_csv_bundle(dir: &Path, snap: &PcgSnapshot) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let bundle: [(&str, Series); 6] = [
        ("beats", snap.beats.clone().into()),
        ("rr", snap.rr.clone().into()),
        ("normal_rr", snap.normal_rr.clone().into()),
        ("resampled_rr", snap.resampled_rr.clone().into()),
        ("histogram", snap.histogram.clone().into()),
        ("bpm", snap.bpm.clone().into()),
    ];
    for (name, series) in &bundle {
        let path = dir.join(format!("{name}.csv"));
        export::write_series_csv(&path, series)?;
        debug!("wrote {} ({} rows)", path.display(), series.len());
    }
    Ok(())
}

fn cmd_beats(analysis: &AnalysisArgs) -> Result<()> {
    let options = analysis.options()?;
    let waveform = UniformSeries::from_samples(
        options.waveform_dt(),
        analysis.waveform_samples(&options)?,
    );
    let beats = detect_recording(&waveform, &options.detector);
    info!("{} beats in {:.2} s", beats.len(), waveform.duration());
    println!("{}", serde_json::to_string(&beats)?);
    Ok(())
}

/// Stamp each interval with the cumulative time of its closing beat.
fn rr_series_from_values(values: &[f64]) -> Result<EventSeries> {
    let mut t = 0.0;
    let mut points = Vec::with_capacity(values.len());
    for &ms in values {
        t += ms / 1000.0;
        points.push(Point::new(t, ms));
    }
    EventSeries::from_points(points).context("R-R intervals must be positive")
}

fn cmd_hrv(input: Option<&Path>, raw: bool, text: bool) -> Result<()> {
    let values = read_samples(input)?;
    let rr = rr_series_from_values(&values)?;
    let series = if raw { rr } else { correct_ectopic(&rr) };
    let indices = hrv_indices(&series).map_err(|e| anyhow!("cannot compute HRV: {e}"))?;
    if text {
        println!("{indices}");
    } else {
        println!("{}", serde_json::to_string(&indices)?);
    }
    Ok(())
}

fn cmd_separate(analysis: &AnalysisArgs, component: Component, out: Option<&Path>) -> Result<()> {
    let options = analysis.options()?;
    let waveform = UniformSeries::from_samples(
        options.waveform_dt(),
        analysis.waveform_samples(&options)?,
    );
    let separated = match component {
        Component::Maternal => maternal_heart_sound(&waveform, options.separation.maternal_window)?,
        Component::Fetal => fetal_heart_sound(&waveform, options.separation.fetal_cutoff_hz)?,
    };
    match out {
        Some(path) => text_io::write_samples(path, separated.as_slice(), None)?,
        None => print!("{}", text_io::format_samples(separated.as_slice(), None)),
    }
    Ok(())
}

#[derive(Serialize)]
struct SimulateOutput {
    samples: usize,
    sample_rate_hz: f64,
    beat_times: Vec<f64>,
}

fn cmd_simulate(out: &Path, sample_rate: f64, rr: Vec<f64>, noise: f64, seed: u64) -> Result<()> {
    if !(sample_rate > 0.0) {
        bail!("sample rate must be positive");
    }
    let mut recording = SyntheticRecording {
        sample_rate_hz: sample_rate,
        noise,
        ..SyntheticRecording::default()
    };
    if !rr.is_empty() {
        if rr.iter().any(|v| !(*v > 0.0)) {
            bail!("R-R intervals must be positive");
        }
        recording.rr_intervals_s = rr;
    }
    let ts = recording.generate(seed);
    let header = format!("synthetic phonocardiogram, {sample_rate} Hz, seed {seed}");
    text_io::write_samples(out, ts.as_slice(), Some(&header))?;
    let output = SimulateOutput {
        samples: ts.len(),
        sample_rate_hz: sample_rate,
        beat_times: recording.beat_times(),
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

#[derive(Serialize)]
struct MonitorReport<'a> {
    elapsed_s: f64,
    waveform_s: f64,
    beats: usize,
    done: bool,
    hrv: &'a HrvReport,
}

fn print_report(started: Instant, snap: &PcgSnapshot, hrv: &HrvReport, done: bool) -> Result<()> {
    let report = MonitorReport {
        elapsed_s: started.elapsed().as_secs_f64(),
        waveform_s: snap.waveform.duration(),
        beats: snap.beats.len(),
        done,
        hrv,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_monitor(analysis: &AnalysisArgs, chunk: usize, seconds: Option<f64>, speed: f64) -> Result<()> {
    if !(speed > 0.0) {
        bail!("speed must be positive");
    }
    let options = analysis.options()?;
    let frames = read_samples(analysis.input.as_deref())?;
    let limit = seconds
        .map(|s| (s * options.sample_rate_hz).round() as usize)
        .unwrap_or(frames.len())
        .min(frames.len());
    let chunk = chunk.max(1);
    let pause = Duration::from_secs_f64(chunk as f64 / options.sample_rate_hz / speed);
    let frames_per_sample = options.frames_per_sample;

    let mut expected = limit / frames_per_sample;
    if let Some(max) = options.max_length.seconds() {
        expected = expected.min((max / options.waveform_dt()).floor() as usize);
    }

    let mut monitor = PcgMonitor::spawn(options)?;
    let tx = monitor.command_sender();
    let capture = thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let mut averager = BlockAverager::new(frames_per_sample, false);
            for block in frames[..limit].chunks(chunk) {
                let samples = averager.push(block);
                if !samples.is_empty() && tx.send(MonitorCommand::Ingest(samples)).is_err() {
                    break;
                }
                thread::sleep(pause);
            }
        })?;
    info!("streaming {limit} frames in chunks of {chunk}");

    let started = Instant::now();
    let mut last_report = Instant::now();
    while !capture.is_finished() {
        thread::sleep(Duration::from_millis(20));
        monitor.poll();
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            if let Some(snap) = monitor.snapshot(SoundKind::Original) {
                print_report(started, &snap, &snap.hrv, false)?;
            }
        }
    }
    capture
        .join()
        .map_err(|_| anyhow!("capture thread panicked"))?;

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut last = None;
    while Instant::now() < deadline {
        monitor.poll();
        last = monitor.snapshot(SoundKind::Original);
        if last.as_ref().is_some_and(|s| s.waveform.len() >= expected) {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    let snap = last.ok_or_else(|| anyhow!("monitor published no analysis"))?;
    let hrv: HrvReport = hrv_indices(&snap.normal_rr).into();
    print_report(started, &snap, &hrv, true)?;
    Ok(())
}

fn cmd_plot(analysis: &AnalysisArgs, out: &Path, series: PlotSeries) -> Result<()> {
    let snap = analyze(analysis)?;
    let fig = snapshot_figure(&snap, series.into());
    draw_plotters_figure(out, &fig)?;
    info!("wrote {}", out.display());
    Ok(())
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let Some(bounds) = fig.bounds() else {
        bail!("nothing to plot");
    };
    if let Err(err) = render_figure(path, fig, bounds, true) {
        // Text needs a system font; the traces alone do not.
        warn!("drawing without labels: {err}");
        render_figure(path, fig, bounds, false)?;
    }
    Ok(())
}

fn render_figure(
    path: &Path,
    fig: &Figure,
    (x_min, x_max, y_min, y_max): (f64, f64, f64, f64),
    with_text: bool,
) -> Result<()> {
    let backend = BitMapBackend::new(path, (800, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if with_text {
        builder
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50);
    }
    let mut chart = builder.build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    if with_text {
        chart
            .configure_mesh()
            .x_desc(fig.x.label.clone().unwrap_or_default())
            .y_desc(fig.y.label.clone().unwrap_or_default())
            .draw()?;
    }
    for trace in &fig.traces {
        let (r, g, b) = trace.style.color.rgb();
        let color = RGBColor(r, g, b);
        match trace.kind {
            TraceKind::Line => {
                chart.draw_series(LineSeries::new(
                    trace.points.iter().map(|p| (p[0], p[1])),
                    color.stroke_width(trace.style.width.round().max(1.0) as u32),
                ))?;
            }
            TraceKind::Markers => {
                let radius = trace.style.width.round().max(1.0) as i32;
                chart.draw_series(
                    trace
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), radius, color.filled())),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}
