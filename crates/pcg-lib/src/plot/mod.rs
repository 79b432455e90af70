//! Backend-neutral figure model. Rendering lives in the CLI.

use crate::pipeline::PcgSnapshot;
use crate::signal::{EventSeries, UniformSeries};
use serde::{Deserialize, Serialize};

pub const MAX_WAVEFORM_POINTS: usize = 2048;

pub const WAVEFORM_COLOR: Color = Color(0x1f77b4);
pub const BEAT_COLOR: Color = Color(0xd62728);
pub const RR_COLOR: Color = Color(0xff0077);
pub const NORMAL_COLOR: Color = Color(0x2ca02c);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Style {
    /// Line width, or marker radius for marker traces.
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Line,
    Markers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub kind: TraceKind,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

impl Trace {
    pub fn line(name: impl Into<String>, points: Vec<[f64; 2]>, color: Color) -> Self {
        Self {
            name: name.into(),
            kind: TraceKind::Line,
            points,
            style: Style { width: 1.4, color },
        }
    }

    pub fn markers(name: impl Into<String>, points: Vec<[f64; 2]>, color: Color) -> Self {
        Self {
            name: name.into(),
            kind: TraceKind::Markers,
            points,
            style: Style { width: 3.0, color },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub traces: Vec<Trace>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            traces: Vec::new(),
        }
    }

    pub fn with_labels(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_trace(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    pub fn is_empty(&self) -> bool {
        self.traces.iter().all(|t| t.points.is_empty())
    }

    /// `(x_min, x_max, y_min, y_max)` over every finite point, widened so a
    /// flat trace still spans a non-zero range.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self
            .traces
            .iter()
            .flat_map(|t| t.points.iter())
            .filter(|p| p[0].is_finite() && p[1].is_finite());
        let first = points.next()?;
        let (mut x0, mut x1, mut y0, mut y1) = (first[0], first[0], first[1], first[1]);
        for p in points {
            x0 = x0.min(p[0]);
            x1 = x1.max(p[0]);
            y0 = y0.min(p[1]);
            y1 = y1.max(p[1]);
        }
        if x1 - x0 <= 0.0 {
            x0 -= 0.5;
            x1 += 0.5;
        }
        if y1 - y0 <= 0.0 {
            y0 -= 0.5;
            y1 += 0.5;
        }
        Some((x0, x1, y0, y1))
    }
}

/// Keep at most `max_points` evenly strided points.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    if max_points == 0 {
        return Vec::new();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

pub fn figure_from_uniform(
    title: &str,
    series: &UniformSeries,
    max_points: usize,
    color: Color,
) -> Figure {
    let mut fig = Figure::new(Some(title.into()));
    let points = decimate_points(&series.pairs(), max_points);
    fig.add_trace(Trace::line(title, points, color));
    fig
}

pub fn figure_from_events(title: &str, series: &EventSeries, kind: TraceKind, color: Color) -> Figure {
    let mut fig = Figure::new(Some(title.into()));
    let points = series.pairs();
    fig.add_trace(match kind {
        TraceKind::Line => Trace::line(title, points, color),
        TraceKind::Markers => Trace::markers(title, points, color),
    });
    fig
}

/// Which view of a snapshot to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotView {
    Waveform,
    Beats,
    Rr,
    Normal,
    Bpm,
    Histogram,
}

pub fn snapshot_figure(snapshot: &PcgSnapshot, view: SnapshotView) -> Figure {
    let sound = snapshot.kind.title();
    match view {
        SnapshotView::Waveform => {
            figure_from_uniform(sound, &snapshot.waveform, MAX_WAVEFORM_POINTS, WAVEFORM_COLOR)
                .with_labels("time (s)", "amplitude")
        }
        SnapshotView::Beats => {
            let mut fig =
                figure_from_uniform(sound, &snapshot.waveform, MAX_WAVEFORM_POINTS, WAVEFORM_COLOR);
            fig.add_trace(Trace::markers("beats", snapshot.beats.pairs(), BEAT_COLOR));
            if let Some((x0, x1, _, _)) = fig.bounds() {
                fig.add_trace(Trace::line(
                    "threshold",
                    vec![[x0, snapshot.threshold], [x1, snapshot.threshold]],
                    BEAT_COLOR,
                ));
            }
            fig.with_labels("time (s)", "amplitude")
        }
        SnapshotView::Rr => {
            let mut fig = Figure::new(Some("R-R intervals".into()));
            fig.add_trace(Trace::markers("R-R", snapshot.rr.pairs(), RR_COLOR));
            fig.add_trace(Trace::line("normal R-R", snapshot.normal_rr.pairs(), NORMAL_COLOR));
            fig.with_labels("time (s)", "R-R (ms)")
        }
        SnapshotView::Normal => {
            figure_from_events("Normal R-R", &snapshot.normal_rr, TraceKind::Line, NORMAL_COLOR)
                .with_labels("time (s)", "R-R (ms)")
        }
        SnapshotView::Bpm => {
            figure_from_events("Heart rate", &snapshot.bpm, TraceKind::Line, RR_COLOR)
                .with_labels("time (s)", "BPM")
        }
        SnapshotView::Histogram => {
            figure_from_events("R-R histogram", &snapshot.histogram, TraceKind::Markers, RR_COLOR)
                .with_labels("R-R (ms)", "count")
        }
    }
}
