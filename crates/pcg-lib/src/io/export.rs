use crate::signal::{Series, UniformSeries};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::io::Write;
use std::path::Path;

/// Write `(time, value)` rows under a `time,value` header.
pub fn write_points<W: Write>(out: W, points: &[[f64; 2]]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    writer.write_record(["time", "value"])?;
    for [t, v] in points {
        writer.write_record(&[t.to_string(), v.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_series_csv(path: &Path, series: &Series) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_points(file, &series.points()).with_context(|| format!("writing {}", path.display()))
}

pub fn write_uniform_csv(path: &Path, series: &UniformSeries) -> Result<()> {
    write_series_csv(path, &Series::Uniform(series.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{EventSeries, Point};

    #[test]
    fn events_are_written_with_header() {
        let events =
            EventSeries::from_points(vec![Point::new(0.8, 800.0), Point::new(1.6, 810.5)]).unwrap();
        let mut buf = Vec::new();
        write_points(&mut buf, &Series::Events(events).points()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "time,value\n0.8,800\n1.6,810.5\n");
    }

    #[test]
    fn uniform_series_uses_its_time_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wave.csv");
        let ts = UniformSeries {
            dt: 0.5,
            start_time: 2.0,
            data: vec![1.0, -1.0],
        };
        write_uniform_csv(&path, &ts).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows, vec!["time,value", "2,1", "2.5,-1"]);
    }
}
