use crate::measurements::{parse_timestamp, Location, MeasurementRecord};
use chrono::{DateTime, Local, Utc};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub label: String,
    pub color: &'static str,
    /// One entry per chart label; `None` where the location has no reading.
    pub points: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

/// Builds one line per location from history series.
///
/// The x-axis is the sorted union of every location's timestamps, so series
/// with different sampling instants still line up. Records whose timestamp
/// does not parse are left off the chart.
pub fn build_chart_data(
    history: &[(Location, Vec<MeasurementRecord>)],
    value: fn(&MeasurementRecord) -> Option<f64>,
) -> ChartData {
    let parsed: Vec<(Location, HashMap<DateTime<Utc>, Option<f64>>)> = history
        .iter()
        .map(|(location, records)| {
            let points = records
                .iter()
                .filter_map(|r| Some((parse_timestamp(r.timestamp.as_deref()?)?, value(r))))
                .collect();
            (*location, points)
        })
        .collect();

    let axis: BTreeSet<DateTime<Utc>> = parsed
        .iter()
        .flat_map(|(_, points)| points.keys().copied())
        .collect();

    let labels = axis
        .iter()
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .collect();

    let datasets = parsed
        .iter()
        .map(|(location, points)| Dataset {
            label: location.name().to_string(),
            color: location.color(),
            points: axis.iter().map(|t| points.get(t).copied().flatten()).collect(),
        })
        .collect();

    ChartData { labels, datasets }
}

#[derive(Debug, Clone)]
pub struct LineChart {
    pub data: ChartData,
    /// Number of draws since construction, the first included.
    pub revision: u64,
}

/// A drawing surface and the chart built on it. The chart is constructed on
/// the first render and updated in place afterwards.
#[derive(Debug)]
pub struct ChartHandle {
    pub surface: &'static str,
    pub y_axis_title: &'static str,
    chart: Option<LineChart>,
}

impl ChartHandle {
    pub fn new(surface: &'static str, y_axis_title: &'static str) -> Self {
        Self {
            surface,
            y_axis_title,
            chart: None,
        }
    }

    pub fn render(&mut self, data: ChartData) {
        if let Some(chart) = self.chart.as_mut() {
            chart.data.labels = data.labels;
            chart.data.datasets = data.datasets;
            chart.revision += 1;
            return;
        }

        self.chart = Some(LineChart { data, revision: 1 });
    }

    pub fn chart(&self) -> Option<&LineChart> {
        self.chart.as_ref()
    }

    /// Text rendering: one sparkline row per dataset.
    pub fn draw(&self) -> String {
        let Some(chart) = &self.chart else {
            return format!("{}: no data yet", self.y_axis_title);
        };

        let mut out = format!("{} [{}]", self.y_axis_title, self.surface);
        if let (Some(first), Some(last)) = (chart.data.labels.first(), chart.data.labels.last()) {
            out.push_str(&format!("  {} .. {}", first, last));
        }
        for dataset in &chart.data.datasets {
            let latest = dataset
                .points
                .iter()
                .rev()
                .find_map(|p| *p)
                .map(|v| format!("{:.1}", v))
                .unwrap_or_else(|| "--".to_string());
            out.push_str(&format!(
                "\n  {:<14} {:>7}  {}",
                dataset.label,
                latest,
                sparkline(&dataset.points)
            ));
        }
        out
    }
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn sparkline(points: &[Option<f64>]) -> String {
    let values: Vec<f64> = points.iter().filter_map(|p| *p).collect();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    points
        .iter()
        .map(|p| match p {
            None => ' ',
            Some(_) if span <= f64::EPSILON => BARS[BARS.len() / 2],
            Some(v) => {
                let idx = ((v - min) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[idx.min(BARS.len() - 1)]
            }
        })
        .collect()
}

/// The two dashboard charts, owned by whoever drives the refresh loop.
#[derive(Debug)]
pub struct ChartRenderer {
    pub ice: ChartHandle,
    pub temperature: ChartHandle,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self {
            ice: ChartHandle::new("iceThicknessChart", "Ice Thickness (cm)"),
            temperature: ChartHandle::new("temperatureChart", "Surface Temperature (°C)"),
        }
    }
}

impl ChartRenderer {
    pub fn render(&mut self, history: &[(Location, Vec<MeasurementRecord>)]) {
        self.ice
            .render(build_chart_data(history, |r| r.avg_ice_thickness));
        self.temperature
            .render(build_chart_data(history, |r| r.avg_surface_temperature));
    }

    pub fn draw(&self) -> String {
        format!("{}\n{}", self.ice.draw(), self.temperature.draw())
    }
}
