//! Timing reports of a finished run. Used for reporting only; never gates a
//! verdict.

use super::{HierarchicalTableParser, ProfileTable, ProfilingError, parse_header_values};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Line after which the run log prints its benchmark table.
pub const BENCHMARK_START: &str = " END OF TIME STEPPING";

pub const YUTIMING_HEADER_LINES: (usize, usize) = (7, 9);

static BENCHMARK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<id>\d+)\s+(?P<tag>\S+)\s+(?P<ncalls>\d+)\s+(?P<min>\d+\.*\d+)\s+(?P<max>\d+\.*\d+)\s+(?P<mean>\d+\.*\d+)",
    )
    .expect("benchmark pattern should compile")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkEntry {
    pub id: u32,
    pub tag: String,
    pub calls: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Benchmark rows following the first line that starts with `start_marker`.
/// An empty marker scans the whole text.
pub fn parse_benchmark(text: &str, start_marker: &str) -> Vec<BenchmarkEntry> {
    let mut started = start_marker.is_empty();
    let mut entries = Vec::new();
    for line in text.lines() {
        if !started {
            started = line.starts_with(start_marker);
            if !started {
                continue;
            }
        }
        let Some(captures) = BENCHMARK_PATTERN.captures(line) else {
            continue;
        };
        let parsed = (
            captures["id"].parse::<u32>(),
            captures["ncalls"].parse::<u64>(),
            captures["min"].parse::<f64>(),
            captures["max"].parse::<f64>(),
            captures["mean"].parse::<f64>(),
        );
        if let (Ok(id), Ok(calls), Ok(min), Ok(max), Ok(mean)) = parsed {
            entries.push(BenchmarkEntry {
                id,
                tag: captures["tag"].to_string(),
                calls,
                min,
                max,
                mean,
            });
        }
    }
    entries
}

/// Integer seconds following the first `<marker><non-space>* <digits>` in `text`.
pub fn parse_marker_seconds(text: &str, marker: &str) -> Option<f64> {
    let pattern = Regex::new(&format!(r"{}\S*\s+(\d+)", regex::escape(marker))).ok()?;
    pattern
        .captures(text)
        .and_then(|captures| captures[1].parse::<f64>().ok())
}

/// `End - Start` from a batch log.
pub fn wall_clock_seconds(text: &str) -> Option<f64> {
    let start = parse_marker_seconds(text, "Start")?;
    let end = parse_marker_seconds(text, "End")?;
    Some(end - start)
}

/// Header values and row tree of a YUTIMING file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YutimingReport {
    pub header: BTreeMap<String, f64>,
    pub body: ProfileTable,
}

pub fn read_yutiming(path: impl AsRef<Path>) -> Result<YutimingReport, ProfilingError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ProfilingError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<&str> = text.lines().collect();
    let (first, last) = YUTIMING_HEADER_LINES;
    let header = parse_header_values(&lines, first, last);
    let body = HierarchicalTableParser::yutiming()?.parse_lines(lines.iter().copied())?;
    debug!(path = %path.display(), rows = body.len(), "read YUTIMING");
    Ok(YutimingReport { header, body })
}

/// Named timings of one run: the batch wall clock as `total` plus
/// `<tag> min|max|mean` for every benchmark row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTimings {
    pub name: String,
    pub timings: Vec<(String, f64)>,
    pub benchmark: Vec<BenchmarkEntry>,
}

impl RunTimings {
    /// Reads `run_log` and `batch_log` inside `run_dir`; either may be omitted.
    pub fn load(
        run_dir: &Path,
        run_log: Option<&str>,
        batch_log: Option<&str>,
    ) -> Result<Self, ProfilingError> {
        let mut timings = Vec::new();
        let mut benchmark = Vec::new();

        if let Some(batch_log) = batch_log {
            let text = read_text(&run_dir.join(batch_log))?;
            match wall_clock_seconds(&text) {
                Some(total) => timings.push(("total".to_string(), total)),
                None => warn!(log = batch_log, "batch log has no Start/End markers"),
            }
        }

        if let Some(run_log) = run_log {
            let text = read_text(&run_dir.join(run_log))?;
            benchmark = parse_benchmark(&text, BENCHMARK_START);
            for entry in &benchmark {
                timings.push((format!("{} min", entry.tag), entry.min));
                timings.push((format!("{} max", entry.tag), entry.max));
                timings.push((format!("{} mean", entry.tag), entry.mean));
            }
        }

        Ok(Self {
            name: format!("run in {}", run_dir.display()),
            timings,
            benchmark,
        })
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.timings
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }
}

impl Display for RunTimings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.timings {
            write!(f, "\n    {key}: {value}s")?;
        }
        Ok(())
    }
}

/// One timer measured in two runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingDelta {
    pub key: String,
    pub baseline: f64,
    pub candidate: f64,
    pub difference: f64,
    /// `None` when the baseline is zero.
    pub percent: Option<f64>,
}

/// Per-key difference `candidate - baseline` for keys present in both runs.
pub fn compare_timings(
    baseline: &RunTimings,
    candidate: &RunTimings,
    keys: &[&str],
) -> Vec<TimingDelta> {
    keys.iter()
        .filter_map(|key| {
            let before = baseline.get(key)?;
            let after = candidate.get(key)?;
            let difference = after - before;
            Some(TimingDelta {
                key: (*key).to_string(),
                baseline: before,
                candidate: after,
                difference,
                percent: (before != 0.0).then(|| difference / before * 100.0),
            })
        })
        .collect()
}

fn read_text(path: &Path) -> Result<String, ProfilingError> {
    fs::read_to_string(path).map_err(|source| ProfilingError::Read {
        path: path.to_path_buf(),
        source,
    })
}
