pub mod aligner;
pub mod record;
pub mod verdict;

pub use aligner::{
    AlignedPair, Alignment, GroupKey, LogSource, RecordSetFormat, StepFormat, StreamAligner,
};
pub use record::{Field, Record};
pub use verdict::{VerdictEvaluation, combine_error_counts, evaluate_verdict};

use crate::domain::{CheckError, FieldClass};
use crate::numerics::{MinimumMagnitude, field_deviation, format_deviation};
use crate::tolerance::{ActiveThresholds, ToleranceSchedule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    Step,
    RecordSet,
}

/// Layout of the logs being compared.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LogFormat {
    Step(StepFormat),
    RecordSet(RecordSetFormat),
}

impl LogFormat {
    pub fn step() -> Self {
        Self::Step(StepFormat::default())
    }

    pub fn record_set() -> Self {
        Self::RecordSet(RecordSetFormat::default())
    }

    pub fn aligner(&self) -> &dyn StreamAligner {
        match self {
            Self::Step(format) => format,
            Self::RecordSet(format) => format,
        }
    }

    pub fn mode(&self) -> ComparisonMode {
        self.aligner().mode()
    }
}

/// Values kept separately for each field class.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerClass<T> {
    pub temperature: T,
    pub general: T,
}

impl<T> PerClass<T> {
    pub fn get(&self, class: FieldClass) -> &T {
        match class {
            FieldClass::Temperature => &self.temperature,
            FieldClass::General => &self.general,
        }
    }

    pub fn get_mut(&mut self, class: FieldClass) -> &mut T {
        match class {
            FieldClass::Temperature => &mut self.temperature,
            FieldClass::General => &mut self.general,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorstDeviation {
    pub class: FieldClass,
    pub deviation: f64,
    pub threshold: f64,
    pub step: i64,
    pub field_index: usize,
    pub left_line: usize,
    pub right_line: usize,
    pub left: String,
    pub right: String,
}

impl WorstDeviation {
    fn from_pair(
        pair: &AlignedPair<'_>,
        class: FieldClass,
        field_index: usize,
        deviation: f64,
        threshold: f64,
    ) -> Self {
        Self {
            class,
            deviation,
            threshold,
            step: pair.group.step,
            field_index,
            left_line: pair.left.line_number,
            right_line: pair.right.line_number,
            left: pair.left.display_line().to_string(),
            right: pair.right.display_line().to_string(),
        }
    }
}

/// Pass/fail of one step or record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub step: i64,
    pub record_set: Option<usize>,
    pub thresholds: ActiveThresholds,
    pub max_deviation: PerClass<f64>,
    pub failed: PerClass<bool>,
    pub error_count: usize,
    #[serde(skip)]
    worst: PerClass<Option<WorstDeviation>>,
}

impl GroupSummary {
    fn open(key: GroupKey, thresholds: ActiveThresholds) -> Self {
        Self {
            step: key.step,
            record_set: key.record_set,
            thresholds,
            max_deviation: PerClass::default(),
            failed: PerClass::default(),
            error_count: 0,
            worst: PerClass::default(),
        }
    }

    pub fn passed(&self) -> bool {
        self.error_count == 0
    }

    /// Largest deviation in this group for `class`, with the lines it came from.
    pub fn worst(&self, class: FieldClass) -> Option<&WorstDeviation> {
        self.worst.get(class).as_ref()
    }
}

/// Result of comparing two logs under one tolerance schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonOutcome {
    pub mode: ComparisonMode,
    pub left_path: PathBuf,
    pub right_path: PathBuf,
    pub minimum_magnitude: MinimumMagnitude,
    pub error_count: usize,
    pub compared_lines: usize,
    pub worst: PerClass<Option<WorstDeviation>>,
    pub worst_failure: Option<WorstDeviation>,
    pub groups: Vec<GroupSummary>,
    pub diagnostics: Vec<String>,
}

impl ComparisonOutcome {
    pub fn passed(&self) -> bool {
        self.error_count == 0
    }

    pub fn failed_groups(&self) -> impl Iterator<Item = &GroupSummary> {
        self.groups.iter().filter(|group| !group.passed())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComparatorError {
    #[error("file '{}' does not exist", path.display())]
    MissingLog { path: PathBuf },
    #[error("failed to read '{}': {source}", path.display())]
    ReadLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file '{}' is empty", path.display())]
    EmptyLog { path: PathBuf },
    #[error("file '{}' contains only header ({lines} lines)", path.display())]
    HeaderOnly { path: PathBuf, lines: usize },
    #[error(
        "files '{}' and '{}' do not have overlapping time steps and cannot be compared",
        left.display(),
        right.display()
    )]
    NoOverlappingSteps { left: PathBuf, right: PathBuf },
    #[error("no valid line in '{}', file cannot be compared", path.display())]
    NoValidLines { path: PathBuf },
    #[error(
        "variables differ: '{left_name}' at line {left_line} in file '{}', '{right_name}' at line {right_line} in file '{}'",
        left_path.display(),
        right_path.display()
    )]
    VariableMismatch {
        left_name: String,
        left_line: usize,
        left_path: PathBuf,
        right_name: String,
        right_line: usize,
        right_path: PathBuf,
    },
    #[error(
        "time steps differ: nt={left_step} at line {left_line} in file '{}', nt={right_step} at line {right_line} in file '{}'",
        left_path.display(),
        right_path.display()
    )]
    TimeStepMismatch {
        left_step: i64,
        left_line: usize,
        left_path: PathBuf,
        right_step: i64,
        right_line: usize,
        right_path: PathBuf,
    },
}

impl From<ComparatorError> for CheckError {
    fn from(error: ComparatorError) -> Self {
        let message = error.to_string();
        match error {
            ComparatorError::MissingLog { .. } | ComparatorError::ReadLog { .. } => {
                CheckError::io_system("IO.COMPARATOR_READ", message)
            }
            ComparatorError::EmptyLog { .. }
            | ComparatorError::HeaderOnly { .. }
            | ComparatorError::NoOverlappingSteps { .. }
            | ComparatorError::NoValidLines { .. } => {
                CheckError::computation("RUN.COMPARATOR_INPUT", message)
            }
            ComparatorError::VariableMismatch { .. } | ComparatorError::TimeStepMismatch { .. } => {
                CheckError::computation("RUN.COMPARATOR_STRUCTURE", message)
            }
        }
    }
}

/// Compares two logs of one format under one tolerance schedule.
#[derive(Debug, Clone)]
pub struct Comparator {
    format: LogFormat,
    schedule: ToleranceSchedule,
    verbosity: i32,
}

impl Comparator {
    pub fn new(format: LogFormat, schedule: ToleranceSchedule) -> Self {
        Self {
            format,
            schedule,
            verbosity: 0,
        }
    }

    /// Bit-exact comparison that produces no diagnostics.
    pub fn exact(format: LogFormat) -> Self {
        Self::new(format, ToleranceSchedule::force_exact()).with_verbosity(-1)
    }

    /// `-1` silences diagnostics; higher levels add detail.
    pub fn with_verbosity(mut self, verbosity: i32) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn format(&self) -> &LogFormat {
        &self.format
    }

    pub fn schedule(&self) -> &ToleranceSchedule {
        &self.schedule
    }

    pub fn compare_files(
        &self,
        left_path: impl AsRef<Path>,
        right_path: impl AsRef<Path>,
    ) -> Result<ComparisonOutcome, ComparatorError> {
        let left_path = left_path.as_ref();
        let right_path = right_path.as_ref();
        let left_text = read_log(left_path)?;
        let right_text = read_log(right_path)?;
        self.compare(
            LogSource::new(left_path, &left_text),
            LogSource::new(right_path, &right_text),
        )
    }

    pub fn compare(
        &self,
        left: LogSource<'_>,
        right: LogSource<'_>,
    ) -> Result<ComparisonOutcome, ComparatorError> {
        let aligner = self.format.aligner();
        preflight(left, aligner.header_lines())?;
        preflight(right, aligner.header_lines())?;

        let alignment = aligner.align(left, right)?;
        let minimum = self.schedule.minimum_magnitude();
        let mut outcome = ComparisonOutcome {
            mode: aligner.mode(),
            left_path: left.path.to_path_buf(),
            right_path: right.path.to_path_buf(),
            minimum_magnitude: minimum,
            error_count: 0,
            compared_lines: alignment.pairs.len(),
            worst: PerClass::default(),
            worst_failure: None,
            groups: Vec::new(),
            diagnostics: Vec::new(),
        };
        let mut offending: Vec<(&AlignedPair<'_>, f64)> = Vec::new();
        let mut current: Option<(GroupKey, GroupSummary)> = None;

        for pair in &alignment.pairs {
            check_structure(pair, left.path, right.path)?;

            let group = match current.take() {
                Some((key, group)) if key == pair.group => &mut current.insert((key, group)).1,
                finished => {
                    if let Some((_, finished)) = finished {
                        close_group(&finished);
                        outcome.groups.push(finished);
                    }
                    let thresholds = self.schedule.active(pair.group.step);
                    debug!(step = pair.group.step, ?thresholds, "thresholds for group");
                    let opened = GroupSummary::open(pair.group, thresholds);
                    &mut current.insert((pair.group, opened)).1
                }
            };

            let class = aligner.field_class(&pair.left);
            let threshold = group.thresholds.for_class(class);
            let mut line_failed = false;
            let mut line_worst = 0.0_f64;

            for index in aligner.field_positions(&pair.left) {
                let (Some(left_field), Some(right_field)) =
                    (pair.left.field(index), pair.right.field(index))
                else {
                    continue;
                };
                if left_field.integral {
                    continue;
                }

                let deviation = field_deviation(left_field.value, right_field.value, minimum);
                if deviation > *group.max_deviation.get(class) {
                    *group.max_deviation.get_mut(class) = deviation;
                    *group.worst.get_mut(class) = Some(WorstDeviation::from_pair(
                        pair, class, index, deviation, threshold,
                    ));
                }
                let overall = outcome.worst.get_mut(class);
                if overall.as_ref().is_none_or(|worst| deviation > worst.deviation) {
                    *overall = Some(WorstDeviation::from_pair(
                        pair, class, index, deviation, threshold,
                    ));
                }

                if deviation > threshold {
                    outcome.error_count += 1;
                    group.error_count += 1;
                    *group.failed.get_mut(class) = true;
                    line_failed = true;
                    line_worst = line_worst.max(deviation);
                    if outcome
                        .worst_failure
                        .as_ref()
                        .is_none_or(|worst| deviation > worst.deviation)
                    {
                        outcome.worst_failure = Some(WorstDeviation::from_pair(
                            pair, class, index, deviation, threshold,
                        ));
                    }
                }
            }

            if line_failed {
                offending.push((pair, line_worst));
            }
        }

        if let Some((_, finished)) = current.take() {
            close_group(&finished);
            outcome.groups.push(finished);
        }

        let details = match outcome.mode {
            ComparisonMode::Step => self.step_diagnostics(&outcome, &offending),
            ComparisonMode::RecordSet => self.record_set_diagnostics(&outcome, &offending),
        };
        if self.verbosity >= 0 {
            outcome.diagnostics = alignment.notes.clone();
        }
        outcome.diagnostics.extend(details);

        info!(
            left = %left.path.display(),
            right = %right.path.display(),
            errors = outcome.error_count,
            lines = outcome.compared_lines,
            "comparison finished"
        );
        Ok(outcome)
    }

    fn step_diagnostics(
        &self,
        outcome: &ComparisonOutcome,
        offending: &[(&AlignedPair<'_>, f64)],
    ) -> Vec<String> {
        let mut lines = Vec::new();
        if self.verbosity < 0 {
            return lines;
        }
        if self.verbosity > 0 {
            lines.push(comparing_line(outcome.minimum_magnitude));
        }

        match self.verbosity {
            0 => {
                if outcome.error_count > 0 {
                    lines.push(outcome.minimum_magnitude.label().to_string());
                    lines.push("   nt    max_all         t     Test".to_string());
                    for group in &outcome.groups {
                        lines.push(format!(
                            "{:4}     {:>8}     {:>8}     {}",
                            group.step,
                            format_deviation(group.max_deviation.general),
                            format_deviation(group.max_deviation.temperature),
                            if group.passed() { "OK" } else { "FAILED" }
                        ));
                    }
                }
            }
            1 => {
                let kind = deviation_kind(outcome.minimum_magnitude);
                for group in outcome.failed_groups() {
                    for (class, label) in [
                        (FieldClass::Temperature, "t,p"),
                        (FieldClass::General, "all"),
                    ] {
                        if !*group.failed.get(class) {
                            continue;
                        }
                        if let Some(worst) = group.worst(class) {
                            lines.push(format!(
                                "nt={}, max {kind} er. {label}: {:.1e} above threshold {:.1e}, at line {}",
                                group.step, worst.deviation, worst.threshold, worst.left_line
                            ));
                            lines.push(format!(">{}", worst.left));
                            lines.push(format!("<{}", worst.right));
                        }
                    }
                }
            }
            _ => {
                for (pair, _) in offending {
                    lines.push(format!(">{}", pair.left.display_line()));
                    lines.push(format!("<{}", pair.right.display_line()));
                }
            }
        }

        if self.verbosity > 0 && outcome.error_count == 0 {
            lines.push("no difference above threshold".to_string());
        }
        lines
    }

    fn record_set_diagnostics(
        &self,
        outcome: &ComparisonOutcome,
        offending: &[(&AlignedPair<'_>, f64)],
    ) -> Vec<String> {
        const HEADER: &str = "  var        ee    lev       min      imin   jmin         max      imax   jmax           mean          step       error";

        let mut lines = Vec::new();
        if self.verbosity < 0 {
            return lines;
        }
        if self.verbosity > 0 {
            lines.push(comparing_line(outcome.minimum_magnitude));
        }

        if self.verbosity == 0 {
            if let Some(worst) = &outcome.worst_failure {
                lines.push(outcome.minimum_magnitude.label().to_string());
                lines.push(format!(
                    "Error above threshold: {}, max diff {:e} at line {}, step {}",
                    outcome.error_count, worst.deviation, worst.left_line, worst.step
                ));
                lines.push("  Errors above threshold :".to_string());
                lines.push(HEADER.to_string());
                lines.push(worst.left.clone());
                lines.push(worst.right.clone());
            }
        } else if !offending.is_empty() {
            lines.push("  Errors above threshold :".to_string());
            lines.push(HEADER.to_string());
            for (pair, deviation) in offending {
                let step = pair.group.step;
                lines.push(format!(">{}     {step}", pair.left.display_line()));
                lines.push(format!(
                    "<{}     {step}        {deviation:.1e}",
                    pair.right.display_line()
                ));
            }
        }

        if self.verbosity > 0 && outcome.error_count == 0 {
            lines.push("no difference above threshold".to_string());
        }
        lines
    }
}

fn read_log(path: &Path) -> Result<String, ComparatorError> {
    if !path.exists() {
        return Err(ComparatorError::MissingLog {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|source| ComparatorError::ReadLog {
        path: path.to_path_buf(),
        source,
    })
}

fn preflight(source: LogSource<'_>, header_lines: usize) -> Result<(), ComparatorError> {
    let lines = source.line_count();
    if lines == 0 {
        return Err(ComparatorError::EmptyLog {
            path: source.path.to_path_buf(),
        });
    }
    if lines <= header_lines {
        return Err(ComparatorError::HeaderOnly {
            path: source.path.to_path_buf(),
            lines,
        });
    }
    Ok(())
}

fn check_structure(
    pair: &AlignedPair<'_>,
    left_path: &Path,
    right_path: &Path,
) -> Result<(), ComparatorError> {
    if pair.left.name() != pair.right.name() {
        return Err(ComparatorError::VariableMismatch {
            left_name: pair.left.name().to_string(),
            left_line: pair.left.line_number,
            left_path: left_path.to_path_buf(),
            right_name: pair.right.name().to_string(),
            right_line: pair.right.line_number,
            right_path: right_path.to_path_buf(),
        });
    }
    if let (Some(left_step), Some(right_step)) = (pair.left.step, pair.right.step) {
        if left_step != right_step {
            return Err(ComparatorError::TimeStepMismatch {
                left_step,
                left_line: pair.left.line_number,
                left_path: left_path.to_path_buf(),
                right_step,
                right_line: pair.right.line_number,
                right_path: right_path.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn close_group(group: &GroupSummary) {
    debug!(
        step = group.step,
        record_set = group.record_set,
        errors = group.error_count,
        max_temperature = group.max_deviation.temperature,
        max_general = group.max_deviation.general,
        "group compared"
    );
}

fn comparing_line(minimum: MinimumMagnitude) -> String {
    match minimum {
        MinimumMagnitude::Absolute => "Comparing absolute differences ...".to_string(),
        MinimumMagnitude::Relative(floor) => {
            format!("Comparing relative differences, min. value is {floor:.0e} ...")
        }
    }
}

fn deviation_kind(minimum: MinimumMagnitude) -> &'static str {
    if minimum.is_absolute() { "abs." } else { "rel." }
}
